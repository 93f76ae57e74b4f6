//! Crop, scale and quality arithmetic.
//!
//! Every function here is pure: out-of-range requests are corrected (and
//! logged), never rejected.

use tracing::warn;

/// Lower bound of the palette quantization quality.
pub const MIN_QUANTIZE_QUALITY: u8 = 70;

/// Upper bound of the palette quantization quality at compression 0.
pub const MAX_QUANTIZE_QUALITY: u8 = 90;

/// A pixel rectangle inside a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Resolve the requested crop against an image of `width` x `height`.
///
/// An origin outside the image moves to 0. A missing, negative or overflowing
/// extent runs to the image edge.
pub fn resolve_crop(
    width: u32,
    height: u32,
    x: i64,
    y: i64,
    crop_width: Option<i64>,
    crop_height: Option<i64>,
) -> CropRect {
    let (w, h) = (i64::from(width), i64::from(height));

    let nx = if (0..w).contains(&x) {
        x
    } else {
        warn!("Crop x {} defaulted to 0: expected >= 0 and < {}", x, w);
        0
    };

    let ny = if (0..h).contains(&y) {
        y
    } else {
        warn!("Crop y {} defaulted to 0: expected >= 0 and < {}", y, h);
        0
    };

    let nw = match crop_width {
        Some(cw) if cw >= 0 && nx + cw <= w => cw,
        requested => {
            let substituted = w - nx;
            warn!(
                "Crop width {} defaulted to {}: expected >= 0 and ({} + width) <= {}",
                requested_value(requested),
                substituted,
                nx,
                w
            );
            substituted
        }
    };

    let nh = match crop_height {
        Some(ch) if ch >= 0 && ny + ch <= h => ch,
        requested => {
            let substituted = h - ny;
            warn!(
                "Crop height {} defaulted to {}: expected >= 0 and ({} + height) <= {}",
                requested_value(requested),
                substituted,
                ny,
                h
            );
            substituted
        }
    };

    // All four values lie in 0..=u32::MAX by construction
    CropRect {
        x: nx as u32,
        y: ny as u32,
        width: nw as u32,
        height: nh as u32,
    }
}

fn requested_value(value: Option<i64>) -> String {
    value.map_or_else(|| "unspecified".to_string(), |v| v.to_string())
}

/// Uniform downscale factor for a `width` x `height` image.
///
/// Returns 1 when no positive resize width is given, or when the resize box
/// does not fit inside the image (the image is never upscaled). A resize
/// height `<= 0` counts as unspecified.
pub fn resolve_scale(
    width: u32,
    height: u32,
    resize_width: Option<i64>,
    resize_height: Option<i64>,
) -> f64 {
    let Some(rw) = resize_width.filter(|w| *w > 0) else {
        return 1.0;
    };
    let rh = resize_height.filter(|h| *h > 0);

    let (iw, ih) = (f64::from(width), f64::from(height));
    let (rw, rh) = (rw as f64, rh.map(|h| h as f64));

    let fits = rw <= iw && rh.map_or(true, |h| h <= ih);
    if !fits || width == 0 || height == 0 {
        warn!(
            "Scale defaults to 1: expected width ({} <= {}) and height ({:?} unspecified or <= {})",
            rw, iw, rh, ih
        );
        return 1.0;
    }

    let width_scale = rw / iw;
    let height_scale = rh.map_or(1.0, |h| h / ih);

    width_scale.min(height_scale)
}

/// Quality bounds handed to the palette quantizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityWindow {
    pub minimum: u8,
    pub target: u8,
}

impl QualityWindow {
    /// `[70, 90 - 2 * compression]`, with the ceiling never below the floor.
    ///
    /// A missing or negative compression counts as 0.
    pub fn for_compression(compression: Option<i64>) -> Self {
        let level = compression.unwrap_or(0).max(0);
        let ceiling = i64::from(MAX_QUANTIZE_QUALITY)
            .saturating_sub(level.saturating_mul(2))
            .max(i64::from(MIN_QUANTIZE_QUALITY));

        Self {
            minimum: MIN_QUANTIZE_QUALITY,
            target: ceiling as u8,
        }
    }
}
