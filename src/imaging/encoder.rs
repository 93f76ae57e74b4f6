//! Scale, strip and re-encode step.
//!
//! A [`Transform`] is built per request and applied to a cropped
//! [`SourceImage`], writing the encoded result to any `Write` sink.
//!
//! # Design Decisions
//!
//! - **Downscale only**: the scale factor is expected to be `<= 1`; a factor of
//!   exactly 1 skips resampling.
//! - **Metadata**: encoders write pixel data only. Without stripping, the source
//!   ICC profile is re-attached where the encoder supports it.
//! - **Compression**: the level drives the PNG deflate effort; other encoders
//!   ignore it.

use std::io::{Cursor, Write};

use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, Frame, ImageEncoder, ImageFormat};
use tracing::debug;

use crate::error::TransformError;

use super::SourceImage;

/// JPEG quality used for re-encoding.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

// =============================================================================
// Transform
// =============================================================================

/// Scale/compression/metadata settings applied when writing an image out.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    scale: f64,
    compression: Option<u8>,
    strip_metadata: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform {
    /// Identity transform: scale 1, library default compression, metadata kept.
    pub fn new() -> Self {
        Self {
            scale: 1.0,
            compression: None,
            strip_metadata: false,
        }
    }

    /// Uniform scale factor.
    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Compression level; negative values mean library default.
    pub fn compression(mut self, level: Option<i64>) -> Self {
        self.compression = level
            .filter(|l| *l >= 0)
            .map(|l| l.min(i64::from(u8::MAX)) as u8);
        self
    }

    /// Drop embedded metadata from the output.
    pub fn strip_metadata(mut self) -> Self {
        self.strip_metadata = true;
        self
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale
    }

    pub fn compression_level(&self) -> Option<u8> {
        self.compression
    }

    pub fn strips_metadata(&self) -> bool {
        self.strip_metadata
    }

    /// Output dimensions for an input of `width` x `height`.
    pub fn output_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        if self.scale >= 1.0 || self.scale <= 0.0 {
            return (width, height);
        }
        (scale_side(width, self.scale), scale_side(height, self.scale))
    }

    /// Resample the image according to the scale factor.
    pub fn render(&self, image: &SourceImage) -> DynamicImage {
        let (width, height) = self.output_dimensions(image.width(), image.height());

        if (width, height) == (image.width(), image.height()) {
            return image.image().clone();
        }

        debug!(
            "Scaling {}x{} by {:.4} to {}x{}",
            image.width(),
            image.height(),
            self.scale,
            width,
            height
        );
        image
            .image()
            .resize_exact(width, height, FilterType::Lanczos3)
    }

    /// Render and encode in the source format.
    pub fn apply<W: Write>(&self, image: &SourceImage, output: W) -> Result<(), TransformError> {
        self.apply_as(image, image.format(), output)
    }

    /// Render and encode in an explicit format.
    pub fn apply_as<W: Write>(
        &self,
        image: &SourceImage,
        format: ImageFormat,
        output: W,
    ) -> Result<(), TransformError> {
        let rendered = self.render(image);
        let icc = if self.strip_metadata {
            None
        } else {
            image.icc_profile()
        };

        encode(&rendered, format, self.compression, icc, output)
    }
}

fn scale_side(side: u32, scale: f64) -> u32 {
    ((f64::from(side) * scale).round() as u32).max(1)
}

// =============================================================================
// Encoding
// =============================================================================

/// PNG deflate effort for a compression level.
pub fn png_compression(level: Option<u8>) -> CompressionType {
    match level {
        None => CompressionType::Default,
        Some(0..=3) => CompressionType::Fast,
        Some(4..=6) => CompressionType::Default,
        Some(_) => CompressionType::Best,
    }
}

fn encode<W: Write>(
    image: &DynamicImage,
    format: ImageFormat,
    compression: Option<u8>,
    icc: Option<&[u8]>,
    mut output: W,
) -> Result<(), TransformError> {
    match format {
        ImageFormat::Png => {
            let mut encoder = PngEncoder::new_with_quality(
                output,
                png_compression(compression),
                PngFilterType::Adaptive,
            );
            attach_icc(&mut encoder, icc);
            image
                .write_with_encoder(encoder)
                .map_err(|e| TransformError::Encode(e.to_string()))
        }
        ImageFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(output, DEFAULT_JPEG_QUALITY);
            attach_icc(&mut encoder, icc);
            // JPEG has no alpha channel
            let opaque = if image.color().has_alpha() {
                DynamicImage::ImageRgb8(image.to_rgb8())
            } else {
                image.clone()
            };
            opaque
                .write_with_encoder(encoder)
                .map_err(|e| TransformError::Encode(e.to_string()))
        }
        ImageFormat::Gif => encode_gif(image, output),
        other => {
            let mut buffer = Cursor::new(Vec::new());
            image
                .write_to(&mut buffer, other)
                .map_err(|e| TransformError::Encode(e.to_string()))?;
            output
                .write_all(buffer.get_ref())
                .map_err(|e| TransformError::Encode(e.to_string()))
        }
    }
}

/// Encode a single-frame GIF.
pub(crate) fn encode_gif<W: Write>(image: &DynamicImage, output: W) -> Result<(), TransformError> {
    let mut encoder = GifEncoder::new(output);
    encoder
        .encode_frame(Frame::new(image.to_rgba8()))
        .map_err(|e| TransformError::Encode(e.to_string()))
}

fn attach_icc<E: ImageEncoder>(encoder: &mut E, icc: Option<&[u8]>) {
    if let Some(profile) = icc {
        if let Err(e) = encoder.set_icc_profile(profile.to_vec()) {
            debug!("ICC profile not attached: {}", e);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
