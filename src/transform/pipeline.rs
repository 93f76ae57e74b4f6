//! Transform orchestration: load, crop, scale, re-encode.

use bytes::Bytes;
use image::ImageFormat;
use tracing::debug;

use crate::error::TransformError;
use crate::imaging::{requantize, ImageLibrary, Transform};

use super::geometry::{resolve_crop, resolve_scale, QualityWindow};
use super::request::TransformParams;

/// How the transformed image is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStrategy {
    /// Encode in the source format
    Direct,
    /// Re-encode through an 8-bit palette within the given quality window
    PaletteQuantized(QualityWindow),
}

impl OutputStrategy {
    /// PNG sources go through the palette path, everything else is direct.
    pub fn for_format(format: ImageFormat, compression: Option<i64>) -> Self {
        match format {
            ImageFormat::Png => Self::PaletteQuantized(QualityWindow::for_compression(compression)),
            _ => Self::Direct,
        }
    }
}

/// An encoded transform result.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub format: ImageFormat,
    pub data: Bytes,
}

/// Run the full transform on encoded source bytes.
///
/// Metadata is always stripped. This is CPU bound; async callers should run
/// it on a blocking thread.
pub fn run_transform(
    library: &ImageLibrary,
    source: &[u8],
    params: &TransformParams,
) -> Result<TransformOutput, TransformError> {
    let mut image = library.load(source)?;

    let rect = resolve_crop(
        image.width(),
        image.height(),
        params.crop_x,
        params.crop_y,
        params.crop_width,
        params.crop_height,
    );
    image.crop(rect)?;

    let scale = resolve_scale(
        image.width(),
        image.height(),
        params.resize_width,
        params.resize_height,
    );

    let transform = Transform::new()
        .scale(scale)
        .compression(params.compression)
        .strip_metadata();

    let format = image.format();
    let strategy = OutputStrategy::for_format(format, params.compression);
    debug!(
        "Transform {:?}: crop {:?}, scale {:.4}, {:?}",
        format, rect, scale, strategy
    );

    let mut data = Vec::new();
    match strategy {
        OutputStrategy::Direct => transform.apply(&image, &mut data)?,
        OutputStrategy::PaletteQuantized(window) => {
            requantize(&transform, &image, window, &mut data)?
        }
    }

    Ok(TransformOutput {
        format,
        data: Bytes::from(data),
    })
}
