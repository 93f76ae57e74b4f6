//! Image-processing capability built on the `image` crate.
//!
//! # Components
//!
//! - [`ImageLibrary`]: process-wide handle; decodes sources and builds placeholders
//! - [`SourceImage`]: one decoded image, cropped in place
//! - [`Transform`]: scale, compression and metadata settings applied on encode
//! - [`requantize`]: lossy palette re-encode for PNG output
//! - format helpers for `Content-Type` and file extensions

mod encoder;
mod format;
pub(crate) mod library;
mod quantize;

pub use encoder::{png_compression, Transform, DEFAULT_JPEG_QUALITY};
pub use format::{content_type, mime_subtype, output_extension};
pub use library::{
    ImageLibrary, SourceImage, DEFAULT_MAX_ALLOC, DEFAULT_MAX_IMAGE_DIMENSION,
    MAX_PLACEHOLDER_DIMENSION,
};
pub use quantize::requantize;
