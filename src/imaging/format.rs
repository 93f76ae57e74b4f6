//! Mapping from image formats to response metadata.

use image::ImageFormat;

/// MIME subtype of a format (`jpeg`, `png`, `gif`, ...).
pub fn mime_subtype(format: ImageFormat) -> &'static str {
    let mime = format.to_mime_type();
    mime.strip_prefix("image/").unwrap_or(mime)
}

/// Content-Type header value of a format.
pub fn content_type(format: ImageFormat) -> String {
    format!("image/{}", mime_subtype(format))
}

/// File extension (with leading dot) used in `Content-Disposition`.
pub fn output_extension(format: ImageFormat) -> String {
    match format.extensions_str().first() {
        Some(ext) => format!(".{}", ext),
        None => String::new(),
    }
}
