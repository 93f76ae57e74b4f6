//! Path parameter parsing.
//!
//! # Route Shape
//!
//! ```text
//! /<prefix>/<cropX>/<cropY>/<cropW|->/<cropH|->/<resizeW|->/<resizeH|->/<compression|->/<token>
//! ```
//!
//! `-` marks an optional integer as unspecified. Only syntax is checked here;
//! geometry is corrected later against the actual image.

use std::borrow::Cow;
use std::num::ParseIntError;

use crate::codec::GROUP_MARKER;
use crate::error::RequestError;

/// Literal marking an optional field as unspecified.
pub const UNSPECIFIED: &str = "-";

/// Number of `/`-separated elements in a valid path, counting the empty
/// element before the leading `/`.
pub const PATH_ELEMENTS: usize = 10;

/// Numeric transform parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformParams {
    pub crop_x: i64,
    pub crop_y: i64,
    pub crop_width: Option<i64>,
    pub crop_height: Option<i64>,
    pub resize_width: Option<i64>,
    pub resize_height: Option<i64>,
    pub compression: Option<i64>,
}

impl TransformParams {
    /// Whole image, downscaled to fit the given box.
    pub fn resize(width: i64, height: Option<i64>) -> Self {
        Self {
            resize_width: Some(width),
            resize_height: height,
            ..Self::default()
        }
    }

    /// Placeholder dimensions for this request: the resize box, at least 1x1.
    pub fn placeholder_size(&self) -> (u32, u32) {
        let side = |v: Option<i64>| v.unwrap_or(1).clamp(1, i64::from(u32::MAX)) as u32;
        (side(self.resize_width), side(self.resize_height))
    }
}

/// A parsed image request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    /// The nine meaningful segments: prefix, seven numeric fields, token
    segments: Vec<String>,
    params: TransformParams,
}

impl TransformRequest {
    /// Parse a request path.
    ///
    /// Fails with `BadRequest` when the path is too short, routed under another
    /// prefix, or has a malformed field, and with `Forbidden` when a plain token
    /// is used in strict mode. The strict check runs before field parsing.
    pub fn parse(path: &str, route_prefix: &str, strict: bool) -> Result<Self, RequestError> {
        let elements: Vec<&str> = path.split('/').collect();

        if elements.len() < PATH_ELEMENTS || elements[1] != route_prefix {
            return Err(RequestError::BadRequest(format!(
                "Unexpected request to '{}'",
                path
            )));
        }

        // Standard base64 may contain '/': the token is the whole remainder
        let token = elements[PATH_ELEMENTS - 1..].join("/");
        if strict && !token.starts_with(GROUP_MARKER) {
            return Err(RequestError::Forbidden(format!(
                "Base64url '{}' cannot be specified in strict mode",
                token
            )));
        }

        let params = TransformParams {
            crop_x: mandatory(elements[2], |e| format!("Invalid crop x offset: {}", e))?,
            crop_y: mandatory(elements[3], |e| format!("Invalid crop y offset: {}", e))?,
            crop_width: optional(elements[4], |e| format!("Invalid crop width: {}", e))?,
            crop_height: optional(elements[5], |e| format!("Invalid crop height: {}", e))?,
            resize_width: optional(elements[6], |e| {
                format!("Invalid resize width '{}': {}", elements[6], e)
            })?,
            resize_height: optional(elements[7], |e| {
                format!("Invalid resize height '{}': {}", elements[7], e)
            })?,
            compression: optional(elements[8], |e| {
                format!("Invalid compression level '{}': {}", elements[8], e)
            })?,
        };

        let mut segments: Vec<String> = elements[1..PATH_ELEMENTS - 1]
            .iter()
            .map(|s| s.to_string())
            .collect();
        segments.push(token);

        Ok(Self { segments, params })
    }

    pub fn params(&self) -> &TransformParams {
        &self.params
    }

    /// The opaque image token (last segment).
    pub fn token(&self) -> &str {
        &self.segments[PATH_ELEMENTS - 2]
    }

    /// Route prefix followed by the seven numeric fields, as received.
    pub fn fields(&self) -> &[String] {
        &self.segments[..PATH_ELEMENTS - 2]
    }

    /// Response Etag: the request segments with the token replaced by the
    /// unquoted backend Etag (or kept when the backend has none).
    pub fn etag_for(&self, backend_etag: Option<&str>) -> String {
        let tag = backend_etag
            .map(unquote)
            .filter(|t| !t.is_empty())
            .unwrap_or(Cow::Borrowed(self.token()));

        let mut parts: Vec<&str> = self.fields().iter().map(String::as_str).collect();
        parts.push(&tag);
        parts.join("/")
    }
}

fn mandatory(
    value: &str,
    message: impl FnOnce(ParseIntError) -> String,
) -> Result<i64, RequestError> {
    value
        .parse()
        .map_err(|e| RequestError::BadRequest(message(e)))
}

fn optional(
    value: &str,
    message: impl FnOnce(ParseIntError) -> String,
) -> Result<Option<i64>, RequestError> {
    if value == UNSPECIFIED {
        return Ok(None);
    }
    mandatory(value, message).map(Some)
}

/// Strip the surrounding quotes of an entity tag, keeping a weak `W/` marker.
fn unquote(etag: &str) -> Cow<'_, str> {
    let (marker, rest) = match etag.strip_prefix("W/") {
        Some(rest) => ("W/", rest),
        None => ("", etag),
    };

    match rest.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        Some(inner) if marker.is_empty() => Cow::Borrowed(inner),
        Some(inner) => Cow::Owned(format!("{}{}", marker, inner)),
        None => Cow::Borrowed(etag),
    }
}
