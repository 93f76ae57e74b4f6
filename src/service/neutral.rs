//! Transport-neutral request and response shapes.

use std::fmt;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tracing::warn;

/// Who asked for an image. Only used in diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Referer {
    pub url: Option<String>,
    pub user_agent: Option<String>,
}

impl Referer {
    pub fn new(url: Option<String>, user_agent: Option<String>) -> Self {
        Self { url, user_agent }
    }
}

impl fmt::Display for Referer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.url.as_deref().unwrap_or("-"),
            self.user_agent.as_deref().unwrap_or("-")
        )
    }
}

/// An inbound image call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// Percent-decoded request path, starting with `/`
    pub path: String,
    pub method: Method,
    pub referer: Referer,
}

impl ImageRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            referer: Referer::default(),
        }
    }

    pub fn with_referer(mut self, referer: Referer) -> Self {
        self.referer = referer;
        self
    }

    /// HEAD requests get headers only.
    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }
}

/// The reply being built for one call.
///
/// Status defaults to 200. A header set twice keeps the last value. The body
/// can only grow.
#[derive(Debug, Clone)]
pub struct ImageResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
}

impl Default for ImageResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageResponse {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
        }
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Set a header, replacing any previous value.
    ///
    /// Values that are not valid header text are dropped with a warning.
    pub fn set_header(&mut self, name: HeaderName, value: impl AsRef<str>) {
        match HeaderValue::from_str(value.as_ref()) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => warn!("Dropping invalid value for header {}", name),
        }
    }

    /// Set a header from an already-valid value (e.g. copied from a backend).
    pub fn set_header_value(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Append to the body.
    pub fn write(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body.freeze())
    }
}

/// Anything that answers neutral image requests.
///
/// Transport adapters are generic over this trait and know nothing else about
/// the service behind it.
#[async_trait]
pub trait ImageHandler: Send + Sync + 'static {
    async fn handle(&self, request: ImageRequest) -> ImageResponse;
}
