//! Axum handlers.
//!
//! # Endpoints
//!
//! - `GET|HEAD /<prefix>/...` - Image requests, forwarded to the [`ImageHandler`]
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::debug;

use crate::service::{ImageHandler, ImageRequest, Referer};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state holding the image handler.
pub struct AppState<H> {
    pub handler: Arc<H>,
}

impl<H: ImageHandler> AppState<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

impl<H> Clone for AppState<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Forward an image request to the service.
///
/// Only GET and HEAD are accepted. The path is percent-decoded before it is
/// handed over, so tokens may be sent escaped.
pub async fn image_handler<H: ImageHandler>(
    State(state): State<AppState<H>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET, HEAD")],
            "Method not allowed",
        )
            .into_response();
    }

    let path = match urlencoding::decode(uri.path()) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => {
            debug!("Path is not valid UTF-8 once decoded, keeping it raw");
            uri.path().to_string()
        }
    };

    let request = ImageRequest::new(method, path).with_referer(referer_from(&headers));
    let (status, headers, body) = state.handler.handle(request).await.into_parts();

    (status, headers, body).into_response()
}

/// Health check.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Referer (or the misspelled `Referrer`) and user agent of a request.
pub fn referer_from(headers: &HeaderMap) -> Referer {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    Referer::new(
        text(header::REFERER.as_str()).or_else(|| text("referrer")),
        text(header::USER_AGENT.as_str()),
    )
}
