//! Router configuration.
//!
//! # Route Structure
//!
//! ```text
//! /health                                     - Health check
//! /<prefix>/<x>/<y>/<w>/<h>/<rw>/<rh>/<c>/<token> - Image endpoint (fallback)
//! ```
//!
//! Every path other than `/health` reaches the image handler, which answers
//! 400 for anything outside the route shape.
//!
//! # Example
//!
//! ```ignore
//! use nuggan::server::{create_router, RouterConfig};
//!
//! let router = create_router(service, RouterConfig::new());
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{health_handler, image_handler, AppState};
use crate::service::ImageHandler;

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Tracing enabled.
    pub fn new() -> Self {
        Self {
            enable_tracing: true,
        }
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

/// Create the application router around an image handler.
pub fn create_router<H: ImageHandler>(handler: H, config: RouterConfig) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .fallback(image_handler::<H>)
        .with_state(AppState::new(handler));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}
