//! # nuggan
//!
//! An image proxy that crops, downscales and recompresses backend media on
//! the fly.
//!
//! Backend URLs are compacted into opaque path tokens, so a request looks like:
//!
//! ```text
//! GET /optimg/<cropX>/<cropY>/<cropW|->/<cropH|->/<resizeW|->/<resizeH|->/<compression|->/<token>
//! ```
//!
//! ## Architecture
//!
//! - [`codec`] - URL to token compaction
//! - [`transform`] - path parsing, crop/scale rules and the transform pipeline
//! - [`imaging`] - image decode, encode and palette quantization
//! - [`io`] - backend fetchers (HTTP and local files)
//! - [`service`] - transport-neutral request handling
//! - [`server`] - axum router and API-Gateway adapter
//! - [`config`] - TOML proxy configuration and CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use nuggan::{create_router, HttpFetcher, ImageLibrary, ImageService, ProxyConfig, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProxyConfig::load("nuggan.toml")?;
//!     let library = Arc::new(ImageLibrary::startup()?);
//!     let fetcher = HttpFetcher::new(Duration::from_secs(30), 64 * 1024 * 1024)?;
//!
//!     let service = ImageService::new(config, fetcher, library);
//!     let router = create_router(service, RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod imaging;
pub mod io;
pub mod server;
pub mod service;
pub mod transform;

// Re-export commonly used types
pub use codec::UrlCodec;
pub use config::{Cli, Command, ProxyConfig, ServeConfig};
pub use error::{
    ConfigError, DecodeError, FetchError, LibraryError, RequestError, ServiceError,
    TransformError,
};
pub use imaging::{content_type, output_extension, ImageLibrary, SourceImage, Transform};
pub use io::{FetchedMedia, FileFetcher, HttpFetcher, MediaFetcher};
pub use server::{create_router, LambdaAdapter, RouterConfig};
pub use service::{ImageHandler, ImageRequest, ImageResponse, ImageService, Referer};
pub use transform::{run_transform, TransformParams, TransformRequest};
