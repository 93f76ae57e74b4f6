//! The transport-neutral image service.
//!
//! # Request Flow
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          ImageService                            │
//! │                                                                  │
//! │  parse path ──▶ decode token ──▶ fetch ──┬─▶ 404 / other ──▶ placeholder GIF
//! │  (400 / 403)     (500)           (500)   │
//! │                                          └─▶ 200 ──▶ HEAD: headers only
//! │                                                  └─▶ GET: crop, scale, encode
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failure ends as a plain-text response carrying the error message.

use std::sync::Arc;

use http::header::{
    CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE, DATE, ETAG, LAST_MODIFIED,
};
use http::{HeaderMap, StatusCode};
use tracing::{error, info, warn};

use crate::codec::UrlCodec;
use crate::config::ProxyConfig;
use crate::error::{ServiceError, TransformError};
use crate::imaging::{content_type, output_extension, ImageLibrary};
use crate::io::MediaFetcher;
use crate::transform::{run_transform, TransformRequest};

use super::neutral::{ImageHandler, ImageRequest, ImageResponse};

/// Cache policy of placeholder responses.
pub const PLACEHOLDER_CACHE_CONTROL: &str = "public, no-cache, no-store, must-revalidate";

/// `Content-Disposition` of placeholder responses.
pub const PLACEHOLDER_DISPOSITION: &str = "inline; filename=\"not-found.gif\"";

/// Serves image requests against configured backends.
///
/// # Type Parameters
///
/// * `F` - The backend fetcher (HTTP in production, mocks in tests)
pub struct ImageService<F> {
    config: Arc<ProxyConfig>,
    codec: UrlCodec,
    fetcher: F,
    library: Arc<ImageLibrary>,
}

impl<F: MediaFetcher> ImageService<F> {
    /// Create a service. The library handle must outlive every request.
    pub fn new(config: ProxyConfig, fetcher: F, library: Arc<ImageLibrary>) -> Self {
        let codec = UrlCodec::from_config(&config);
        Self {
            config: Arc::new(config),
            codec,
            fetcher,
            library,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn codec(&self) -> &UrlCodec {
        &self.codec
    }

    /// Answer one request into `response`.
    pub async fn serve(&self, request: &ImageRequest, response: &mut ImageResponse) {
        info!("Serving {} {}", request.method, request.path);

        if let Err(err) = self.process(request, response).await {
            write_error(request, response, &err);
        }
    }

    async fn process(
        &self,
        request: &ImageRequest,
        response: &mut ImageResponse,
    ) -> Result<(), ServiceError> {
        let parsed =
            TransformRequest::parse(&request.path, &self.config.route_prefix, self.config.strict)?;
        let token = parsed.token();

        let url = self.codec.decode(token)?;
        info!("Resolve backend URL: '{}'", url);

        let media = self.fetcher.fetch(&url).await?;

        match media.status {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                let message = format!("Media not found: {}", token);
                return self.not_found(request, &parsed, response, message).await;
            }
            other => {
                let message = format!("Fails to fetch media '{}': {}", token, other.as_u16());
                return self.not_found(request, &parsed, response, message).await;
            }
        }

        let etag = parsed.etag_for(media.header(ETAG.as_str()));

        if request.is_head() {
            self.write_backend_headers(&media.headers, &etag, response);
            return Ok(());
        }

        let backend_headers = media.headers.clone();
        let source = media.into_bytes().await?;

        let library = Arc::clone(&self.library);
        let params = *parsed.params();
        let output = tokio::task::spawn_blocking(move || run_transform(&library, &source, &params))
            .await
            .map_err(|e| TransformError::Worker(e.to_string()))??;

        self.write_backend_headers(&backend_headers, &etag, response);
        response.set_header(CONTENT_TYPE, content_type(output.format));
        response.set_header(
            CONTENT_DISPOSITION,
            format!(
                "inline; filename=\"{}{}\"",
                token,
                output_extension(output.format)
            ),
        );
        response.write(&output.data);

        Ok(())
    }

    /// Copy the backend validators and set the derived Etag.
    fn write_backend_headers(&self, headers: &HeaderMap, etag: &str, response: &mut ImageResponse) {
        for name in [DATE, LAST_MODIFIED] {
            if let Some(value) = headers.get(&name) {
                response.set_header_value(name, value.clone());
            }
        }

        response.set_header(ETAG, etag);

        if let Some(cache_control) = &self.config.cache_control {
            response.set_header(CACHE_CONTROL, cache_control);
        }
    }

    /// Answer with a grey noise GIF sized to the requested resize box.
    async fn not_found(
        &self,
        request: &ImageRequest,
        parsed: &TransformRequest,
        response: &mut ImageResponse,
        message: String,
    ) -> Result<(), ServiceError> {
        let library = Arc::clone(&self.library);
        write_placeholder(request, parsed, response, message, move |width, height| {
            library.noise_gif(width, height)
        })
        .await
    }
}

/// Generate the placeholder, then write it with its headers.
///
/// Nothing touches `response` until generation succeeded.
async fn write_placeholder<G>(
    request: &ImageRequest,
    parsed: &TransformRequest,
    response: &mut ImageResponse,
    message: String,
    generate: G,
) -> Result<(), ServiceError>
where
    G: FnOnce(u32, u32) -> Result<Vec<u8>, TransformError> + Send + 'static,
{
    error!("Image not found: {} {{referer: {}}}", message, request.referer);

    let placeholder = if request.is_head() {
        None
    } else {
        let (width, height) = parsed.params().placeholder_size();
        let gif = tokio::task::spawn_blocking(move || generate(width, height))
            .await
            .map_err(|e| TransformError::Worker(e.to_string()))??;
        Some(gif)
    };

    response.set_status(StatusCode::NOT_FOUND);
    response.set_header(CONTENT_TYPE, "image/gif");
    response.set_header(CONTENT_DISPOSITION, PLACEHOLDER_DISPOSITION);
    response.set_header(CACHE_CONTROL, PLACEHOLDER_CACHE_CONTROL);

    if let Some(gif) = placeholder {
        response.write(&gif);
    }
    Ok(())
}

/// Replace the response with a plain-text error.
fn write_error(request: &ImageRequest, response: &mut ImageResponse, err: &ServiceError) {
    let status = err.status();

    if err.is_client_error() {
        warn!("Bad request: {} {{referer: {}}}", err, request.referer);
    } else {
        error!("Internal error: {} {{referer: {}}}", err, request.referer);
    }

    response.set_status(status);
    response.set_header(CONTENT_TYPE, "text/plain");
    response.write(err.to_string().as_bytes());
}

#[async_trait::async_trait]
impl<F: MediaFetcher + 'static> ImageHandler for ImageService<F> {
    async fn handle(&self, request: ImageRequest) -> ImageResponse {
        let mut response = ImageResponse::new();
        self.serve(&request, &mut response).await;
        response
    }
}
