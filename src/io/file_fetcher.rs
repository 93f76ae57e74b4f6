use std::io::ErrorKind;

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use tracing::debug;

use super::{FetchedMedia, MediaFetcher};
use crate::error::FetchError;

/// Scheme handled by [`FileFetcher`].
pub const FILE_SCHEME: &str = "file://";

/// Local file fetcher for `file://` URLs.
///
/// A missing file is reported as a 404 response, like an HTTP backend would.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl FileFetcher {
    pub fn new() -> Self {
        Self
    }

    /// Whether `url` is handled by this fetcher.
    pub fn handles(url: &str) -> bool {
        url.starts_with(FILE_SCHEME)
    }
}

#[async_trait]
impl MediaFetcher for FileFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, FetchError> {
        let path = url.strip_prefix(FILE_SCHEME).unwrap_or(url);

        match tokio::fs::read(path).await {
            Ok(data) => {
                debug!("Read {} bytes from '{}'", data.len(), path);
                Ok(FetchedMedia::from_bytes(StatusCode::OK, HeaderMap::new(), data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(FetchedMedia::from_bytes(
                StatusCode::NOT_FOUND,
                HeaderMap::new(),
                Vec::new(),
            )),
            Err(e) => Err(FetchError::Io {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }
}
