use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tracing::debug;

use super::{FetchedMedia, MediaFetcher};
use crate::error::FetchError;

/// User agent sent to backends.
pub const USER_AGENT: &str = concat!("nuggan/", env!("CARGO_PKG_VERSION"));

/// HTTP(S) backend fetcher.
///
/// The client is cheap to clone and shares its connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpFetcher {
    /// Create a fetcher with a whole-request timeout and a body size cap.
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Connection {
                url: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self { client, max_bytes })
    }

    /// Maximum accepted body size in bytes.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Connection {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        debug!("Backend answered {} for '{}'", status, url);

        // Reject early when the backend announces an oversized body
        if let Some(length) = response.content_length() {
            if status.is_success() && length > self.max_bytes as u64 {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
        }

        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| FetchError::Body(e.to_string())))
            .boxed();

        Ok(FetchedMedia::new(status, headers, body).with_limit(self.max_bytes))
    }
}
