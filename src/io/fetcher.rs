use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use http::{HeaderMap, StatusCode};

use crate::error::FetchError;

/// Body of a fetched media, read chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Trait for retrieving backend media by URL.
///
/// Implementations report the backend status as-is: a 404 or 500 from the
/// backend is a successful fetch. Errors are reserved for failures to talk to
/// the backend at all.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch the media at `url`.
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, FetchError>;
}

#[async_trait]
impl<F: MediaFetcher + ?Sized> MediaFetcher for Arc<F> {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, FetchError> {
        (**self).fetch(url).await
    }
}

/// Backend answer: status, headers and a body stream.
pub struct FetchedMedia {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: ByteStream,
    limit: Option<usize>,
}

impl FetchedMedia {
    pub fn new(status: StatusCode, headers: HeaderMap, body: ByteStream) -> Self {
        Self {
            status,
            headers,
            body,
            limit: None,
        }
    }

    /// A response whose body is already in memory.
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self::new(status, headers, stream::once(async move { Ok(data) }).boxed())
    }

    /// Fail [`into_bytes`](Self::into_bytes) once more than `limit` bytes arrive.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// First value of a header, if it is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Drain the body stream into one buffer.
    pub async fn into_bytes(mut self) -> Result<Bytes, FetchError> {
        let mut buffer = BytesMut::new();

        while let Some(chunk) = self.body.next().await {
            let chunk = chunk?;
            if let Some(limit) = self.limit {
                if buffer.len() + chunk.len() > limit {
                    return Err(FetchError::TooLarge { limit });
                }
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer.freeze())
    }
}

impl fmt::Debug for FetchedMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedMedia")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}
