//! Backend media retrieval.
//!
//! [`MediaFetcher`] is the seam between the service core and the outside world.
//! [`HttpFetcher`] talks to HTTP(S) backends, [`FileFetcher`] serves `file://`
//! URLs for local use.

mod fetcher;
mod file_fetcher;
mod http_fetcher;

pub use fetcher::{ByteStream, FetchedMedia, MediaFetcher};
pub use file_fetcher::{FileFetcher, FILE_SCHEME};
pub use http_fetcher::{HttpFetcher, USER_AGENT};
