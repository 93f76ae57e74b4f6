use http::StatusCode;
use thiserror::Error;

/// Errors raised while loading or validating the proxy configuration.
///
/// These are fatal at startup and never produced while serving a request.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Cannot read configuration '{path}': {message}")]
    Io { path: String, message: String },

    /// The document is not valid TOML or has mistyped keys
    #[error("Invalid configuration: {0}")]
    Parse(String),

    /// `groupedBaseUrls` is absent or empty
    #[error("No URL group configured")]
    NoGroups,

    /// One of the inner groups has no base URL
    #[error("URL group #{0} is empty")]
    EmptyGroup(usize),

    /// A base URL is the empty string
    #[error("URL group #{group} has an empty base URL at position {position}")]
    EmptyBaseUrl { group: usize, position: usize },

    /// The route prefix contains a path separator
    #[error("Invalid route prefix contains '/': {0}")]
    InvalidRoutePrefix(String),
}

/// Errors that can occur when decoding an image token back into a URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Nothing to decode
    #[error("Empty image token")]
    EmptyToken,

    /// Grouped token without the `_` closing the group index
    #[error("Invalid base64Ref '{token}': second '_' separator expected after group index")]
    MissingSeparator { token: String },

    /// Group index is not a decimal integer
    #[error("Invalid group index '{value}': {reason}")]
    InvalidGroupIndex { value: String, reason: String },

    /// Group index does not name a configured group
    #[error("Invalid group index: {index}")]
    GroupOutOfRange { index: i64 },

    /// Payload is not valid base64
    #[error("Invalid base64 payload: {0}")]
    Base64(String),

    /// Payload decodes to bytes that are not UTF-8
    #[error("Decoded media URL is not valid UTF-8: {0}")]
    Utf8(String),
}

/// Client-side request errors detected before any backend access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Malformed path or field (400)
    #[error("{0}")]
    BadRequest(String),

    /// Strict-mode violation (403)
    #[error("{0}")]
    Forbidden(String),
}

/// Errors from the backend fetcher.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Request could not be sent or the connection failed
    #[error("Fails to fetch media '{url}': {message}")]
    Connection { url: String, message: String },

    /// The body stream broke while reading
    #[error("Fails to read media body: {0}")]
    Body(String),

    /// The body exceeds the configured maximum size
    #[error("Media body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// Local file access failed
    #[error("Fails to read media file '{path}': {message}")]
    Io { path: String, message: String },
}

/// Errors raised by the image-processing capability during a transform.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    /// The source bytes are not in a recognised image format
    #[error("Unrecognised image format")]
    UnknownFormat,

    /// Decoding failed
    #[error("Cannot load image: {0}")]
    Decode(String),

    /// Encoding failed
    #[error("Cannot encode image: {0}")]
    Encode(String),

    /// The resolved crop rectangle has no pixels
    #[error("Cannot extract empty area {width}x{height} at ({x}, {y})")]
    EmptyArea { x: u32, y: u32, width: u32, height: u32 },

    /// Palette quantization failed
    #[error("Cannot quantize image: {0}")]
    Quantize(String),

    /// The re-encode pipe broke
    #[error("Re-encode pipe failed: {0}")]
    Pipe(String),

    /// The blocking worker running the transform did not complete
    #[error("Transform worker failed: {0}")]
    Worker(String),
}

/// Lifecycle errors of the process-wide image library handle.
#[derive(Debug, Clone, Error)]
pub enum LibraryError {
    #[error("Image library is already running in this process")]
    AlreadyRunning,
}

/// Umbrella error for a single served request.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl ServiceError {
    /// HTTP status this error is reported with.
    ///
    /// Token decode failures stay a generic 500 even though they come from client input.
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Request(RequestError::BadRequest(_)) => StatusCode::BAD_REQUEST,
            ServiceError::Request(RequestError::Forbidden(_)) => StatusCode::FORBIDDEN,
            ServiceError::Decode(_) | ServiceError::Fetch(_) | ServiceError::Transform(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the client caused this error.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}
