//! Configuration management for nuggan.
//!
//! Two layers of configuration exist:
//! - [`ProxyConfig`]: the TOML document describing URL groups, route prefix,
//!   strict mode and cache policy. Read once at startup, immutable afterwards.
//! - [`Cli`]: process options via clap, with `NUGGAN_` environment fallbacks.
//!
//! # Proxy configuration
//!
//! ```toml
//! groupedBaseUrls = [
//!   ["https://upload.wikimedia.org/wikipedia/commons"],
//!   ["https://cdn0.iconfinder.com/data/icons", "https://cdn1.iconfinder.com/data/icons"],
//! ]
//! routePrefix = "optimg"                     # optional, no '/'
//! strict = false                             # optional
//! cacheControl = "max-age=3600"              # optional
//! ```
//!
//! # Environment Variables
//!
//! - `NUGGAN_CONFIG` - Path to the proxy configuration
//! - `NUGGAN_HOST` - Server bind address (default: 0.0.0.0)
//! - `NUGGAN_PORT` - Server port (default: 8080)
//! - `NUGGAN_FETCH_TIMEOUT` - Backend fetch timeout in seconds (default: 30)
//! - `NUGGAN_MAX_SOURCE_BYTES` - Maximum backend media size (default: 64MiB)

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use crate::error::ConfigError;

// =============================================================================
// Default Values
// =============================================================================

/// Route prefix used when the configuration does not set one.
pub const DEFAULT_ROUTE_PREFIX: &str = "optimg";

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default backend fetch timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default maximum size of a fetched source image (64 MiB).
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 64 * 1024 * 1024;

// =============================================================================
// Proxy Configuration
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProxyConfig {
    #[serde(default)]
    grouped_base_urls: Vec<Vec<String>>,

    #[serde(default)]
    route_prefix: Option<String>,

    #[serde(default)]
    strict: bool,

    #[serde(default)]
    cache_control: Option<String>,
}

/// Validated proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Ordered URL-prefix groups; every group holds at least one base URL
    pub grouped_base_urls: Vec<Vec<String>>,

    /// Route prefix without slashes (e.g. `optimg`)
    pub route_prefix: String,

    /// Reject plain (non-grouped) tokens
    pub strict: bool,

    /// Cache-Control value set on successful responses
    pub cache_control: Option<String>,
}

impl ProxyConfig {
    /// Build a configuration from URL groups with default settings.
    pub fn new(grouped_base_urls: Vec<Vec<String>>) -> Result<Self, ConfigError> {
        let config = Self {
            grouped_base_urls,
            route_prefix: DEFAULT_ROUTE_PREFIX.to_string(),
            strict: false,
            cache_control: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the route prefix (trimmed, empty means default).
    pub fn with_route_prefix(mut self, prefix: &str) -> Result<Self, ConfigError> {
        self.route_prefix = normalize_route_prefix(Some(prefix))?;
        Ok(self)
    }

    /// Enable or disable strict mode.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the Cache-Control value for successful responses.
    pub fn with_cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let raw: RawProxyConfig =
            toml::from_str(document).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let config = Self {
            grouped_base_urls: raw.grouped_base_urls,
            route_prefix: normalize_route_prefix(raw.route_prefix.as_deref())?,
            strict: raw.strict,
            cache_control: raw
                .cache_control
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Self::from_toml_str(&document)
    }

    /// Check the structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grouped_base_urls.is_empty() {
            return Err(ConfigError::NoGroups);
        }

        for (group, bases) in self.grouped_base_urls.iter().enumerate() {
            if bases.is_empty() {
                return Err(ConfigError::EmptyGroup(group));
            }

            if let Some(position) = bases.iter().position(|b| b.is_empty()) {
                return Err(ConfigError::EmptyBaseUrl { group, position });
            }
        }

        if self.route_prefix.is_empty() || self.route_prefix.contains('/') {
            return Err(ConfigError::InvalidRoutePrefix(self.route_prefix.clone()));
        }

        Ok(())
    }

    /// Route prefix as a leading path, e.g. `/optimg`.
    pub fn route_path(&self) -> String {
        format!("/{}", self.route_prefix)
    }
}

fn normalize_route_prefix(prefix: Option<&str>) -> Result<String, ConfigError> {
    let prefix = prefix.map(str::trim).unwrap_or_default();

    if prefix.is_empty() {
        Ok(DEFAULT_ROUTE_PREFIX.to_string())
    } else if prefix.contains('/') {
        Err(ConfigError::InvalidRoutePrefix(prefix.to_string()))
    } else {
        Ok(prefix.to_string())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// nuggan - crop, downscale and recompress backend images on the fly.
#[derive(Parser, Debug, Clone)]
#[command(name = "nuggan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Consume the parsed CLI into its command.
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP image proxy.
    Serve(ServeConfig),

    /// Encode a backend media URL into an image token.
    Encode(EncodeConfig),

    /// Decode an image token back into its backend media URL.
    Decode(DecodeConfig),

    /// Scale down a single image to a local file.
    ScaleDown(ScaleDownConfig),

    /// Serve API-Gateway proxy events through the Lambda runtime API.
    Lambda(LambdaConfig),
}

/// Options of the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Path to the TOML proxy configuration.
    #[arg(short, long, env = "NUGGAN_CONFIG")]
    pub config: PathBuf,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "NUGGAN_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "NUGGAN_PORT")]
    pub port: u16,

    /// Backend fetch timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS, env = "NUGGAN_FETCH_TIMEOUT")]
    pub fetch_timeout: u64,

    /// Maximum size in bytes of a backend image.
    #[arg(long, default_value_t = DEFAULT_MAX_SOURCE_BYTES, env = "NUGGAN_MAX_SOURCE_BYTES")]
    pub max_source_bytes: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the process options.
    pub fn validate(&self) -> Result<(), String> {
        if self.fetch_timeout == 0 {
            return Err("fetch_timeout must be greater than 0".to_string());
        }
        if self.max_source_bytes == 0 {
            return Err("max_source_bytes must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Backend fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }
}

/// Options of the `encode` command.
#[derive(Args, Debug, Clone)]
pub struct EncodeConfig {
    /// Path to the TOML proxy configuration.
    #[arg(short, long, env = "NUGGAN_CONFIG")]
    pub config: PathBuf,

    /// Backend media URL to encode.
    pub url: String,
}

/// Options of the `decode` command.
#[derive(Args, Debug, Clone)]
pub struct DecodeConfig {
    /// Path to the TOML proxy configuration.
    #[arg(short, long, env = "NUGGAN_CONFIG")]
    pub config: PathBuf,

    /// Image token to decode.
    pub token: String,
}

/// Options of the `scale-down` command.
#[derive(Args, Debug, Clone)]
pub struct ScaleDownConfig {
    /// URL to load (http(s):// or file://).
    #[arg(long = "in")]
    pub input: String,

    /// File to write out.
    #[arg(long = "out", default_value = "output")]
    pub output: PathBuf,

    /// Viewport width.
    #[arg(short = 'w', long, default_value_t = 640, allow_negative_numbers = true)]
    pub width: i64,

    /// Viewport height (-1 for none).
    #[arg(short = 'H', long, default_value_t = -1, allow_negative_numbers = true)]
    pub height: i64,
}

/// Options of the `lambda` command.
#[derive(Args, Debug, Clone)]
pub struct LambdaConfig {
    /// Path to the TOML proxy configuration.
    #[arg(short, long, env = "NUGGAN_CONFIG")]
    pub config: PathBuf,

    /// Backend fetch timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS, env = "NUGGAN_FETCH_TIMEOUT")]
    pub fetch_timeout: u64,

    /// Maximum size in bytes of a backend image.
    #[arg(long, default_value_t = DEFAULT_MAX_SOURCE_BYTES, env = "NUGGAN_MAX_SOURCE_BYTES")]
    pub max_source_bytes: usize,
}

// =============================================================================
// Tests
// =============================================================================
