//! Reversible compaction of backend media URLs into path tokens.
//!
//! A URL starting with one of the configured base URLs is encoded as
//! `_<group>_<base64(rest)>`, where `rest` is the URL with the matched base
//! removed. Any other URL is encoded as plain `base64(url)`, which never starts
//! with `_` since that character is outside the standard base64 alphabet.
//!
//! All bases inside a group are aliases: decoding always re-attaches the first
//! base of the group.
//!
//! # Example
//!
//! ```
//! use nuggan::codec::UrlCodec;
//!
//! let codec = UrlCodec::new(vec![vec![
//!     "https://cdn0.example.com/icons".to_string(),
//!     "https://cdn1.example.com/icons".to_string(),
//! ]]);
//!
//! let token = codec.encode("https://cdn1.example.com/icons/logo.png");
//! assert!(token.starts_with("_0_"));
//! assert_eq!(
//!     codec.decode(&token).unwrap(),
//!     "https://cdn0.example.com/icons/logo.png"
//! );
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::config::ProxyConfig;
use crate::error::DecodeError;

/// Marker opening a grouped token and separating the group index.
pub const GROUP_MARKER: char = '_';

/// Encoder/decoder between backend media URLs and image tokens.
#[derive(Debug, Clone)]
pub struct UrlCodec {
    groups: Vec<Vec<String>>,
}

impl UrlCodec {
    /// Create a codec over the given URL-prefix groups.
    pub fn new(groups: Vec<Vec<String>>) -> Self {
        Self { groups }
    }

    /// Create a codec from the proxy configuration.
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.grouped_base_urls.clone())
    }

    /// Encode a media URL into a token.
    ///
    /// Groups are scanned in order, and bases in order within a group; the
    /// first base that prefixes `url` wins.
    pub fn encode(&self, url: &str) -> String {
        let matched = self.groups.iter().enumerate().find_map(|(index, group)| {
            group
                .iter()
                .find_map(|base| url.strip_prefix(base.as_str()))
                .map(|rest| (index, rest))
        });

        match matched {
            Some((index, rest)) => format!(
                "{marker}{index}{marker}{payload}",
                marker = GROUP_MARKER,
                payload = STANDARD.encode(rest)
            ),
            None => STANDARD.encode(url),
        }
    }

    /// Decode a token back into a media URL.
    pub fn decode(&self, token: &str) -> Result<String, DecodeError> {
        if token.is_empty() {
            return Err(DecodeError::EmptyToken);
        }

        let Some(grouped) = token.strip_prefix(GROUP_MARKER) else {
            return decode_base64(token);
        };

        let (index, payload) = match grouped.find(GROUP_MARKER) {
            Some(pos) if pos > 0 => (&grouped[..pos], &grouped[pos + 1..]),
            _ => {
                return Err(DecodeError::MissingSeparator {
                    token: token.to_string(),
                })
            }
        };

        let index: i64 = index
            .parse()
            .map_err(|e: std::num::ParseIntError| DecodeError::InvalidGroupIndex {
                value: index.to_string(),
                reason: e.to_string(),
            })?;

        let base = usize::try_from(index)
            .ok()
            .and_then(|i| self.groups.get(i))
            .and_then(|group| group.first())
            .ok_or(DecodeError::GroupOutOfRange { index })?;

        let rest = decode_base64(payload)?;

        Ok(format!("{}{}", base, rest))
    }
}

fn decode_base64(input: &str) -> Result<String, DecodeError> {
    let bytes = STANDARD
        .decode(input)
        .map_err(|e| DecodeError::Base64(e.to_string()))?;

    String::from_utf8(bytes).map_err(|e| DecodeError::Utf8(e.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
