//! Test utilities for integration tests.
//!
//! Provides a scriptable mock fetcher, in-process image generators and a
//! process-wide image library handle.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

use nuggan::error::FetchError;
use nuggan::io::{FetchedMedia, MediaFetcher};
use nuggan::{ImageLibrary, ImageService, ProxyConfig, UrlCodec};

pub const WIKIMEDIA: &str = "https://upload.wikimedia.org/wikipedia/commons";
pub const ICONS_CDN0: &str = "https://cdn0.iconfinder.com/data/icons";
pub const ICONS_CDN1: &str = "https://cdn1.iconfinder.com/data/icons";

// =============================================================================
// Image Library
// =============================================================================

/// Library handle shared by every test in this binary.
pub fn shared_library() -> Arc<ImageLibrary> {
    static LIBRARY: OnceLock<Arc<ImageLibrary>> = OnceLock::new();
    LIBRARY
        .get_or_init(|| Arc::new(ImageLibrary::startup().expect("library startup")))
        .clone()
}

// =============================================================================
// Mock Fetcher
// =============================================================================

/// A canned backend answer.
#[derive(Clone)]
pub struct MockMedia {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl MockMedia {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from(body),
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers
            .insert(name, HeaderValue::from_str(value).expect("header value"));
        self
    }
}

/// A mock fetcher serving canned media by URL and recording every request.
///
/// Unknown URLs answer 404.
#[derive(Clone, Default)]
pub struct MockFetcher {
    media: Arc<Mutex<HashMap<String, MockMedia>>>,
    requests: Arc<Mutex<Vec<String>>>,
    request_count: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_media(self, url: impl Into<String>, media: MockMedia) -> Self {
        self.media.lock().unwrap().insert(url.into(), media);
        self
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, FetchError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(url.to_string());

        let media = self
            .media
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| MockMedia::status(StatusCode::NOT_FOUND));

        Ok(FetchedMedia::from_bytes(media.status, media.headers, media.body))
    }
}

/// A fetcher that cannot reach any backend.
pub struct UnreachableFetcher;

#[async_trait]
impl MediaFetcher for UnreachableFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, FetchError> {
        Err(FetchError::Connection {
            url: url.to_string(),
            message: "connection refused".to_string(),
        })
    }
}

// =============================================================================
// Configuration and Service
// =============================================================================

pub fn test_config() -> ProxyConfig {
    ProxyConfig::new(vec![
        vec![WIKIMEDIA.to_string()],
        vec![ICONS_CDN0.to_string(), ICONS_CDN1.to_string()],
    ])
    .expect("valid config")
}

pub fn test_codec() -> UrlCodec {
    UrlCodec::from_config(&test_config())
}

pub fn create_service<F: MediaFetcher>(config: ProxyConfig, fetcher: F) -> ImageService<F> {
    ImageService::new(config, fetcher, shared_library())
}

/// Path for `url` with the given geometry (`x/y/w/h/rw/rh/c`).
pub fn image_path(url: &str, geometry: &str) -> String {
    format!("/optimg/{}/{}", geometry, test_codec().encode(url))
}

// =============================================================================
// Image Generators
// =============================================================================

/// A gradient RGB image encoded in `format`.
pub fn create_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 3 % 256) as u8, (y * 2 % 256) as u8, ((x ^ y) % 256) as u8])
    });
    encode(DynamicImage::ImageRgb8(img), format)
}

/// An RGBA PNG whose left half is fully transparent.
pub fn create_transparent_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, _| {
        let alpha = if x < width / 2 { 0 } else { 255 };
        Rgba([30, 120, 200, alpha])
    });
    encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
}

/// A PNG of per-pixel hash noise, far beyond what a 256-colour palette can hold.
pub fn create_noise_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let h = (x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77)).wrapping_mul(0xC2B2_AE3D);
        Rgb([(h >> 24) as u8, (h >> 16) as u8, (h >> 8) as u8])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).expect("encode test image");
    buf.into_inner()
}

/// Decoded dimensions of an encoded image.
pub fn dimensions(data: &[u8]) -> (u32, u32) {
    let decoded = image::load_from_memory(data).expect("decodable image");
    (decoded.width(), decoded.height())
}

pub fn is_gif(data: &[u8]) -> bool {
    data.starts_with(b"GIF8")
}

pub fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[0] == 0xFF && data[1] == 0xD8
}
