//! Process-wide image library handle.
//!
//! [`ImageLibrary::startup`] is called once before serving and the handle is
//! shared (behind an `Arc`) by every request. Dropping the last handle shuts the
//! library down. Starting a second library while one is alive fails, so request
//! code can never re-initialize it mid-flight.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};

use image::{DynamicImage, GrayImage, ImageDecoder, ImageFormat, ImageReader, Limits, Luma};
use rand::Rng;
use tracing::{debug, info};

use crate::error::{LibraryError, TransformError};
use crate::transform::CropRect;

use super::encoder::encode_gif;

/// Largest width or height accepted for a decoded image.
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 16_384;

/// Largest decoder allocation (512 MiB).
pub const DEFAULT_MAX_ALLOC: u64 = 512 * 1024 * 1024;

/// Largest width or height of a generated placeholder.
pub const MAX_PLACEHOLDER_DIMENSION: u32 = 2048;

const NOISE_MEAN: f64 = 128.0;
const NOISE_SIGMA: f64 = 30.0;

static RUNNING: AtomicBool = AtomicBool::new(false);

/// Handle on the image-processing capability.
#[derive(Debug)]
pub struct ImageLibrary {
    limits: Limits,
}

impl ImageLibrary {
    /// Start the library with default decode limits.
    pub fn startup() -> Result<Self, LibraryError> {
        let mut limits = Limits::default();
        limits.max_image_width = Some(DEFAULT_MAX_IMAGE_DIMENSION);
        limits.max_image_height = Some(DEFAULT_MAX_IMAGE_DIMENSION);
        limits.max_alloc = Some(DEFAULT_MAX_ALLOC);

        Self::startup_with_limits(limits)
    }

    /// Start the library with explicit decode limits.
    pub fn startup_with_limits(limits: Limits) -> Result<Self, LibraryError> {
        if RUNNING
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LibraryError::AlreadyRunning);
        }

        let readable: Vec<&str> = ImageFormat::all()
            .filter(|f| f.reading_enabled())
            .filter_map(|f| f.extensions_str().first().copied())
            .collect();
        info!("Image library started (decoders: {})", readable.join(", "));

        Ok(Self { limits })
    }

    /// Whether a library handle is currently alive in this process.
    pub fn is_running() -> bool {
        RUNNING.load(Ordering::Acquire)
    }

    /// Decode an image from its encoded bytes.
    ///
    /// The format is sniffed from the content.
    pub fn load(&self, bytes: &[u8]) -> Result<SourceImage, TransformError> {
        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| TransformError::Decode(e.to_string()))?;

        let format = reader.format().ok_or(TransformError::UnknownFormat)?;
        reader.limits(self.limits.clone());

        let mut decoder = reader
            .into_decoder()
            .map_err(|e| TransformError::Decode(e.to_string()))?;

        let icc_profile = decoder.icc_profile().ok().flatten();

        let image =
            DynamicImage::from_decoder(decoder).map_err(|e| TransformError::Decode(e.to_string()))?;

        debug!(
            "Loaded {:?} image {}x{} ({} bytes)",
            format,
            image.width(),
            image.height(),
            bytes.len()
        );

        Ok(SourceImage {
            image,
            format,
            icc_profile,
        })
    }

    /// Generate a grey gaussian-noise image encoded as GIF.
    ///
    /// Each side is clamped to `1..=MAX_PLACEHOLDER_DIMENSION`.
    pub fn noise_gif(&self, width: u32, height: u32) -> Result<Vec<u8>, TransformError> {
        let width = width.clamp(1, MAX_PLACEHOLDER_DIMENSION);
        let height = height.clamp(1, MAX_PLACEHOLDER_DIMENSION);

        let mut rng = rand::thread_rng();
        let noise = GrayImage::from_fn(width, height, |_, _| {
            Luma([gaussian_sample(&mut rng).round().clamp(0.0, 255.0) as u8])
        });

        let mut output = Vec::new();
        encode_gif(&DynamicImage::ImageLuma8(noise), &mut output)?;
        Ok(output)
    }
}

impl Drop for ImageLibrary {
    fn drop(&mut self) {
        RUNNING.store(false, Ordering::Release);
        info!("Image library shut down");
    }
}

/// Box-Muller sample with the placeholder mean and sigma.
fn gaussian_sample<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    NOISE_MEAN + NOISE_SIGMA * z
}

// =============================================================================
// Source Image
// =============================================================================

/// A decoded image owned by one request.
#[derive(Debug, Clone)]
pub struct SourceImage {
    image: DynamicImage,
    format: ImageFormat,
    icc_profile: Option<Vec<u8>>,
}

impl SourceImage {
    /// Wrap an in-memory image as if it had been loaded in `format`.
    pub fn from_image(image: DynamicImage, format: ImageFormat) -> Self {
        Self {
            image,
            format,
            icc_profile: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Format the image was decoded from.
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Embedded ICC profile, if the source carried one.
    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.icc_profile.as_deref()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Extract a rectangular area, replacing the image in place.
    ///
    /// The rectangle must lie inside the image and have a non-zero area.
    pub fn crop(&mut self, rect: CropRect) -> Result<(), TransformError> {
        let inside = rect.x.checked_add(rect.width).is_some_and(|r| r <= self.width())
            && rect.y.checked_add(rect.height).is_some_and(|b| b <= self.height());

        if rect.width == 0 || rect.height == 0 || !inside {
            return Err(TransformError::EmptyArea {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
            });
        }

        if rect.x == 0 && rect.y == 0 && rect.width == self.width() && rect.height == self.height()
        {
            return Ok(());
        }

        self.image = self
            .image
            .crop_imm(rect.x, rect.y, rect.width, rect.height);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
