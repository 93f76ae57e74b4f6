//! Lossy palette re-encode for PNG sources.
//!
//! The scaled image is encoded as PNG by a producer thread and streamed
//! through a bounded pipe into a PNG decoder on the calling thread. The decoded
//! pixels are quantized to an 8-bit palette and written out as an indexed PNG.
//!
//! ```text
//!  producer (scoped thread)            consumer (caller)
//!  Transform::apply_as(Png) ──pipe──▶ png::Decoder ─▶ RGBA ─▶ imagequant ─▶ indexed PNG
//! ```
//!
//! The pipe is a `sync_channel` of byte chunks. The producer owns the only
//! sender, so its exit always closes the pipe. The consumer owns the receiver,
//! so its exit (including early failure) unblocks the producer with a broken
//! pipe. Both sides are joined before returning.
//!
//! When the quantizer cannot reach the window's minimum quality the image is
//! written as a plain truecolor PNG instead.

use std::io::{self, BufWriter, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;

use image::ImageFormat;
use tracing::{debug, warn};

use crate::error::TransformError;
use crate::transform::QualityWindow;

use super::encoder::{png_compression, Transform};
use super::SourceImage;

/// Chunks buffered in the pipe before the producer blocks.
const PIPE_CAPACITY: usize = 8;

/// Size of the producer's write buffer.
const PIPE_CHUNK_SIZE: usize = 64 * 1024;

// =============================================================================
// Pipe
// =============================================================================

/// Writing end of the in-memory pipe.
pub(crate) struct PipeWriter {
    sender: SyncSender<Vec<u8>>,
    consumer_gone: Arc<AtomicBool>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.sender.send(buf.to_vec()).map_err(|_| {
            self.consumer_gone.store(true, Ordering::Release);
            io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed")
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reading end of the in-memory pipe.
pub(crate) struct PipeReader {
    receiver: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    position: usize,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.position >= self.chunk.len() {
            match self.receiver.recv() {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.position = 0;
                }
                // Every sender dropped: end of stream
                Err(_) => return Ok(0),
            }
        }

        let n = buf.len().min(self.chunk.len() - self.position);
        buf[..n].copy_from_slice(&self.chunk[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

/// Create a bounded pipe. The flag is raised when the reader hangs up on a writer.
pub(crate) fn pipe() -> (PipeWriter, PipeReader, Arc<AtomicBool>) {
    let (sender, receiver) = sync_channel(PIPE_CAPACITY);
    let consumer_gone = Arc::new(AtomicBool::new(false));

    (
        PipeWriter {
            sender,
            consumer_gone: Arc::clone(&consumer_gone),
        },
        PipeReader {
            receiver,
            chunk: Vec::new(),
            position: 0,
        },
        consumer_gone,
    )
}

// =============================================================================
// Requantization
// =============================================================================

/// RGBA pixels decoded from the pipe.
struct RgbaPixels {
    width: u32,
    height: u32,
    pixels: Vec<imagequant::RGBA>,
}

/// Scale `image` with `transform`, then re-encode it as a palette PNG whose
/// quantization quality lies in `window`.
pub fn requantize<W: Write>(
    transform: &Transform,
    image: &SourceImage,
    window: QualityWindow,
    output: W,
) -> Result<(), TransformError> {
    let (writer, reader, consumer_gone) = pipe();

    let (produced, decoded) = thread::scope(|scope| {
        let producer = scope.spawn(move || {
            let mut buffered = BufWriter::with_capacity(PIPE_CHUNK_SIZE, writer);
            transform.apply_as(image, ImageFormat::Png, &mut buffered)?;
            buffered
                .flush()
                .map_err(|e| TransformError::Pipe(e.to_string()))
        });

        // The reader is dropped when decoding returns, on success or failure
        let decoded = decode_rgba(reader);

        let produced = producer
            .join()
            .unwrap_or_else(|_| Err(TransformError::Pipe("producer panicked".to_string())));

        (produced, decoded)
    });

    let pixels = match (produced, decoded) {
        (Ok(()), Ok(pixels)) => pixels,
        (Ok(()), Err(consumer)) => return Err(consumer),
        (Err(_), Err(consumer)) if consumer_gone.load(Ordering::Acquire) => return Err(consumer),
        (Err(producer), _) => return Err(producer),
    };

    debug!(
        "Quantizing {}x{} with quality {}-{}",
        pixels.width, pixels.height, window.minimum, window.target
    );

    let (palette, indexed) = match quantize(&pixels, window) {
        Ok(quantized) => quantized,
        Err(imagequant::Error::QualityTooLow) => {
            warn!(
                "Palette for {}x{} image below quality {}, keeping truecolor PNG",
                pixels.width, pixels.height, window.minimum
            );
            return transform.apply_as(image, ImageFormat::Png, output);
        }
        Err(e) => return Err(TransformError::Quantize(e.to_string())),
    };
    write_indexed_png(
        &palette,
        &indexed,
        pixels.width,
        pixels.height,
        transform.compression_level(),
        output,
    )
}

fn decode_rgba<R: Read>(reader: R) -> Result<RgbaPixels, TransformError> {
    let mut decoder = png::Decoder::new(reader);
    decoder.set_transformations(png::Transformations::normalize_to_color8());

    let mut reader = decoder
        .read_info()
        .map_err(|e| TransformError::Decode(e.to_string()))?;

    let mut buffer = vec![0; reader.output_buffer_size()];
    let frame = reader
        .next_frame(&mut buffer)
        .map_err(|e| TransformError::Decode(e.to_string()))?;
    buffer.truncate(frame.buffer_size());

    let pixels: Vec<imagequant::RGBA> = match frame.color_type {
        png::ColorType::Rgba => buffer
            .chunks_exact(4)
            .map(|p| imagequant::RGBA::new(p[0], p[1], p[2], p[3]))
            .collect(),
        png::ColorType::Rgb => buffer
            .chunks_exact(3)
            .map(|p| imagequant::RGBA::new(p[0], p[1], p[2], 255))
            .collect(),
        png::ColorType::GrayscaleAlpha => buffer
            .chunks_exact(2)
            .map(|p| imagequant::RGBA::new(p[0], p[0], p[0], p[1]))
            .collect(),
        png::ColorType::Grayscale => buffer
            .iter()
            .map(|&v| imagequant::RGBA::new(v, v, v, 255))
            .collect(),
        png::ColorType::Indexed => {
            return Err(TransformError::Decode(
                "palette was not expanded".to_string(),
            ))
        }
    };

    Ok(RgbaPixels {
        width: frame.width,
        height: frame.height,
        pixels,
    })
}

fn quantize(
    pixels: &RgbaPixels,
    window: QualityWindow,
) -> Result<(Vec<imagequant::RGBA>, Vec<u8>), imagequant::Error> {
    let mut attributes = imagequant::new();
    attributes.set_quality(window.minimum, window.target)?;

    let mut image = attributes.new_image(
        pixels.pixels.clone().into_boxed_slice(),
        pixels.width as usize,
        pixels.height as usize,
        0.0,
    )?;

    let mut result = attributes.quantize(&mut image)?;
    result.set_dithering_level(1.0)?;

    result.remapped(&mut image)
}

fn write_indexed_png<W: Write>(
    palette: &[imagequant::RGBA],
    indexed: &[u8],
    width: u32,
    height: u32,
    compression: Option<u8>,
    output: W,
) -> Result<(), TransformError> {
    let err = |e: png::EncodingError| TransformError::Encode(e.to_string());

    let rgb: Vec<u8> = palette.iter().flat_map(|c| [c.r, c.g, c.b]).collect();
    let alpha: Vec<u8> = palette.iter().map(|c| c.a).collect();

    let mut encoder = png::Encoder::new(output, width, height);
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_palette(rgb);
    if alpha.iter().any(|&a| a < u8::MAX) {
        encoder.set_trns(alpha);
    }
    encoder.set_compression(match png_compression(compression) {
        image::codecs::png::CompressionType::Fast => png::Compression::Fast,
        image::codecs::png::CompressionType::Best => png::Compression::Best,
        _ => png::Compression::Default,
    });

    let mut writer = encoder.write_header().map_err(err)?;
    writer.write_image_data(indexed).map_err(err)?;
    writer.finish().map_err(err)
}

// =============================================================================
// Tests
// =============================================================================
