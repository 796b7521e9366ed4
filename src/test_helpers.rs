//! Shared test utilities.
//!
//! Synthetic image fixtures built in memory, plus a fully in-memory
//! [`Context`] whose stores stay reachable for assertions.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let h = MemoryHarness::new(Engine::native());
//! h.put_source("cat.png", png_bytes(50, 50)).await;
//!
//! let file = h.processor().process(&request).await.unwrap();
//! assert!(h.destination.exists(&file.filepath).await.unwrap());
//! ```

use crate::context::Context;
use crate::imaging::Engine;
use crate::index::MemoryIndex;
use crate::processor::Processor;
use crate::storage::{MemoryStorage, Stat, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::{
    AnimationDecoder, Delay, DynamicImage, Frame, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage,
};
use std::io::Cursor;
use std::sync::Arc;

// =========================================================================
// Image fixtures
// =========================================================================

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

/// A `width × height` gradient PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient(width, height), ImageFormat::Png)
}

/// A `width × height` gradient JPEG.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient(width, height), ImageFormat::Jpeg)
}

/// A looping GIF of `frames` solid frames, each a different color, each
/// shown for 100ms.
pub fn animated_gif_bytes(width: u32, height: u32, frames: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        let frames = (0..frames).map(|i| {
            let shade = (i * 51 % 256) as u8;
            let img = RgbaImage::from_pixel(width, height, Rgba([shade, 0, 255 - shade, 255]));
            Frame::from_parts(img, 0, 0, Delay::from_numer_denom_ms(100, 1))
        });
        encoder.encode_frames(frames).unwrap();
    }
    buf
}

pub fn decode(bytes: &[u8]) -> DynamicImage {
    image::load_from_memory(bytes).unwrap()
}

pub fn gif_frames(bytes: &[u8]) -> Vec<Frame> {
    GifDecoder::new(Cursor::new(bytes))
        .unwrap()
        .into_frames()
        .collect_frames()
        .unwrap()
}

// =========================================================================
// In-memory context
// =========================================================================

/// A [`Context`] over memory stores, with typed handles kept for
/// assertions. Replace fields of `ctx` before calling [`processor`](Self::processor)
/// to change settings or swap a collaborator.
pub struct MemoryHarness {
    pub source: Arc<MemoryStorage>,
    pub destination: Arc<MemoryStorage>,
    pub index: Arc<MemoryIndex>,
    pub ctx: Context,
}

impl MemoryHarness {
    pub fn new(engine: Engine) -> Self {
        let source = Arc::new(MemoryStorage::new());
        let destination = Arc::new(MemoryStorage::new());
        let index = Arc::new(MemoryIndex::new());
        let ctx = Context::new(source.clone(), destination.clone(), index.clone(), engine);
        Self {
            source,
            destination,
            index,
            ctx,
        }
    }

    pub async fn put_source(&self, path: &str, data: Vec<u8>) {
        self.source.save(path, Bytes::from(data)).await.unwrap();
    }

    pub fn processor(&self) -> Processor {
        Processor::new(self.ctx.clone())
    }
}

/// A store that refuses every write and holds nothing.
pub struct ReadOnlyStorage;

#[async_trait]
impl Storage for ReadOnlyStorage {
    fn name(&self) -> &'static str {
        "read-only"
    }

    async fn open(&self, path: &str) -> StorageResult<Bytes> {
        Err(StorageError::NotFound(path.to_string()))
    }

    async fn save(&self, _path: &str, _data: Bytes) -> StorageResult<()> {
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only storage",
        )))
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        Err(StorageError::NotFound(path.to_string()))
    }

    async fn exists(&self, _path: &str) -> StorageResult<bool> {
        Ok(false)
    }

    async fn stat(&self, path: &str) -> StorageResult<Stat> {
        Err(StorageError::NotFound(path.to_string()))
    }
}
