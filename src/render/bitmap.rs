//! Bitmaps with Deterministic Release
//!
//! A [`Bitmap`] owns its RGBA8 pixel buffer. When it is attached to a
//! [`BitmapLedger`], the ledger counts its bytes while it is alive and
//! releases them in `Drop`, so eviction, `clear()` and error paths all return
//! memory at the moment the last [`BitmapHandle`] goes away.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Bytes per RGBA8 pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Accounting for bitmap memory currently held
#[derive(Debug, Default)]
pub struct BitmapLedger {
    live_bytes: AtomicU64,
    live_count: AtomicU64,
    released: AtomicU64,
}

impl BitmapLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, bytes: u64) {
        self.live_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.live_count.fetch_add(1, Ordering::Relaxed);
    }

    fn release(&self, bytes: u64) {
        self.live_bytes.fetch_sub(bytes, Ordering::Relaxed);
        self.live_count.fetch_sub(1, Ordering::Relaxed);
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    /// Bytes held by live tracked bitmaps
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes.load(Ordering::Relaxed)
    }

    /// Number of live tracked bitmaps
    pub fn live_count(&self) -> u64 {
        self.live_count.load(Ordering::Relaxed)
    }

    /// Number of tracked bitmaps released so far
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }
}

/// RGBA8 pixel buffer
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    ledger: Option<Arc<BitmapLedger>>,
}

impl Bitmap {
    /// Wrap an RGBA8 buffer; its length must be `width * height * 4`
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(Error::Internal(format!(
                "bitmap {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
            ledger: None,
        })
    }

    /// Solid-colour bitmap
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * BYTES_PER_PIXEL)
            .collect();
        Self {
            width,
            height,
            pixels,
            ledger: None,
        }
    }

    /// Take ownership of a decoded image
    pub fn from_image(image: image::RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            pixels: image.into_raw(),
            ledger: None,
        }
    }

    /// Attach memory accounting; bytes are released when the bitmap drops
    pub fn tracked(mut self, ledger: Arc<BitmapLedger>) -> Self {
        if self.ledger.is_none() {
            ledger.track(self.byte_size());
            self.ledger = Some(ledger);
        }
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw RGBA8 pixels, row-major
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Size of the pixel buffer in bytes
    pub fn byte_size(&self) -> u64 {
        self.pixels.len() as u64
    }

    /// Pixel at `(x, y)`, if in bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }
}

impl Drop for Bitmap {
    fn drop(&mut self) {
        if let Some(ledger) = self.ledger.take() {
            ledger.release(self.pixels.len() as u64);
        }
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .field("tracked", &self.ledger.is_some())
            .finish()
    }
}

/// Shared, cheaply cloneable handle to a bitmap
#[derive(Debug, Clone)]
pub struct BitmapHandle(Arc<Bitmap>);

impl BitmapHandle {
    /// Wrap a bitmap
    pub fn new(bitmap: Bitmap) -> Self {
        Self(Arc::new(bitmap))
    }

    /// Whether two handles point at the same bitmap
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Deref for BitmapHandle {
    type Target = Bitmap;

    fn deref(&self) -> &Bitmap {
        &self.0
    }
}

// =============================================================================
// Tests
// =============================================================================
