//! Image Decoding
//!
//! Decoding runs on the blocking pool so large PNGs never stall the async
//! runtime.

use bytes::Bytes;
use image::imageops::FilterType;

use super::quality::QualityTier;
use crate::error::{Error, Result};
use crate::render::Bitmap;

/// Decode `bytes` into an RGBA8 bitmap, downscaled for the quality tier
pub async fn decode_bitmap(name: &str, bytes: Bytes, quality: QualityTier) -> Result<Bitmap> {
    let owned_name = name.to_string();
    tokio::task::spawn_blocking(move || decode_blocking(&owned_name, &bytes, quality))
        .await
        .map_err(|e| Error::Internal(format!("decode task for '{}' failed: {}", name, e)))?
}

fn decode_blocking(name: &str, bytes: &[u8], quality: QualityTier) -> Result<Bitmap> {
    let image = image::load_from_memory(bytes).map_err(|e| Error::Decode {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    let factor = quality.downscale_factor();
    let image = if factor > 1 {
        let width = (image.width() / factor).max(1);
        let height = (image.height() / factor).max(1);
        image.resize_exact(width, height, FilterType::Triangle)
    } else {
        image
    };

    Ok(Bitmap::from_image(image.to_rgba8()))
}
