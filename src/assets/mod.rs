//! Progressive Asset Loader
//!
//! Quality-tiered bitmap loading with request coalescing. The quality used
//! for a load starts from the device class measured once at start-up and
//! steps down as more bitmaps become resident in the render cache.

mod decode;
mod loader;
mod quality;
mod source;

pub use decode::decode_bitmap;
pub use loader::{
    AssetLoader, AssetRecord, LoaderConfig, MemoryStats, PreloadReport,
    DEFAULT_MIN_PERSIST_BYTES, DEFAULT_PRELOAD_TIMEOUT,
};
pub use quality::{
    optimal_quality, DeviceProfile, QualityTier, LOW_QUALITY_BITMAP_COUNT,
    MEDIUM_QUALITY_BITMAP_COUNT,
};
pub use source::{AssetSource, DirectoryAssetSource, InMemoryAssetSource};
