//! Render Resource Cache
//!
//! In-memory cache of renderable resources for the diagram view.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      RenderCache                           │
//! ├──────────────────┬──────────────────┬─────────────────────┤
//! │   Layer sets     │   Draw buffers   │      Bitmaps         │
//! │ static/dynamic/  │ (retained cmds,  │ (RGBA8, RAII release │
//! │ animated + dirty │  5 min lifetime) │  via BitmapLedger)   │
//! └──────────────────┴────────┬─────────┴──────────┬──────────┘
//!                             │    rasterize       │
//!                             └────────────────────┘
//! ```
//!
//! Draw buffers and bitmaps count toward one resident ceiling and are
//! evicted oldest-created first.

mod bitmap;
mod cache;
mod draw;
mod layer;
mod path;
mod proptest;
mod raster;

pub use bitmap::{Bitmap, BitmapHandle, BitmapLedger, BYTES_PER_PIXEL};
pub use cache::{
    RenderCache, RenderCacheConfig, RenderCacheStats, RenderResource, ResourceKind,
    DEFAULT_DRAW_BUFFER_LIFETIME, DEFAULT_MAX_RESOURCES,
};
pub use draw::{DrawBuffer, DrawBufferBuilder, DrawCommand, Rgba};
pub use layer::{LayerRole, LayerSet, RenderLayer};
pub use path::{optimize_path, PATH_COMPLEXITY_THRESHOLD, PATH_MAX_POINTS};
pub use raster::{rasterize, MAX_RASTER_DIMENSION};
