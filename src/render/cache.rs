//! Render Resource Cache
//!
//! Keyed cache of retained draw buffers and rasterized bitmaps plus the
//! layer sets of live diagrams. Draw buffers and bitmaps share one id
//! namespace and one resident-count ceiling; once the ceiling is exceeded the
//! oldest entries by creation time are evicted first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kurbo::{Point, Size};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::bitmap::{Bitmap, BitmapHandle, BitmapLedger};
use super::draw::DrawBuffer;
use super::layer::{LayerRole, LayerSet, RenderLayer};
use super::{path, raster};
use crate::clock::{to_chrono, SharedClock, SystemClock};
use crate::config::serde_duration_ms;
use crate::telemetry::{PerformanceMonitor, PerformanceProfile};

/// Default resident resource ceiling
pub const DEFAULT_MAX_RESOURCES: usize = 100;

/// Default lifetime of a cached draw buffer
pub const DEFAULT_DRAW_BUFFER_LIFETIME: Duration = Duration::from_secs(5 * 60);

/// Render cache configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderCacheConfig {
    /// Maximum number of resident draw buffers and bitmaps
    pub max_resources: usize,
    /// Age after which a draw buffer is rebuilt
    #[serde(with = "serde_duration_ms")]
    pub draw_buffer_lifetime: Duration,
}

impl Default for RenderCacheConfig {
    fn default() -> Self {
        Self {
            max_resources: DEFAULT_MAX_RESOURCES,
            draw_buffer_lifetime: DEFAULT_DRAW_BUFFER_LIFETIME,
        }
    }
}

/// Kind of a resident resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    DrawBuffer,
    Bitmap,
}

/// Metadata of one resident resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderResource {
    pub id: String,
    pub kind: ResourceKind,
    /// Approximate memory footprint in bytes
    pub size_hint: u64,
    pub created_at: DateTime<Utc>,
}

/// Render cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct RenderCacheStats {
    pub draw_buffers: usize,
    pub bitmaps: usize,
    pub layers: usize,
    pub resident_count: usize,
    pub resident_bytes: u64,
    pub max_resources: usize,
    pub hits: u64,
    pub misses: u64,
    /// Hit ratio (0.0 - 1.0)
    pub hit_ratio: f64,
    pub evictions: u64,
    pub rasterize_failures: u64,
}

struct Slot<T> {
    value: T,
    size_hint: u64,
    created_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    draw_buffers: HashMap<String, Slot<Arc<DrawBuffer>>>,
    bitmaps: HashMap<String, Slot<BitmapHandle>>,
    layers: HashMap<String, RenderLayer>,
    next_seq: u64,
}

impl Inner {
    fn resident_count(&self) -> usize {
        self.draw_buffers.len() + self.bitmaps.len()
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Evicted values, dropped once the lock is released
#[derive(Default)]
struct Evicted {
    draw_buffers: Vec<Arc<DrawBuffer>>,
    bitmaps: Vec<BitmapHandle>,
}

impl Evicted {
    fn len(&self) -> usize {
        self.draw_buffers.len() + self.bitmaps.len()
    }
}

/// Render resource cache
pub struct RenderCache {
    inner: Mutex<Inner>,
    config: RenderCacheConfig,
    clock: SharedClock,
    ledger: Arc<BitmapLedger>,
    monitor: Option<Arc<PerformanceMonitor>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    rasterize_failures: AtomicU64,
}

impl RenderCache {
    /// Create a new render cache
    pub fn new(config: RenderCacheConfig, clock: SharedClock) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
            clock,
            ledger: Arc::new(BitmapLedger::new()),
            monitor: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            rasterize_failures: AtomicU64::new(0),
        }
    }

    /// Report resident counts to, and read the profile from, `monitor`
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    fn profile(&self) -> PerformanceProfile {
        self.monitor
            .as_ref()
            .map(|m| m.current_profile())
            .unwrap_or_default()
    }

    // =========================================================================
    // Layers
    // =========================================================================

    /// Layer `id` if it exists with the requested size, otherwise a fresh
    /// dirty layer that replaces it.
    pub fn get_or_create_layer(&self, id: &str, role: LayerRole, size: Size) -> RenderLayer {
        let mut inner = self.inner.lock();
        if let Some(layer) = inner.layers.get(id) {
            if layer.size == size && layer.role == role {
                return layer.clone();
            }
            debug!(id, "Layer size changed, replacing");
        }
        let layer = RenderLayer::new(id, role, size, self.clock.now());
        inner.layers.insert(id.to_string(), layer.clone());
        layer
    }

    /// Static, dynamic and animated layers for one diagram instance
    pub fn get_or_create_layer_set(&self, diagram_id: &str, size: Size) -> LayerSet {
        let layer = |role| self.get_or_create_layer(&LayerSet::layer_id(diagram_id, role), role, size);
        LayerSet {
            static_layer: layer(LayerRole::Static),
            dynamic_layer: layer(LayerRole::Dynamic),
            animated_layer: layer(LayerRole::Animated),
        }
    }

    /// Current state of layer `id`
    pub fn layer(&self, id: &str) -> Option<RenderLayer> {
        self.inner.lock().layers.get(id).cloned()
    }

    /// Attach rebuilt content to a layer and mark it clean
    pub fn commit_layer(&self, id: &str, content: Arc<DrawBuffer>) -> Option<RenderLayer> {
        let mut inner = self.inner.lock();
        let layer = inner.layers.get(id)?.with_content(content);
        inner.layers.insert(id.to_string(), layer.clone());
        Some(layer)
    }

    /// Flag a layer for rebuild; false if it does not exist
    pub fn mark_layer_dirty(&self, id: &str) -> bool {
        self.set_layer_dirty(id, true)
    }

    /// Clear a layer's rebuild flag; false if it does not exist
    pub fn mark_layer_clean(&self, id: &str) -> bool {
        self.set_layer_dirty(id, false)
    }

    fn set_layer_dirty(&self, id: &str, dirty: bool) -> bool {
        let mut inner = self.inner.lock();
        match inner.layers.get(id).map(|l| l.with_dirty(dirty)) {
            Some(layer) => {
                inner.layers.insert(id.to_string(), layer);
                true
            }
            None => false,
        }
    }

    /// Whether layer `id` must be redrawn this frame.
    ///
    /// Static layers redraw only when dirty. Animated layers redraw every
    /// frame unless the current profile reduces animations, in which case
    /// they behave like static layers. Unknown layers always need a build.
    pub fn layer_needs_rebuild(&self, id: &str) -> bool {
        let Some(layer) = self.layer(id) else {
            return true;
        };
        match layer.role {
            LayerRole::Static => layer.dirty,
            LayerRole::Dynamic => true,
            LayerRole::Animated => !self.profile().reduced_animations || layer.dirty,
        }
    }

    // =========================================================================
    // Draw buffers
    // =========================================================================

    /// Cached draw buffer for `key`, or the result of `build` if absent or
    /// older than the draw-buffer lifetime.
    ///
    /// `build` runs without the cache lock held.
    pub fn cache_draw_buffer<F>(&self, key: &str, build: F) -> Arc<DrawBuffer>
    where
        F: FnOnce() -> DrawBuffer,
    {
        let now = self.clock.now();
        {
            let inner = self.inner.lock();
            if let Some(slot) = inner.draw_buffers.get(key) {
                if now - slot.created_at < to_chrono(self.config.draw_buffer_lifetime) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return slot.value.clone();
                }
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let buffer = Arc::new(build());
        let size_hint = buffer.estimated_bytes() as u64;

        let (evicted, resident) = {
            let mut inner = self.inner.lock();
            let seq = inner.next_seq();
            inner.draw_buffers.insert(
                key.to_string(),
                Slot {
                    value: buffer.clone(),
                    size_hint,
                    created_at: self.clock.now(),
                    seq,
                },
            );
            let evicted = self.evict_locked(&mut inner);
            (evicted, inner.resident_count())
        };
        self.after_insert(evicted, resident);
        buffer
    }

    /// Drop draw buffers older than the lifetime
    pub fn purge_expired_buffers(&self) -> usize {
        let now = self.clock.now();
        let lifetime = to_chrono(self.config.draw_buffer_lifetime);
        let (expired, resident): (Vec<Arc<DrawBuffer>>, usize) = {
            let mut inner = self.inner.lock();
            let keys: Vec<String> = inner
                .draw_buffers
                .iter()
                .filter(|(_, slot)| now - slot.created_at >= lifetime)
                .map(|(k, _)| k.clone())
                .collect();
            let expired = keys
                .iter()
                .filter_map(|k| inner.draw_buffers.remove(k))
                .map(|slot| slot.value)
                .collect();
            (expired, inner.resident_count())
        };
        let purged = expired.len();
        drop(expired);
        if purged > 0 {
            debug!(purged, resident, "Purged expired draw buffers");
            self.report_resident(resident);
        }
        purged
    }

    // =========================================================================
    // Bitmaps
    // =========================================================================

    /// Bitmap cached under `key`
    pub fn get_bitmap(&self, key: &str) -> Option<BitmapHandle> {
        let found = self
            .inner
            .lock()
            .bitmaps
            .get(key)
            .map(|slot| slot.value.clone());
        match found {
            Some(handle) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(handle)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Cache `bitmap` under `key`, replacing any previous one
    pub fn insert_bitmap(&self, key: &str, bitmap: Bitmap) -> BitmapHandle {
        let handle = BitmapHandle::new(bitmap.tracked(self.ledger.clone()));
        let size_hint = handle.byte_size();

        let (replaced, evicted, resident) = {
            let mut inner = self.inner.lock();
            let seq = inner.next_seq();
            let replaced = inner.bitmaps.insert(
                key.to_string(),
                Slot {
                    value: handle.clone(),
                    size_hint,
                    created_at: self.clock.now(),
                    seq,
                },
            );
            let evicted = self.evict_locked(&mut inner);
            (replaced, evicted, inner.resident_count())
        };
        drop(replaced);
        self.after_insert(evicted, resident);
        handle
    }

    /// Rasterize `buffer` at `size` once and cache it under `key`.
    ///
    /// A cached bitmap of the same dimensions is returned as is. Failures
    /// are logged and yield `None`.
    pub fn rasterize(
        &self,
        key: &str,
        buffer: &DrawBuffer,
        size: (u32, u32),
    ) -> Option<BitmapHandle> {
        let cached = self
            .inner
            .lock()
            .bitmaps
            .get(key)
            .map(|slot| slot.value.clone());
        if let Some(handle) = cached {
            if handle.dimensions() == size {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(handle);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        match raster::rasterize(buffer, key, size) {
            Ok(bitmap) => Some(self.insert_bitmap(key, bitmap)),
            Err(e) => {
                self.rasterize_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "Rasterization failed");
                None
            }
        }
    }

    /// Number of cached bitmaps
    pub fn bitmap_count(&self) -> usize {
        self.inner.lock().bitmaps.len()
    }

    /// Drop every cached bitmap, keeping draw buffers and layers
    pub fn remove_bitmaps(&self) -> usize {
        let (removed, resident): (Vec<Slot<BitmapHandle>>, usize) = {
            let mut inner = self.inner.lock();
            let removed = inner.bitmaps.drain().map(|(_, slot)| slot).collect();
            (removed, inner.resident_count())
        };
        let count = removed.len();
        drop(removed);
        if count > 0 {
            self.report_resident(resident);
        }
        count
    }

    /// Ledger of bitmap memory allocated through this cache
    pub fn bitmap_ledger(&self) -> &Arc<BitmapLedger> {
        &self.ledger
    }

    // =========================================================================
    // Whole-cache operations
    // =========================================================================

    /// Resample overly complex paths
    pub fn optimize_path(&self, points: &[Point]) -> Vec<Point> {
        path::optimize_path(points)
    }

    /// Number of resident draw buffers and bitmaps
    pub fn resident_count(&self) -> usize {
        self.inner.lock().resident_count()
    }

    /// Approximate bytes held by resident resources
    pub fn resident_bytes(&self) -> u64 {
        let inner = self.inner.lock();
        inner.draw_buffers.values().map(|s| s.size_hint).sum::<u64>()
            + inner.bitmaps.values().map(|s| s.size_hint).sum::<u64>()
    }

    /// Metadata for every resident resource, oldest first
    pub fn resources(&self) -> Vec<RenderResource> {
        let inner = self.inner.lock();
        let mut resources: Vec<(u64, RenderResource)> = inner
            .draw_buffers
            .iter()
            .map(|(id, slot)| (slot.seq, resource(id, ResourceKind::DrawBuffer, slot)))
            .chain(
                inner
                    .bitmaps
                    .iter()
                    .map(|(id, slot)| (slot.seq, resource(id, ResourceKind::Bitmap, slot))),
            )
            .collect();
        resources.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then(a.0.cmp(&b.0)));
        resources.into_iter().map(|(_, r)| r).collect()
    }

    /// Drop all buffers, bitmaps and layers
    pub fn clear(&self) {
        let drained = {
            let mut inner = self.inner.lock();
            std::mem::take(&mut *inner)
        };
        let count = drained.resident_count();
        drop(drained);
        self.report_resident(0);
        debug!(dropped = count, "Cleared render cache");
    }

    /// Get hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get eviction count
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Get hit ratio
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> RenderCacheStats {
        let (draw_buffers, bitmaps, layers) = {
            let inner = self.inner.lock();
            (inner.draw_buffers.len(), inner.bitmaps.len(), inner.layers.len())
        };
        RenderCacheStats {
            draw_buffers,
            bitmaps,
            layers,
            resident_count: draw_buffers + bitmaps,
            resident_bytes: self.resident_bytes(),
            max_resources: self.config.max_resources,
            hits: self.hits(),
            misses: self.misses(),
            hit_ratio: self.hit_ratio(),
            evictions: self.evictions(),
            rasterize_failures: self.rasterize_failures.load(Ordering::Relaxed),
        }
    }

    /// Evict oldest entries until the resident count is back at the ceiling
    fn evict_locked(&self, inner: &mut Inner) -> Evicted {
        let mut evicted = Evicted::default();
        let resident = inner.resident_count();
        if resident <= self.config.max_resources {
            return evicted;
        }

        let mut candidates: Vec<(DateTime<Utc>, u64, ResourceKind, String)> = inner
            .draw_buffers
            .iter()
            .map(|(k, s)| (s.created_at, s.seq, ResourceKind::DrawBuffer, k.clone()))
            .chain(
                inner
                    .bitmaps
                    .iter()
                    .map(|(k, s)| (s.created_at, s.seq, ResourceKind::Bitmap, k.clone())),
            )
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let excess = resident - self.config.max_resources;
        for (_, _, kind, key) in candidates.into_iter().take(excess) {
            match kind {
                ResourceKind::DrawBuffer => {
                    if let Some(slot) = inner.draw_buffers.remove(&key) {
                        evicted.draw_buffers.push(slot.value);
                    }
                }
                ResourceKind::Bitmap => {
                    if let Some(slot) = inner.bitmaps.remove(&key) {
                        evicted.bitmaps.push(slot.value);
                    }
                }
            }
        }
        evicted
    }

    fn after_insert(&self, evicted: Evicted, resident: usize) {
        if evicted.len() > 0 {
            self.evictions
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
            debug!(evicted = evicted.len(), resident, "Evicted oldest render resources");
        }
        drop(evicted);
        self.report_resident(resident);
    }

    fn report_resident(&self, resident: usize) {
        if let Some(monitor) = &self.monitor {
            monitor.observe_resident_resources(resident);
        }
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new(RenderCacheConfig::default(), Arc::new(SystemClock))
    }
}

fn resource<T>(id: &str, kind: ResourceKind, slot: &Slot<T>) -> RenderResource {
    RenderResource {
        id: id.to_string(),
        kind,
        size_hint: slot.size_hint,
        created_at: slot.created_at,
    }
}

// =============================================================================
// Tests
// =============================================================================
