//! Property-Based Tests for the Render Cache
//!
//! # Test Properties
//!
//! 1. **Eviction Bound**: resident resources never exceed the ceiling, and
//!    the survivors are the most recently created
//! 2. **Ledger Balance**: every evicted bitmap is released exactly once
//! 3. **Path Bound**: simplified paths keep their endpoints and never exceed
//!    the resample size

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use kurbo::{Point, Size};
use proptest::prelude::*;

use super::{optimize_path, Bitmap, DrawBuffer, RenderCache, RenderCacheConfig};
use super::{PATH_COMPLEXITY_THRESHOLD, PATH_MAX_POINTS};
use crate::clock::ManualClock;

// =============================================================================
// Property Strategies
// =============================================================================

/// A sequence of inserts: `true` is a bitmap, `false` a draw buffer
fn insert_sequence_strategy() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 0..60)
}

fn path_strategy() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((-1000.0f64..1000.0, -1000.0f64..1000.0), 2..400)
}

fn cache_with_ceiling(max_resources: usize) -> (RenderCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let config = RenderCacheConfig {
        max_resources,
        draw_buffer_lifetime: Duration::from_secs(3600),
    };
    (RenderCache::new(config, clock.clone()), clock)
}

// =============================================================================
// Eviction Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Resident count is min(inserted, ceiling) and the newest survive
    #[test]
    fn prop_eviction_keeps_newest(
        max_resources in 1usize..20,
        inserts in insert_sequence_strategy(),
    ) {
        let (cache, clock) = cache_with_ceiling(max_resources);

        for (i, is_bitmap) in inserts.iter().enumerate() {
            let key = format!("r{:03}", i);
            if *is_bitmap {
                cache.insert_bitmap(&key, Bitmap::filled(1, 1, [0, 0, 0, 255]));
            } else {
                cache.cache_draw_buffer(&key, || DrawBuffer::builder(Size::new(1.0, 1.0)).finish());
            }
            clock.advance(Duration::from_millis(1));
            prop_assert!(cache.resident_count() <= max_resources);
        }

        let expected = inserts.len().min(max_resources);
        prop_assert_eq!(cache.resident_count(), expected);

        let retained: Vec<String> = cache.resources().into_iter().map(|r| r.id).collect();
        let newest: Vec<String> = (inserts.len() - expected..inserts.len())
            .map(|i| format!("r{:03}", i))
            .collect();
        prop_assert_eq!(retained, newest);
        prop_assert_eq!(
            cache.evictions(),
            (inserts.len() - expected) as u64
        );
    }

    /// Bitmaps dropped by eviction are released from the ledger
    #[test]
    fn prop_ledger_tracks_resident_bitmaps(
        max_resources in 1usize..10,
        count in 0usize..30,
    ) {
        let (cache, clock) = cache_with_ceiling(max_resources);

        for i in 0..count {
            cache.insert_bitmap(&format!("b{}", i), Bitmap::filled(2, 2, [1, 2, 3, 4]));
            clock.advance(Duration::from_millis(1));
        }

        let ledger = cache.bitmap_ledger();
        prop_assert_eq!(ledger.live_count(), cache.bitmap_count() as u64);
        prop_assert_eq!(ledger.released(), (count - cache.bitmap_count()) as u64);

        cache.clear();
        prop_assert_eq!(ledger.live_count(), 0);
        prop_assert_eq!(ledger.live_bytes(), 0);
    }
}

// =============================================================================
// Path Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_optimized_path_is_bounded(coords in path_strategy()) {
        let path: Vec<Point> = coords.iter().map(|&(x, y)| Point::new(x, y)).collect();
        let optimized = optimize_path(&path);

        if path.len() <= PATH_COMPLEXITY_THRESHOLD {
            prop_assert_eq!(&optimized, &path);
        } else {
            prop_assert!(optimized.len() <= PATH_MAX_POINTS);
            prop_assert!(!optimized.is_empty());
            prop_assert_eq!(optimized[0], path[0]);
            if optimized.len() > 1 {
                let last = optimized[optimized.len() - 1];
                let expected = path[path.len() - 1];
                prop_assert!(last.distance(expected) < 1e-6);
            }
        }
    }
}
