//! Performance Profiles
//!
//! A [`PerformanceProfile`] is the controller's output: a small set of knobs
//! the loader, render cache and animation drivers read but never modify.

use serde::Serialize;

use crate::assets::QualityTier;

/// Knobs derived from device class, measured frame health and power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PerformanceProfile {
    /// Frame rate animations should target
    pub max_frame_rate_hz: u32,
    /// Skip non-essential animation work
    pub reduced_animations: bool,
    /// Persist loaded assets to the content store
    pub enable_background_caching: bool,
    /// Coalesce state updates into fewer redraws
    pub batch_updates: bool,
}

impl PerformanceProfile {
    /// Baseline profile for a device tier
    pub fn for_tier(tier: QualityTier) -> Self {
        match tier {
            QualityTier::High => Self {
                max_frame_rate_hz: 60,
                reduced_animations: false,
                enable_background_caching: true,
                batch_updates: false,
            },
            QualityTier::Medium => Self {
                max_frame_rate_hz: 60,
                reduced_animations: false,
                enable_background_caching: true,
                batch_updates: true,
            },
            QualityTier::Low => Self {
                max_frame_rate_hz: 30,
                reduced_animations: true,
                enable_background_caching: false,
                batch_updates: true,
            },
        }
    }

    /// Derive the profile for the current conditions.
    ///
    /// Dropped frames above the acceptable ratio force reduced animations and
    /// batching. Battery saver additionally halves the target frame rate.
    pub fn compute(tier: QualityTier, performance_acceptable: bool, battery_saver: bool) -> Self {
        let mut profile = Self::for_tier(tier);
        if !performance_acceptable {
            profile.reduced_animations = true;
            profile.batch_updates = true;
        }
        if battery_saver {
            profile.max_frame_rate_hz = (profile.max_frame_rate_hz / 2).max(1);
            profile.reduced_animations = true;
        }
        profile
    }

    /// Target frame interval in milliseconds
    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / self.max_frame_rate_hz.max(1) as f64
    }
}

impl Default for PerformanceProfile {
    fn default() -> Self {
        Self::for_tier(QualityTier::High)
    }
}
