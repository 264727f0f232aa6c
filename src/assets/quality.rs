//! Quality Tiers & Device Classification

use serde::{Deserialize, Serialize};

/// Resident bitmap count at or above which assets load at `Low`
pub const LOW_QUALITY_BITMAP_COUNT: usize = 80;

/// Resident bitmap count at or above which assets load at most at `Medium`
pub const MEDIUM_QUALITY_BITMAP_COUNT: usize = 40;

/// Asset quality tier, ordered `Low < Medium < High`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl QualityTier {
    /// File-name suffix of the variant stored for this tier
    pub fn suffix(&self) -> &'static str {
        match self {
            QualityTier::High => "",
            QualityTier::Medium => "_medium",
            QualityTier::Low => "_low",
        }
    }

    /// Decoded dimensions are divided by this factor
    pub fn downscale_factor(&self) -> u32 {
        match self {
            QualityTier::Low => 2,
            QualityTier::Medium | QualityTier::High => 1,
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        };
        f.write_str(s)
    }
}

/// Display characteristics reported by the host at start-up
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    /// Physical pixels per logical pixel
    pub pixel_ratio: f64,
    /// Logical screen width
    pub logical_width: f64,
}

impl DeviceProfile {
    /// Quality tier the device can sustain
    pub fn classify(&self) -> QualityTier {
        if self.pixel_ratio >= 3.0 && self.logical_width >= 400.0 {
            QualityTier::High
        } else if self.pixel_ratio >= 2.0 && self.logical_width >= 360.0 {
            QualityTier::Medium
        } else {
            QualityTier::Low
        }
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            pixel_ratio: 2.0,
            logical_width: 390.0,
        }
    }
}

/// Quality to load at given how many bitmaps are already resident
pub fn optimal_quality(device_tier: QualityTier, resident_bitmaps: usize) -> QualityTier {
    if resident_bitmaps >= LOW_QUALITY_BITMAP_COUNT {
        QualityTier::Low
    } else if resident_bitmaps >= MEDIUM_QUALITY_BITMAP_COUNT {
        device_tier.min(QualityTier::Medium)
    } else {
        device_tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_classification() {
        let device = |pixel_ratio, logical_width| DeviceProfile {
            pixel_ratio,
            logical_width,
        };
        assert_eq!(device(3.0, 428.0).classify(), QualityTier::High);
        assert_eq!(device(3.0, 390.0).classify(), QualityTier::Medium);
        assert_eq!(device(2.0, 360.0).classify(), QualityTier::Medium);
        assert_eq!(device(2.0, 320.0).classify(), QualityTier::Low);
        assert_eq!(device(1.5, 800.0).classify(), QualityTier::Low);
    }

    #[test]
    fn test_optimal_quality_thresholds() {
        assert_eq!(optimal_quality(QualityTier::High, 0), QualityTier::High);
        assert_eq!(optimal_quality(QualityTier::High, 39), QualityTier::High);
        assert_eq!(optimal_quality(QualityTier::High, 40), QualityTier::Medium);
        assert_eq!(optimal_quality(QualityTier::Low, 40), QualityTier::Low);
        assert_eq!(optimal_quality(QualityTier::High, 80), QualityTier::Low);
    }

    #[test]
    fn test_suffixes() {
        assert_eq!(QualityTier::High.suffix(), "");
        assert_eq!(QualityTier::Medium.suffix(), "_medium");
        assert_eq!(QualityTier::Low.suffix(), "_low");
        assert!(QualityTier::Low < QualityTier::High);
    }
}
