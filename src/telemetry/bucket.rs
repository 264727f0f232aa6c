//! Duration Buckets
//!
//! Operation and frame durations are classified against the 60 Hz frame
//! budget: under one frame is excellent, under two is good, under ~three is
//! acceptable, anything longer is poor.

use serde::Serialize;

/// Upper bound (exclusive) of the excellent bucket, in milliseconds
pub const EXCELLENT_BELOW_MS: f64 = 16.0;
/// Upper bound (exclusive) of the good bucket
pub const GOOD_BELOW_MS: f64 = 33.0;
/// Upper bound (exclusive) of the acceptable bucket
pub const ACCEPTABLE_BELOW_MS: f64 = 50.0;

/// Performance class of a measured duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceBucket {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

impl PerformanceBucket {
    /// Classify a duration in milliseconds
    pub fn classify(duration_ms: f64) -> Self {
        if duration_ms < EXCELLENT_BELOW_MS {
            PerformanceBucket::Excellent
        } else if duration_ms < GOOD_BELOW_MS {
            PerformanceBucket::Good
        } else if duration_ms < ACCEPTABLE_BELOW_MS {
            PerformanceBucket::Acceptable
        } else {
            PerformanceBucket::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceBucket::Excellent => "excellent",
            PerformanceBucket::Good => "good",
            PerformanceBucket::Acceptable => "acceptable",
            PerformanceBucket::Poor => "poor",
        }
    }
}

impl std::fmt::Display for PerformanceBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rolling counts per bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BucketCounts {
    pub excellent: u64,
    pub good: u64,
    pub acceptable: u64,
    pub poor: u64,
}

impl BucketCounts {
    /// Count one sample
    pub fn record(&mut self, bucket: PerformanceBucket) {
        match bucket {
            PerformanceBucket::Excellent => self.excellent += 1,
            PerformanceBucket::Good => self.good += 1,
            PerformanceBucket::Acceptable => self.acceptable += 1,
            PerformanceBucket::Poor => self.poor += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.excellent + self.good + self.acceptable + self.poor
    }
}
