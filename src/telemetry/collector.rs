//! Metrics Collector
//!
//! Lock-free counters, gauges and millisecond histograms for the engine's
//! own timings. Metric handles are created on first use and shared; the
//! registry lock is only taken when a name is seen for the first time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Frame-time histogram bounds in milliseconds
pub const FRAME_MS_BUCKETS: &[f64] = &[8.0, 16.0, 33.0, 50.0, 100.0, 250.0];

/// Operation-time histogram bounds in milliseconds
pub const OPERATION_MS_BUCKETS: &[f64] = &[1.0, 5.0, 16.0, 33.0, 50.0, 100.0, 500.0, 2000.0];

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time value
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    /// Create a new gauge
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Raise the gauge to `value` if it is higher
    pub fn set_max(&self, value: u64) {
        self.value.fetch_max(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Cumulative histogram bucket
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBucket {
    /// Upper bound (inclusive), in milliseconds
    pub le: f64,
    /// Observations at or below `le`
    pub count: u64,
}

/// Histogram of millisecond durations
#[derive(Debug)]
pub struct Histogram {
    bounds: Vec<f64>,
    buckets: Vec<AtomicU64>,
    /// Sum in microseconds
    sum_us: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Create with the operation-time buckets
    pub fn new() -> Self {
        Self::with_buckets(OPERATION_MS_BUCKETS)
    }

    /// Create with custom bounds
    pub fn with_buckets(bounds: &[f64]) -> Self {
        let mut bounds = bounds.to_vec();
        bounds.sort_by(f64::total_cmp);
        let buckets = bounds.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            buckets,
            sum_us: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Create with the frame-time buckets
    pub fn frame_time() -> Self {
        Self::with_buckets(FRAME_MS_BUCKETS)
    }

    /// Record one duration in milliseconds
    pub fn observe_ms(&self, ms: f64) {
        let ms = ms.max(0.0);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us
            .fetch_add((ms * 1_000.0) as u64, Ordering::Relaxed);
        for (bound, bucket) in self.bounds.iter().zip(&self.buckets) {
            if ms <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of observations in milliseconds
    pub fn sum_ms(&self) -> f64 {
        self.sum_us.load(Ordering::Relaxed) as f64 / 1_000.0
    }

    /// Mean observation in milliseconds
    pub fn mean_ms(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.sum_ms() / n as f64,
        }
    }

    pub fn buckets(&self) -> Vec<HistogramBucket> {
        self.bounds
            .iter()
            .zip(&self.buckets)
            .map(|(&le, count)| HistogramBucket {
                le,
                count: count.load(Ordering::Relaxed),
            })
            .collect()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Named metric registry
#[derive(Debug, Default)]
pub struct MetricsCollector {
    counters: RwLock<BTreeMap<String, Arc<Counter>>>,
    gauges: RwLock<BTreeMap<String, Arc<Gauge>>>,
    histograms: RwLock<BTreeMap<String, Arc<Histogram>>>,
}

impl MetricsCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a counter
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        if let Some(counter) = self.counters.read().get(name) {
            return counter.clone();
        }
        self.counters
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Get or create a gauge
    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        if let Some(gauge) = self.gauges.read().get(name) {
            return gauge.clone();
        }
        self.gauges
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Get or create a histogram; `bounds` applies only on creation
    pub fn histogram(&self, name: &str, bounds: &[f64]) -> Arc<Histogram> {
        if let Some(histogram) = self.histograms.read().get(name) {
            return histogram.clone();
        }
        self.histograms
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::with_buckets(bounds)))
            .clone()
    }

    /// Snapshot of every counter
    pub fn counters(&self) -> BTreeMap<String, u64> {
        self.counters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.get()))
            .collect()
    }

    /// Snapshot of every gauge
    pub fn gauges(&self) -> BTreeMap<String, u64> {
        self.gauges
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.get()))
            .collect()
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in self.counters.read().values() {
            counter.reset();
        }
    }

    /// Render every metric in the Prometheus text exposition format
    pub fn export_text(&self) -> String {
        let mut output = String::new();

        for (name, counter) in self.counters.read().iter() {
            output.push_str(&format!("# TYPE {name} counter\n{name} {}\n", counter.get()));
        }

        for (name, gauge) in self.gauges.read().iter() {
            output.push_str(&format!("# TYPE {name} gauge\n{name} {}\n", gauge.get()));
        }

        for (name, histogram) in self.histograms.read().iter() {
            output.push_str(&format!("# TYPE {name} histogram\n"));
            for bucket in histogram.buckets() {
                output.push_str(&format!(
                    "{name}_bucket{{le=\"{}\"}} {}\n",
                    bucket.le, bucket.count
                ));
            }
            output.push_str(&format!(
                "{name}_bucket{{le=\"+Inf\"}} {}\n",
                histogram.count()
            ));
            output.push_str(&format!("{name}_sum {}\n", histogram.sum_ms()));
            output.push_str(&format!("{name}_count {}\n", histogram.count()));
        }

        output
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        counter.inc();
        counter.add(4);
        assert_eq!(counter.get(), 5);

        counter.reset();
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_gauge_set_max() {
        let gauge = Gauge::new();
        gauge.set_max(7);
        gauge.set_max(3);
        assert_eq!(gauge.get(), 7);

        gauge.set(2);
        assert_eq!(gauge.get(), 2);
    }

    #[test]
    fn test_frame_histogram() {
        let histogram = Histogram::frame_time();
        histogram.observe_ms(10.0);
        histogram.observe_ms(20.0);
        histogram.observe_ms(300.0);

        assert_eq!(histogram.count(), 3);
        assert!((histogram.mean_ms() - 110.0).abs() < 1e-6);

        let buckets = histogram.buckets();
        assert_eq!(buckets[0], HistogramBucket { le: 8.0, count: 0 });
        assert_eq!(buckets[1], HistogramBucket { le: 16.0, count: 1 });
        assert_eq!(buckets[2], HistogramBucket { le: 33.0, count: 2 });
    }

    #[test]
    fn test_same_handle_returned() {
        let collector = MetricsCollector::new();
        let a = collector.counter("frames_total");
        let b = collector.counter("frames_total");

        a.inc();
        assert_eq!(b.get(), 1);
        assert_eq!(collector.counters().get("frames_total"), Some(&1));
    }

    #[test]
    fn test_export_text() {
        let collector = MetricsCollector::new();
        collector.counter("frames_dropped_total").add(3);
        collector.gauge("resident_resources").set(12);
        collector
            .histogram("frame_duration_ms", FRAME_MS_BUCKETS)
            .observe_ms(12.0);

        let output = collector.export_text();
        assert!(output.contains("frames_dropped_total 3"));
        assert!(output.contains("resident_resources 12"));
        assert!(output.contains("frame_duration_ms_bucket{le=\"16\"} 1"));
        assert!(output.contains("frame_duration_ms_count 1"));
    }
}
