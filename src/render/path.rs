//! Path Simplification
//!
//! Long wire paths are resampled uniformly by arc length so stroking cost
//! stays bounded regardless of how many points the diagram author used.

use kurbo::Point;

/// Paths with more points than this are resampled
pub const PATH_COMPLEXITY_THRESHOLD: usize = 100;

/// Point count of a resampled path
pub const PATH_MAX_POINTS: usize = 50;

/// Resample `path` to [`PATH_MAX_POINTS`] if it exceeds
/// [`PATH_COMPLEXITY_THRESHOLD`], otherwise return it unchanged.
///
/// The first and last points are always kept. A path with zero total length
/// collapses to its first point.
pub fn optimize_path(path: &[Point]) -> Vec<Point> {
    if path.len() <= PATH_COMPLEXITY_THRESHOLD {
        return path.to_vec();
    }
    resample(path, PATH_MAX_POINTS)
}

fn resample(path: &[Point], count: usize) -> Vec<Point> {
    // Cumulative arc length at each input point
    let mut cumulative = Vec::with_capacity(path.len());
    let mut total = 0.0;
    cumulative.push(0.0);
    for pair in path.windows(2) {
        total += pair[0].distance(pair[1]);
        cumulative.push(total);
    }

    if total <= f64::EPSILON {
        return vec![path[0]];
    }

    let step = total / (count - 1) as f64;
    let mut out = Vec::with_capacity(count);
    let mut segment = 0;

    for i in 0..count {
        let target = if i == count - 1 { total } else { step * i as f64 };
        while segment + 1 < cumulative.len() - 1 && cumulative[segment + 1] < target {
            segment += 1;
        }
        let start = cumulative[segment];
        let span = cumulative[segment + 1] - start;
        let t = if span > 0.0 {
            ((target - start) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        out.push(path[segment].lerp(path[segment + 1], t));
    }

    out
}
