//! Food cluster placement.
//!
//! Food spawns in clusters spread evenly along the world's X axis, jittered on Y by a seeded
//! hash so the layout is reproducible given the same seed but doesn't look like a grid. This
//! deliberately avoids the divide-by-first-index pattern that the arithmetic it's descended from
//! was prone to: `count == 0` always yields no points instead of dividing by it.

use crate::fixed::{Qw, QwPos};

/// Compute the `count` evenly spaced, Y-jittered spawn points for cluster `cluster_index` across
/// a world span of `[0, span_x]`, using `seed` to derive per-point jitter.
pub fn positions(cluster_index: u32, count: u32, span_x: Qw, jitter_y: Qw, seed: u64) -> Vec<QwPos> {
    if count == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(count as usize);
    for point_index in 0..count {
        // Evenly spaced including both endpoints when count > 1, otherwise centered.
        let x = if count == 1 {
            span_x.div(Qw::from_int(2))
        } else {
            span_x.mul_int_trunc(point_index as i32).div(Qw::from_int((count - 1) as i32))
        };
        let jitter_unit = splitmix64(seed, cluster_index as u64, point_index as u64);
        // Map the 64-bit hash onto [-1.0, 1.0) and scale by jitter_y.
        let unit = (jitter_unit >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0;
        let y = jitter_y.mul(Qw::from_f64(unit));
        out.push(QwPos::new(x, y));
    }
    out
}

/// A small, well-mixed 64-bit hash (splitmix64 finalizer) over `(seed, cluster_index,
/// point_index)`. Deterministic across platforms since it's pure integer arithmetic.
fn splitmix64(seed: u64, cluster_index: u64, point_index: u64) -> u64 {
    let mut z = seed
        .wrapping_add(cluster_index.wrapping_mul(0x9E3779B97F4A7C15))
        .wrapping_add(point_index.wrapping_mul(0xBF58476D1CE4E5B9));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_count_yields_no_points() {
        let pts = positions(0, 0, Qw::from_int(100), Qw::from_int(5), 42);
        assert!(pts.is_empty());
    }

    #[test]
    fn single_point_is_centered() {
        let pts = positions(0, 1, Qw::from_int(100), Qw::from_int(5), 42);
        assert_eq!(pts.len(), 1);
        assert_eq!(pts[0].x, Qw::from_int(50));
    }

    #[test]
    fn points_span_full_width_evenly() {
        let pts = positions(0, 3, Qw::from_int(100), Qw::from_int(5), 7);
        assert_eq!(pts.len(), 3);
        assert_eq!(pts[0].x, Qw::ZERO);
        assert_eq!(pts[2].x, Qw::from_int(100));
    }

    #[test]
    fn same_seed_is_deterministic() {
        let a = positions(3, 5, Qw::from_int(200), Qw::from_int(10), 99);
        let b = positions(3, 5, Qw::from_int(200), Qw::from_int(10), 99);
        assert_eq!(a, b);
    }

    #[test]
    fn different_clusters_jitter_differently() {
        let a = positions(1, 4, Qw::from_int(200), Qw::from_int(10), 99);
        let b = positions(2, 4, Qw::from_int(200), Qw::from_int(10), 99);
        assert_ne!(a, b);
    }
}
