//! # Weighted Circular Metric
//!
//! ```text
//! diff      = a - b
//! diff[o]   = min(|diff[o]|, 1 - |diff[o]|)      (ring wrap on the observation axis)
//! distance  = sqrt( Σ (w_k · diff_k)² )
//! ```
//!
//! | Axis | x   | y   | z   | t   | o   | i   | n   |
//! |------|-----|-----|-----|-----|-----|-----|-----|
//! | w    | 1.0 | 0.8 | 0.9 | 0.7 | 0.5 | 1.2 | 0.6 |
//!
//! A positive-weighted Euclidean norm over per-axis metrics is itself a
//! metric, so symmetry, identity and the triangle inequality all hold.

use crate::model::DIMENSIONS;
use crate::model::point::O;

/// Per-axis weights in storage order.
pub const WEIGHTS: [f32; DIMENSIONS] = [1.0, 0.8, 0.9, 0.7, 0.5, 1.2, 0.6];

/// Index of the circular axis.
pub const CIRCULAR_AXIS: usize = O;

/// Shortest separation of two normalized ring positions.
#[inline(always)]
pub fn circular_delta(delta: f32) -> f32 {
    let d = delta.abs();
    d.min(1.0 - d)
}

/// Weighted squared distance. Ordering-equivalent to `weighted_distance`.
#[inline]
pub fn weighted_distance_squared(a: &[f32; DIMENSIONS], b: &[f32; DIMENSIONS]) -> f32 {
    let mut sum = 0.0f32;
    for k in 0..DIMENSIONS {
        let mut diff = a[k] - b[k];
        if k == CIRCULAR_AXIS {
            diff = circular_delta(diff);
        }
        let w = WEIGHTS[k] * diff;
        sum += w * w;
    }
    sum
}

#[inline]
pub fn weighted_distance(a: &[f32; DIMENSIONS], b: &[f32; DIMENSIONS]) -> f32 {
    weighted_distance_squared(a, b).sqrt()
}

/// Plain Euclidean distance on raw coordinates (no weights, no wrap).
pub fn euclidean(a: &[f32; DIMENSIONS], b: &[f32; DIMENSIONS]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Distances from `query` to every row of `rows`.
pub fn distances_to_rows(query: &[f32; DIMENSIONS], rows: &[[f32; DIMENSIONS]]) -> Vec<f32> {
    rows.iter().map(|row| weighted_distance(query, row)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn axis(k: usize, v: f32) -> [f32; DIMENSIONS] {
        let mut c = [0.0; DIMENSIONS];
        c[k] = v;
        c
    }

    #[test]
    fn test_weights_per_axis() {
        let origin = [0.0; DIMENSIONS];
        for k in 0..DIMENSIONS {
            let d = weighted_distance(&origin, &axis(k, if k == O { 0.25 } else { 1.0 }));
            let expected = if k == O { WEIGHTS[k] * 0.25 } else { WEIGHTS[k] };
            assert!((d - expected).abs() < 1e-6, "axis {k}: {d} != {expected}");
        }
    }

    #[test]
    fn test_circular_wrap() {
        let a = axis(O, 0.1);
        let b = axis(O, 0.95);
        let d = weighted_distance(&a, &b);
        assert!((d - 0.5 * 0.15).abs() < 1e-5);

        let near_edges = weighted_distance(&axis(O, 0.02), &axis(O, 0.99));
        assert!((near_edges - 0.5 * 0.03).abs() < 1e-5);
    }

    #[test]
    fn test_euclidean_ignores_weights() {
        let d = euclidean(&[0.0; DIMENSIONS], &axis(1, 1.0));
        assert!((d - 1.0).abs() < 1e-6);
    }

    fn coords() -> impl Strategy<Value = [f32; DIMENSIONS]> {
        (
            -1.0f32..=1.0,
            -1.0f32..=1.0,
            -1.0f32..=1.0,
            -1.0f32..=1.0,
            0.0f32..=1.0,
            0.0f32..=1.0,
            0u32..50,
        )
            .prop_map(|(x, y, z, t, o, i, n)| [x, y, z, t, o, i, n as f32])
    }

    proptest! {
        #[test]
        fn prop_identity(a in coords()) {
            prop_assert_eq!(weighted_distance(&a, &a), 0.0);
        }

        #[test]
        fn prop_symmetry(a in coords(), b in coords()) {
            prop_assert_eq!(weighted_distance(&a, &b), weighted_distance(&b, &a));
        }

        #[test]
        fn prop_triangle(a in coords(), b in coords(), c in coords()) {
            let ab = weighted_distance(&a, &b);
            let bc = weighted_distance(&b, &c);
            let ac = weighted_distance(&a, &c);
            prop_assert!(ac <= ab + bc + 1e-4);
        }
    }
}
