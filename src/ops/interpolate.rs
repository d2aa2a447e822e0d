//! Straight-line interpolation between two stored points.

use serde::Serialize;

use crate::model::{Point, DIMENSIONS};
use crate::space::metric::euclidean;

/// One sample along the segment between two points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterpolationStep {
    pub point: Point,
    /// Fraction of the way from start to end, in `[0, 1]`.
    pub alpha: f32,
    /// Raw Euclidean distance, not the weighted metric.
    pub distance_to_start: f32,
    pub distance_to_end: f32,
}

/// `steps` evenly spaced samples, both endpoints included. `steps >= 2`.
pub(crate) fn sample(
    start: &Point,
    end: &Point,
    from: &str,
    to: &str,
    steps: usize,
) -> Vec<InterpolationStep> {
    let v1 = start.to_vector();
    let v2 = end.to_vector();
    let last = (steps - 1) as f32;

    (0..steps)
        .map(|s| {
            let alpha = s as f32 / last;
            let mut coords = [0.0f32; DIMENSIONS];
            for k in 0..DIMENSIONS {
                coords[k] = v1[k] * (1.0 - alpha) + v2[k] * alpha;
            }
            let description = format!("Interpolation between {from} and {to} (step {alpha:.2})");
            let point = Point::new(coords)
                .with_name(format!("{from}_to_{to}_{alpha:.2}"))
                .with_description(description);
            InterpolationStep {
                distance_to_start: euclidean(&coords, &v1),
                distance_to_end: euclidean(&coords, &v2),
                point,
                alpha,
            }
        })
        .collect()
}
