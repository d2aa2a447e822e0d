//! k-means over raw coordinates.
//!
//! k-means++ seeding followed by Lloyd iterations, repeated `n_init` times
//! from one seeded ChaCha8 stream; the run with the lowest inertia wins.
//! Same seed and same rows always give the same assignment.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::{CancelToken, Clusterer};
use crate::model::DIMENSIONS;
use crate::{Error, Result};

type Row = [f32; DIMENSIONS];

#[derive(Debug, Clone, Copy)]
pub struct KMeans {
    /// Independent initializations.
    pub n_init: usize,
    pub seed: u64,
}

impl Default for KMeans {
    fn default() -> Self {
        Self { n_init: 10, seed: 42 }
    }
}

impl KMeans {
    pub fn new(n_init: usize, seed: u64) -> Self {
        Self { n_init, seed }
    }
}

impl Clusterer for KMeans {
    fn fit_predict(
        &self,
        rows: &[Row],
        k: usize,
        max_iterations: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<usize>> {
        if k == 0 {
            return Err(Error::Validation("cluster count must be at least 1".into()));
        }
        if rows.len() < k {
            return Err(Error::InsufficientData { required: k, available: rows.len() });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut best: Option<(f32, Vec<usize>)> = None;

        for _ in 0..self.n_init.max(1) {
            cancel.check()?;
            let centroids = plus_plus_init(rows, k, &mut rng);
            let (assignments, inertia) = lloyd(rows, centroids, max_iterations.max(1), cancel)?;
            if best.as_ref().is_none_or(|(b, _)| inertia < *b) {
                best = Some((inertia, assignments));
            }
        }

        best.map(|(_, a)| a)
            .ok_or_else(|| Error::Backend("k-means produced no run".into()))
    }

    fn name(&self) -> &'static str {
        "kmeans"
    }
}

fn squared(a: &Row, b: &Row) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index of the closest centroid and its squared distance.
fn nearest(row: &Row, centroids: &[Row]) -> (usize, f32) {
    centroids
        .iter()
        .enumerate()
        .map(|(c, centroid)| (c, squared(row, centroid)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((0, 0.0))
}

/// Choose `k` starting centroids with probability proportional to D².
fn plus_plus_init(rows: &[Row], k: usize, rng: &mut ChaCha8Rng) -> Vec<Row> {
    let n = rows.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(rows[rng.random_range(0..n)]);

    let mut min_d2: Vec<f32> = rows.iter().map(|r| squared(r, &centroids[0])).collect();

    while centroids.len() < k {
        let total: f32 = min_d2.iter().sum();
        let pick = if total <= 0.0 {
            // Every row sits on a centroid already.
            rng.random_range(0..n)
        } else {
            let mut target = rng.random::<f32>() * total;
            let mut chosen = n - 1;
            for (i, d) in min_d2.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        };

        let centroid = rows[pick];
        for (d, row) in min_d2.iter_mut().zip(rows) {
            *d = d.min(squared(row, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

/// Lloyd iterations until assignments stop changing or the budget runs out.
fn lloyd(
    rows: &[Row],
    mut centroids: Vec<Row>,
    max_iterations: usize,
    cancel: &CancelToken,
) -> Result<(Vec<usize>, f32)> {
    let k = centroids.len();
    let mut assignments: Vec<usize> = vec![usize::MAX; rows.len()];
    let mut inertia = 0.0;

    for _ in 0..max_iterations {
        cancel.check()?;

        let step: Vec<(usize, f32)> = rows.par_iter().map(|r| nearest(r, &centroids)).collect();
        let changed = step
            .iter()
            .zip(assignments.iter())
            .any(|((c, _), prev)| c != prev);
        assignments = step.iter().map(|(c, _)| *c).collect();
        inertia = step.iter().map(|(_, d)| d).sum();

        if !changed {
            break;
        }

        let mut sums = vec![[0.0f32; DIMENSIONS]; k];
        let mut counts = vec![0usize; k];
        for (row, &c) in rows.iter().zip(assignments.iter()) {
            counts[c] += 1;
            for (s, v) in sums[c].iter_mut().zip(row) {
                *s += v;
            }
        }
        for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
            // Empty clusters keep their previous centroid.
            if count > 0 {
                *centroid = sum.map(|s| s / count as f32);
            }
        }
    }

    Ok((assignments, inertia))
}
