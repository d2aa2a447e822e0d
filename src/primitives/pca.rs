//! Principal component analysis by power iteration.
//!
//! The covariance matrix is only 7×7, so power iteration with deflation
//! finds each component cheaply. Components are sign-normalized so the
//! largest-magnitude loading is positive, which keeps output stable across
//! runs.

use super::{CancelToken, Reducer};
use crate::model::DIMENSIONS;
use crate::{Error, Result};

type Matrix7 = [[f64; DIMENSIONS]; DIMENSIONS];

#[derive(Debug, Clone, Copy)]
pub struct Pca {
    /// Power-iteration budget per component.
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for Pca {
    fn default() -> Self {
        Self { max_iterations: 200, tolerance: 1e-10 }
    }
}

impl Reducer for Pca {
    fn fit_transform(
        &self,
        rows: &[[f32; DIMENSIONS]],
        target_dimensions: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<f32>>> {
        if target_dimensions == 0 || target_dimensions > DIMENSIONS {
            return Err(Error::Validation(format!(
                "target dimensions must be in 1..={DIMENSIONS}, got {target_dimensions}"
            )));
        }
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let centered = center(rows);
        let mut working = covariance(&centered);
        let mut components = Vec::with_capacity(target_dimensions);

        for _ in 0..target_dimensions {
            cancel.check()?;
            let (eigenvalue, vector) = self.power_iteration(&working);
            if eigenvalue <= self.tolerance {
                // No variance left; remaining components project to zero.
                components.push([0.0; DIMENSIONS]);
                continue;
            }
            for i in 0..DIMENSIONS {
                for j in 0..DIMENSIONS {
                    working[i][j] -= eigenvalue * vector[i] * vector[j];
                }
            }
            components.push(vector);
        }

        Ok(centered
            .iter()
            .map(|row| {
                components
                    .iter()
                    .map(|c| dot(row, c) as f32)
                    .collect()
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "pca"
    }
}

impl Pca {
    /// Dominant eigenpair of a symmetric matrix.
    fn power_iteration(&self, m: &Matrix7) -> (f64, [f64; DIMENSIONS]) {
        let mut v = [0.0f64; DIMENSIONS];
        for (i, x) in v.iter_mut().enumerate() {
            *x = 1.0 + i as f64 * 0.1;
        }
        normalize(&mut v);

        let mut eigenvalue = 0.0;
        for _ in 0..self.max_iterations {
            let mut next = [0.0f64; DIMENSIONS];
            for i in 0..DIMENSIONS {
                next[i] = dot(&m[i], &v);
            }
            eigenvalue = dot(&next, &v);
            if normalize(&mut next) < 1e-15 {
                return (0.0, [0.0; DIMENSIONS]);
            }
            let delta: f64 = next.iter().zip(v.iter()).map(|(a, b)| (a - b).abs()).sum();
            v = next;
            if delta < self.tolerance {
                break;
            }
        }

        // Deterministic sign: largest-magnitude loading is positive.
        let pivot = v
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap_or(0.0);
        if pivot < 0.0 {
            for x in v.iter_mut() {
                *x = -*x;
            }
        }
        (eigenvalue.max(0.0), v)
    }
}

fn center(rows: &[[f32; DIMENSIONS]]) -> Vec<[f64; DIMENSIONS]> {
    let n = rows.len() as f64;
    let mut mean = [0.0f64; DIMENSIONS];
    for row in rows {
        for (m, v) in mean.iter_mut().zip(row) {
            *m += *v as f64;
        }
    }
    for m in mean.iter_mut() {
        *m /= n;
    }
    rows.iter()
        .map(|row| {
            let mut c = [0.0f64; DIMENSIONS];
            for k in 0..DIMENSIONS {
                c[k] = row[k] as f64 - mean[k];
            }
            c
        })
        .collect()
}

fn covariance(centered: &[[f64; DIMENSIONS]]) -> Matrix7 {
    let denom = (centered.len().saturating_sub(1)).max(1) as f64;
    let mut cov = [[0.0f64; DIMENSIONS]; DIMENSIONS];
    for row in centered {
        for i in 0..DIMENSIONS {
            for j in i..DIMENSIONS {
                cov[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..DIMENSIONS {
        for j in i..DIMENSIONS {
            cov[i][j] /= denom;
            cov[j][i] = cov[i][j];
        }
    }
    cov
}

fn dot(a: &[f64; DIMENSIONS], b: &[f64; DIMENSIONS]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Scale to unit length in place; returns the original norm.
fn normalize(v: &mut [f64; DIMENSIONS]) -> f64 {
    let norm = dot(v, v).sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    norm
}
