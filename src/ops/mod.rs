//! # Operations — read-only analytics over a Space
//!
//! Nothing here mutates the space. Heavy lifting (clustering, projection) is
//! handed to the `Clusterer` / `Reducer` seams in `primitives`; the rest is
//! small enough to compute inline, with rayon for the N² and pairwise work.

pub mod interpolate;
pub mod project;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::debug;

use crate::model::{Point, DIMENSIONS};
use crate::primitives::{CancelToken, Clusterer, KMeans, Reducers};
use crate::space::Space;
use crate::{Error, Result};

pub use interpolate::InterpolationStep;
pub use project::ProjectionMethod;

/// Guard for zero-norm rows in the similarity matrix.
const NORM_EPSILON: f32 = 1e-10;

/// Analytics bound to one space.
pub struct Operations<'s> {
    space: &'s Space,
    clusterer: Arc<dyn Clusterer>,
    reducers: Reducers,
    cancel: CancelToken,
}

impl<'s> Operations<'s> {
    /// Default primitives: seeded k-means (10 inits, seed 42) and PCA.
    pub fn new(space: &'s Space) -> Self {
        Self {
            space,
            clusterer: Arc::new(KMeans::default()),
            reducers: Reducers::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_clusterer(mut self, clusterer: Arc<dyn Clusterer>) -> Self {
        self.clusterer = clusterer;
        self
    }

    pub fn with_reducers(mut self, reducers: Reducers) -> Self {
        self.reducers = reducers;
        self
    }

    /// Token polled by the delegated primitives.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn space(&self) -> &Space {
        self.space
    }

    // ========================================================================
    // Similarity
    // ========================================================================

    /// Pairwise cosine similarity of the raw coordinate vectors.
    ///
    /// N×N, symmetric, entries clipped to `[-1, 1]`. Zero vectors have
    /// similarity 0 with everything, including themselves.
    pub fn similarity_matrix(&self) -> Vec<Vec<f32>> {
        let rows = self.space.matrix();
        if rows.is_empty() {
            return Vec::new();
        }

        let normalized: Vec<[f32; DIMENSIONS]> = rows
            .iter()
            .map(|r| {
                let mut norm = r.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm == 0.0 {
                    norm = NORM_EPSILON;
                }
                r.map(|x| x / norm)
            })
            .collect();

        normalized
            .par_iter()
            .map(|a| {
                normalized
                    .iter()
                    .map(|b| {
                        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
                        dot.clamp(-1.0, 1.0)
                    })
                    .collect()
            })
            .collect()
    }

    // ========================================================================
    // Clustering
    // ========================================================================

    /// Group points with the configured clusterer.
    ///
    /// Every id in `0..n_clusters` is present in the result, possibly empty.
    pub fn clusters(
        &self,
        n_clusters: usize,
        max_iterations: usize,
    ) -> Result<BTreeMap<usize, Vec<Point>>> {
        if n_clusters == 0 {
            return Err(Error::Validation("cluster count must be at least 1".into()));
        }
        let available = self.space.len();
        if n_clusters > available {
            return Err(Error::InsufficientData { required: n_clusters, available });
        }

        let start = Instant::now();
        let rows = self.space.matrix();
        let labels = self
            .clusterer
            .fit_predict(&rows, n_clusters, max_iterations, &self.cancel)?;
        if labels.len() != available {
            return Err(Error::Backend(format!(
                "{} returned {} labels for {available} points",
                self.clusterer.name(),
                labels.len()
            )));
        }

        let mut groups: BTreeMap<usize, Vec<Point>> =
            (0..n_clusters).map(|c| (c, Vec::new())).collect();
        for (point, label) in self.space.points().iter().zip(labels) {
            let members = groups.get_mut(&label).ok_or_else(|| {
                Error::Backend(format!(
                    "{} produced out-of-range label {label}",
                    self.clusterer.name()
                ))
            })?;
            members.push(point.clone());
        }

        debug!(
            n_clusters,
            clusterer = self.clusterer.name(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "clusters"
        );
        Ok(groups)
    }

    // ========================================================================
    // Projection
    // ========================================================================

    /// Project every point to `target_dimensions` with the reducer registered
    /// for `method`. Rows follow point order.
    pub fn project(
        &self,
        target_dimensions: usize,
        method: ProjectionMethod,
    ) -> Result<Vec<Vec<f32>>> {
        if target_dimensions == 0 || target_dimensions > DIMENSIONS {
            return Err(Error::Validation(format!(
                "target dimensions must be in 1..={DIMENSIONS}, got {target_dimensions}"
            )));
        }
        if self.space.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let reducer = self.reducers.get(method)?;
        let rows = self.space.matrix();
        let projected = reducer.fit_transform(&rows, target_dimensions, &self.cancel)?;

        let well_formed = projected.len() == rows.len()
            && projected.iter().all(|r| r.len() == target_dimensions);
        if !well_formed {
            return Err(Error::Backend(format!(
                "{} returned a malformed projection",
                reducer.name()
            )));
        }

        debug!(
            %method,
            target_dimensions,
            elapsed_us = start.elapsed().as_micros() as u64,
            "project"
        );
        Ok(projected)
    }

    // ========================================================================
    // Pairwise distance
    // ========================================================================

    /// Distances for each `(name1, name2)` pair, computed in parallel.
    ///
    /// Output order matches input order. If any name is unknown, nothing is
    /// computed and the error lists every missing name once.
    pub fn parallel_pairwise_distance<S>(&self, pairs: &[(S, S)]) -> Result<Vec<f32>>
    where
        S: AsRef<str> + Sync,
    {
        let mut missing: Vec<String> = Vec::new();
        let mut resolved = Vec::with_capacity(pairs.len());
        for (a, b) in pairs {
            let pa = self.lookup(a.as_ref(), &mut missing);
            let pb = self.lookup(b.as_ref(), &mut missing);
            if let (Some(pa), Some(pb)) = (pa, pb) {
                resolved.push((pa, pb));
            }
        }
        if !missing.is_empty() {
            return Err(Error::NotFound(missing));
        }

        let start = Instant::now();
        let distances: Vec<f32> = resolved
            .par_iter()
            .map(|(a, b)| self.space.distance(a, b))
            .collect();
        debug!(
            pairs = distances.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "parallel_pairwise_distance"
        );
        Ok(distances)
    }

    // ========================================================================
    // Interpolation + centroid
    // ========================================================================

    /// `steps` evenly spaced points from `from` to `to`, endpoints included.
    pub fn interpolate(
        &self,
        from: &str,
        to: &str,
        steps: usize,
    ) -> Result<Vec<InterpolationStep>> {
        let mut missing = Vec::new();
        let start = self.lookup(from, &mut missing);
        let end = self.lookup(to, &mut missing);
        let (Some(start), Some(end)) = (start, end) else {
            return Err(Error::NotFound(missing));
        };
        if steps < 2 {
            return Err(Error::InsufficientData { required: 2, available: steps });
        }
        Ok(interpolate::sample(start, end, from, to, steps))
    }

    /// Mean of the named points, as a new unnamed point.
    pub fn centroid<S: AsRef<str>>(&self, names: &[S]) -> Result<Point> {
        if names.is_empty() {
            return Err(Error::Validation("centroid needs at least one point name".into()));
        }

        let mut missing = Vec::new();
        let members: Vec<&Point> = names
            .iter()
            .filter_map(|n| self.lookup(n.as_ref(), &mut missing))
            .collect();
        if !missing.is_empty() {
            return Err(Error::NotFound(missing));
        }

        let mut sum = [0.0f32; DIMENSIONS];
        for p in &members {
            for (s, v) in sum.iter_mut().zip(p.coords()) {
                *s += v;
            }
        }
        let count = members.len() as f32;
        let listed: Vec<&str> = names.iter().take(5).map(|n| n.as_ref()).collect();
        let more = if names.len() > 5 { ", ..." } else { "" };

        Ok(Point::new(sum.map(|s| s / count))
            .with_description(format!("Centroid of: {}{more}", listed.join(", "))))
    }

    /// Resolve a name, recording it in `missing` (once) when absent.
    fn lookup(&self, name: &str, missing: &mut Vec<String>) -> Option<&'s Point> {
        let space: &'s Space = self.space;
        match space.get(name) {
            Ok(p) => Some(p),
            Err(_) => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                None
            }
        }
    }
}
