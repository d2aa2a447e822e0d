//! # Space — the point index
//!
//! Insertion-ordered points, a name → position map and a lazily built
//! coordinate matrix whose rows mirror the points.
//!
//! ## Invariants
//!
//! - `index[name] == k` iff `points[k].name == Some(name)`
//! - when the matrix cache is present, `cache[k] == points[k].coords`
//! - every structural change goes through `add`, `update`, `remove` or a
//!   load, and each of those invalidates or rebuilds the cache
//!
//! ## Concurrency
//!
//! No lock guards the point sequence: readers hold `&Space`, writers hold
//! `&mut Space`. Counters are atomics so `distance` and neighbor search stay
//! `&self`. The matrix cache sits behind its own `RwLock`, making the lazy
//! rebuild a separate critical section. Share a `Space` across threads via
//! `SpaceContext`.

pub mod metric;
pub mod snapshot;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Point, PointUpdate, DIMENSIONS};
use crate::{Error, Result};

/// Dense row-major coordinate matrix shared with readers.
pub(crate) type Matrix = Arc<[[f32; DIMENSIONS]]>;

// ============================================================================
// Metrics
// ============================================================================

/// Telemetry counters. Never used for correctness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceMetrics {
    #[serde(default)]
    pub distance_calls: u64,
    #[serde(default)]
    pub neighbor_searches: u64,
    /// Duration of the most recent distance or neighbor search.
    #[serde(default)]
    pub last_operation_us: u64,
}

#[derive(Debug, Default)]
struct Counters {
    distance_calls: AtomicU64,
    neighbor_searches: AtomicU64,
    last_operation_us: AtomicU64,
}

impl Counters {
    fn from_metrics(m: SpaceMetrics) -> Self {
        Self {
            distance_calls: AtomicU64::new(m.distance_calls),
            neighbor_searches: AtomicU64::new(m.neighbor_searches),
            last_operation_us: AtomicU64::new(m.last_operation_us),
        }
    }

    fn snapshot(&self) -> SpaceMetrics {
        SpaceMetrics {
            distance_calls: self.distance_calls.load(Ordering::Relaxed),
            neighbor_searches: self.neighbor_searches.load(Ordering::Relaxed),
            last_operation_us: self.last_operation_us.load(Ordering::Relaxed),
        }
    }

    /// Store the elapsed time since `start` as the last operation time.
    fn record(&self, start: Instant) -> u64 {
        let elapsed_us = start.elapsed().as_micros() as u64;
        self.last_operation_us.store(elapsed_us, Ordering::Relaxed);
        elapsed_us
    }
}

// ============================================================================
// Neighbor
// ============================================================================

/// One neighbor-search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub point: Point,
    pub distance: f32,
}

// ============================================================================
// Space
// ============================================================================

#[derive(Debug, Default)]
pub struct Space {
    points: Vec<Point>,
    index: HashMap<String, usize>,
    cache: RwLock<Option<Matrix>>,
    counters: Counters,
}

impl Space {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an existing list. Later points replace earlier ones that
    /// share a name.
    pub fn from_points(points: impl IntoIterator<Item = Point>) -> Self {
        let mut space = Self::new();
        for point in points {
            space.add(point);
        }
        space
    }

    pub(crate) fn with_metrics(mut self, metrics: SpaceMetrics) -> Self {
        self.counters = Counters::from_metrics(metrics);
        self
    }

    // ========================================================================
    // Read access
    // ========================================================================

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All points in insertion order.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Result<&Point> {
        self.position(name)
            .map(|k| &self.points[k])
            .ok_or_else(|| Error::not_found(name))
    }

    pub fn metrics(&self) -> SpaceMetrics {
        self.counters.snapshot()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Insert a point, replacing in place when its name already exists.
    pub fn add(&mut self, point: Point) -> &Point {
        let existing = point.name.as_deref().and_then(|n| self.position(n));
        let slot = match existing {
            Some(k) => {
                self.points[k] = point;
                k
            }
            None => {
                let k = self.points.len();
                if let Some(name) = &point.name {
                    self.index.insert(name.clone(), k);
                }
                self.points.push(point);
                k
            }
        };
        self.invalidate_cache();
        &self.points[slot]
    }

    /// Apply a partial update to a stored point.
    pub fn update(&mut self, name: &str, update: PointUpdate) -> Result<&Point> {
        let k = self.position(name).ok_or_else(|| Error::not_found(name))?;
        self.points[k].update(update);
        self.invalidate_cache();
        Ok(&self.points[k])
    }

    /// Remove a point by name. The index and the matrix are rebuilt from
    /// scratch afterwards.
    pub fn remove(&mut self, name: &str) -> Result<Point> {
        let k = self.position(name).ok_or_else(|| Error::not_found(name))?;
        let mut removed = None;
        let points = std::mem::take(&mut self.points);
        self.points = points
            .into_iter()
            .enumerate()
            .filter_map(|(i, p)| {
                if i == k {
                    removed = Some(p);
                    None
                } else {
                    Some(p)
                }
            })
            .collect();
        self.rebuild();
        removed.ok_or_else(|| Error::not_found(name))
    }

    /// Rebuild the name index and coordinate matrix from the point list.
    fn rebuild(&mut self) {
        self.index = self
            .points
            .iter()
            .enumerate()
            .filter_map(|(k, p)| p.name.clone().map(|n| (n, k)))
            .collect();
        let matrix = self.build_matrix();
        *self.cache.get_mut() = Some(matrix);
    }

    fn invalidate_cache(&mut self) {
        *self.cache.get_mut() = None;
    }

    fn build_matrix(&self) -> Matrix {
        self.points.iter().map(Point::to_vector).collect()
    }

    /// Coordinate matrix, built on first use after a change.
    pub(crate) fn matrix(&self) -> Matrix {
        if let Some(m) = self.cache.read().as_ref() {
            return Arc::clone(m);
        }
        let mut slot = self.cache.write();
        match slot.as_ref() {
            Some(m) => Arc::clone(m),
            None => {
                let m = self.build_matrix();
                *slot = Some(Arc::clone(&m));
                m
            }
        }
    }

    // ========================================================================
    // Distance + neighbor search
    // ========================================================================

    /// Weighted circular distance between two points.
    pub fn distance(&self, a: &Point, b: &Point) -> f32 {
        let start = Instant::now();
        let d = metric::weighted_distance(a.coords(), b.coords());
        self.counters.distance_calls.fetch_add(1, Ordering::Relaxed);
        let elapsed_us = self.counters.record(start);
        debug!(elapsed_us, "distance");
        d
    }

    /// Distance between two stored points, by name.
    pub fn distance_between(&self, a: &str, b: &str) -> Result<f32> {
        match (self.get(a), self.get(b)) {
            (Ok(pa), Ok(pb)) => Ok(self.distance(pa, pb)),
            (pa, pb) => {
                let mut missing = Vec::new();
                if pa.is_err() {
                    missing.push(a.to_string());
                }
                if pb.is_err() && a != b {
                    missing.push(b.to_string());
                }
                Err(Error::NotFound(missing))
            }
        }
    }

    /// The `k` nearest points to `query`, ascending by distance.
    ///
    /// A query that carries the name of a stored point excludes that entry.
    /// Exclusion is by name, never by coordinate equality, so a detached
    /// copy of a stored point still finds other points at the same location.
    pub fn find_nearest_neighbors(&self, query: &Point, k: usize) -> Vec<Neighbor> {
        let start = Instant::now();
        let excluded = query.name.as_deref().and_then(|n| self.position(n));
        let rows = self.matrix();
        let distances = metric::distances_to_rows(query.coords(), &rows);

        let mut candidates: Vec<(usize, f32)> = distances
            .into_iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != excluded)
            .collect();

        let take = k.min(candidates.len());
        let mut result = Vec::with_capacity(take);
        if take > 0 {
            if take < candidates.len() {
                candidates.select_nth_unstable_by(take - 1, |a, b| a.1.total_cmp(&b.1));
                candidates.truncate(take);
            }
            candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
            result.extend(candidates.into_iter().map(|(i, d)| Neighbor {
                point: self.points[i].clone(),
                distance: d,
            }));
        }

        self.counters.neighbor_searches.fetch_add(1, Ordering::Relaxed);
        let elapsed_us = self.counters.record(start);
        debug!(k = take, elapsed_us, "find_nearest_neighbors");
        result
    }

    /// Neighbors of a stored point, excluding itself.
    pub fn neighbors_of(&self, name: &str, k: usize) -> Result<Vec<Neighbor>> {
        let query = self.get(name)?;
        Ok(self.find_nearest_neighbors(query, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn axis_point(name: &str, k: usize, v: f32) -> Point {
        let mut c = [0.0; DIMENSIONS];
        c[k] = v;
        Point::new(c).with_name(name)
    }

    fn abc() -> Space {
        Space::from_points([
            axis_point("a", 0, 0.0),
            axis_point("b", 0, 1.0),
            axis_point("c", 1, 1.0),
        ])
    }

    fn assert_cache_coherent(space: &Space) {
        let m = space.matrix();
        assert_eq!(m.len(), space.len());
        for (row, p) in m.iter().zip(space.points()) {
            assert_eq!(row, p.coords());
        }
    }

    #[test]
    fn test_add_appends_and_indexes() {
        let space = abc();
        assert_eq!(space.len(), 3);
        assert_eq!(space.position("c"), Some(2));
        assert!(space.contains("b"));
    }

    #[test]
    fn test_add_replaces_by_name_in_place() {
        let mut space = abc();
        let _ = space.matrix();
        space.add(axis_point("b", 2, 0.5));
        assert_eq!(space.len(), 3);
        assert_eq!(space.position("b"), Some(1));
        assert_eq!(space.get("b").unwrap().z(), 0.5);
        assert_cache_coherent(&space);
    }

    #[test]
    fn test_unnamed_points_are_not_indexed() {
        let mut space = Space::new();
        space.add(Point::new([0.0; 7]));
        space.add(Point::new([0.1; 7]));
        assert_eq!(space.len(), 2);
        assert!(space.index.is_empty());
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let space = abc();
        assert!(matches!(
            space.get("zzz"),
            Err(Error::NotFound(n)) if n == vec!["zzz".to_string()]
        ));
    }

    #[test]
    fn test_remove_rebuilds_index_and_cache() {
        let mut space = abc();
        let _ = space.matrix();
        let removed = space.remove("a").unwrap();
        assert_eq!(removed.name.as_deref(), Some("a"));
        assert_eq!(space.len(), 2);
        assert_eq!(space.position("b"), Some(0));
        assert_eq!(space.position("c"), Some(1));
        assert!(space.get("a").is_err());
        assert!(space.cache.read().is_some());
        assert_cache_coherent(&space);
    }

    #[test]
    fn test_update_invalidates_cache() {
        let mut space = abc();
        let _ = space.matrix();
        space
            .update("a", PointUpdate { x: Some(0.9), ..Default::default() })
            .unwrap();
        assert!(space.cache.read().is_none());
        assert_cache_coherent(&space);
    }

    #[test]
    fn test_distance_examples() {
        let space = abc();
        let d_ab = space.distance_between("a", "b").unwrap();
        let d_ac = space.distance_between("a", "c").unwrap();
        assert!((d_ab - 1.0).abs() < 1e-6);
        assert!((d_ac - 0.8).abs() < 1e-6);
        assert_eq!(space.metrics().distance_calls, 2);
    }

    #[test]
    fn test_last_operation_time_is_recorded() {
        let stale = SpaceMetrics { last_operation_us: 9_999_999_999, ..Default::default() };
        let space = abc().with_metrics(stale);
        assert_eq!(space.metrics().last_operation_us, 9_999_999_999);

        space.distance_between("a", "b").unwrap();
        let after_distance = space.metrics().last_operation_us;
        assert!(after_distance < 9_999_999_999);

        let restored = abc().with_metrics(stale);
        restored.neighbors_of("a", 1).unwrap();
        assert!(restored.metrics().last_operation_us < 9_999_999_999);
    }

    #[test]
    fn test_distance_between_reports_both_missing() {
        let space = abc();
        match space.distance_between("x", "y") {
            Err(Error::NotFound(names)) => assert_eq!(names, vec!["x", "y"]),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_neighbors_excludes_self_and_sorts() {
        let space = abc();
        let hits = space.neighbors_of("a", 2).unwrap();
        let names: Vec<_> = hits.iter().map(|h| h.point.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["c", "b"]);
        assert!((hits[0].distance - 0.8).abs() < 1e-6);
        assert!((hits[1].distance - 1.0).abs() < 1e-6);
        assert_eq!(space.metrics().neighbor_searches, 1);
    }

    #[test]
    fn test_neighbors_k_larger_than_space() {
        let space = abc();
        assert_eq!(space.neighbors_of("a", 10).unwrap().len(), 2);
        assert!(space.neighbors_of("a", 0).unwrap().is_empty());
    }

    #[test]
    fn test_neighbors_single_point_space() {
        let space = Space::from_points([axis_point("solo", 0, 0.3)]);
        assert!(space.neighbors_of("solo", 3).unwrap().is_empty());
    }

    #[test]
    fn test_detached_query_keeps_coincident_points() {
        let mut space = Space::new();
        space.add(axis_point("p", 0, 0.5));
        space.add(axis_point("q", 0, 0.5));
        let detached = Point::new(*space.get("p").unwrap().coords());
        let hits = space.find_nearest_neighbors(&detached, 5);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.distance == 0.0));

        let hits = space.neighbors_of("p", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].point.name.as_deref(), Some("q"));
    }
}
