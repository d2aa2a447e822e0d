//! # SpaceContext — the shared handle
//!
//! One `Space` behind `Arc<RwLock<..>>` plus the primitives and settings the
//! analytics run with. Construct once and pass it by reference (or wrap it in
//! an `Arc`) to every caller that needs the space.
//!
//! Lock discipline: readers take the read lock for the duration of a closure
//! or call, mutations take the write lock, and `import` swaps the whole space
//! under the write lock after the new one has been fully loaded. Bounded
//! analytics never hold the lock while they run; they work on a snapshot.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::batch::BatchProcessor;
use crate::config::SpaceConfig;
use crate::model::{Point, PointDraft, PointUpdate, DIMENSIONS};
use crate::ops::Operations;
use crate::primitives::{Clusterer, KMeans, Reducers};
use crate::space::{Neighbor, Space};
use crate::{Error, Result};

#[cfg(feature = "runtime")]
use std::collections::BTreeMap;
#[cfg(feature = "runtime")]
use crate::ops::ProjectionMethod;
#[cfg(feature = "runtime")]
use crate::primitives::CancelToken;

/// Fixed per-point overhead counted by `stats`: the coordinate array.
const COORD_BYTES: usize = DIMENSIONS * std::mem::size_of::<f32>();

// ============================================================================
// Report types
// ============================================================================

/// One draft that failed validation during a bulk import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportItemError {
    pub index: usize,
    /// Draft name, or `unnamed_{index}`.
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<ImportItemError>,
}

/// Window and filters for `list_points`. The window is applied first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListFilter {
    pub skip: usize,
    pub limit: usize,
    /// Case-insensitive substring of the name. Unnamed points never match.
    pub name_contains: Option<String>,
    pub min_truth: Option<f32>,
    pub max_truth: Option<f32>,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self { skip: 0, limit: 100, name_contains: None, min_truth: None, max_truth: None }
    }
}

impl ListFilter {
    fn matches(&self, point: &Point) -> bool {
        if let Some(needle) = &self.name_contains {
            let needle = needle.to_lowercase();
            match &point.name {
                Some(name) if name.to_lowercase().contains(&needle) => {}
                _ => return false,
            }
        }
        if self.min_truth.is_some_and(|min| point.i() < min) {
            return false;
        }
        if self.max_truth.is_some_and(|max| point.i() > max) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpaceStats {
    pub total_points: usize,
    pub dimensions: usize,
    pub size_bytes: usize,
    /// Latest `updated_at` across all points, 0 when empty.
    pub last_updated: f64,
    pub distance_calls: u64,
    pub neighbor_searches: u64,
    /// Duration of the most recent distance or neighbor search.
    pub last_operation_us: u64,
}

// ============================================================================
// SpaceContext
// ============================================================================

pub struct SpaceContext {
    space: Arc<RwLock<Space>>,
    config: SpaceConfig,
    clusterer: Arc<dyn Clusterer>,
    reducers: Reducers,
    batch: BatchProcessor,
}

impl std::fmt::Debug for SpaceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceContext")
            .field("points", &self.space.read().len())
            .field("clusterer", &self.clusterer.name())
            .field("reducers", &self.reducers)
            .field("batch", &self.batch)
            .finish()
    }
}

impl SpaceContext {
    /// Build from `config`, loading `snapshot_path` when the file exists.
    pub fn new(config: SpaceConfig) -> Result<Self> {
        config.validate()?;
        let space = match &config.snapshot_path {
            Some(path) if path.exists() => Space::load(path)?,
            _ => Space::new(),
        };
        let batch = BatchProcessor::new(config.workers())?;
        let clusterer: Arc<dyn Clusterer> =
            Arc::new(KMeans::new(config.kmeans_n_init, config.kmeans_seed));

        Ok(Self {
            space: Arc::new(RwLock::new(space)),
            config,
            clusterer,
            reducers: Reducers::default(),
            batch,
        })
    }

    /// Empty space with default settings.
    pub fn in_memory() -> Result<Self> {
        Self::new(SpaceConfig::default())
    }

    pub fn with_clusterer(mut self, clusterer: Arc<dyn Clusterer>) -> Self {
        self.clusterer = clusterer;
        self
    }

    pub fn with_reducers(mut self, reducers: Reducers) -> Self {
        self.reducers = reducers;
        self
    }

    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    // ========================================================================
    // Lock access
    // ========================================================================

    /// Run `f` under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&Space) -> R) -> R {
        f(&*self.space.read())
    }

    /// Run `f` under the write lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut Space) -> R) -> R {
        f(&mut *self.space.write())
    }

    /// Run `f` with analytics bound to the live space, under the read lock.
    pub fn analyze<R>(&self, f: impl FnOnce(&Operations<'_>) -> R) -> R {
        let space = self.space.read();
        let ops = Operations::new(&space)
            .with_clusterer(Arc::clone(&self.clusterer))
            .with_reducers(self.reducers.clone());
        f(&ops)
    }

    /// Map `f` over every point with the configured pool and batch size.
    pub fn process_in_batches<F, R>(&self, f: F) -> Result<Vec<R>>
    where
        F: Fn(&Point) -> R + Send + Sync,
        R: Send,
    {
        let space = self.space.read();
        self.batch.process_in_batches(&space, f, self.config.batch_size)
    }

    // ========================================================================
    // Point CRUD
    // ========================================================================

    /// Validate a draft and store it. A draft whose name is taken is
    /// rejected rather than replacing the stored point.
    #[tracing::instrument(skip_all, fields(name = draft.name.as_deref()))]
    pub fn create_point(&self, draft: PointDraft) -> Result<Point> {
        let point = draft.validate()?;
        let mut space = self.space.write();
        if let Some(name) = point.name.as_deref() {
            if space.contains(name) {
                return Err(Error::DuplicateName(name.to_string()));
            }
        }
        Ok(space.add(point).clone())
    }

    pub fn get_point(&self, name: &str) -> Result<Point> {
        self.space.read().get(name).cloned()
    }

    /// Range-check `update` and apply it to a stored point.
    pub fn update_point(&self, name: &str, update: PointUpdate) -> Result<Point> {
        update.validate()?;
        self.space.write().update(name, update).cloned()
    }

    pub fn delete_point(&self, name: &str) -> Result<Point> {
        let removed = self.space.write().remove(name)?;
        debug!(name, "point deleted");
        Ok(removed)
    }

    /// Points in insertion order: `skip`/`limit` window first, then filters.
    pub fn list_points(&self, filter: &ListFilter) -> Vec<Point> {
        let space = self.space.read();
        space
            .iter()
            .skip(filter.skip)
            .take(filter.limit)
            .filter(|p| filter.matches(p))
            .cloned()
            .collect()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn distance(&self, a: &str, b: &str) -> Result<f32> {
        self.space.read().distance_between(a, b)
    }

    /// Nearest neighbors of a stored point; `None` uses `default_neighbors`.
    pub fn neighbors(&self, name: &str, k: Option<usize>) -> Result<Vec<Neighbor>> {
        let k = k.unwrap_or(self.config.default_neighbors);
        self.space.read().neighbors_of(name, k)
    }

    /// Case-insensitive substring match over names, then descriptions.
    /// Hits come back in insertion order with distance 0.
    pub fn search_text(&self, query: &str, k: usize) -> Vec<Neighbor> {
        let query = query.to_lowercase();
        let contains = |s: &Option<String>| {
            s.as_ref().is_some_and(|s| s.to_lowercase().contains(&query))
        };

        let space = self.space.read();
        space
            .iter()
            .filter(|p| contains(&p.name) || contains(&p.description))
            .take(k)
            .map(|p| Neighbor { point: p.clone(), distance: 0.0 })
            .collect()
    }

    pub fn stats(&self) -> SpaceStats {
        let space = self.space.read();
        let size_bytes = space
            .iter()
            .map(|p| {
                p.name.as_ref().map_or(0, String::len)
                    + p.description.as_ref().map_or(0, String::len)
                    + COORD_BYTES
            })
            .sum();
        let last_updated = space.iter().map(Point::updated_at).fold(0.0, f64::max);
        let metrics = space.metrics();

        SpaceStats {
            total_points: space.len(),
            dimensions: DIMENSIONS,
            size_bytes,
            last_updated,
            distance_calls: metrics.distance_calls,
            neighbor_searches: metrics.neighbor_searches,
            last_operation_us: metrics.last_operation_us,
        }
    }

    // ========================================================================
    // Import / export
    // ========================================================================

    /// Validate and add each draft, continuing past failures. Drafts whose
    /// name already exists are skipped.
    #[tracing::instrument(skip_all, fields(drafts = drafts.len()))]
    pub fn bulk_import(&self, drafts: Vec<PointDraft>) -> ImportReport {
        let start = Instant::now();
        let mut report = ImportReport::default();
        let mut space = self.space.write();

        for (index, draft) in drafts.into_iter().enumerate() {
            let point = match draft.validate() {
                Ok(point) => point,
                Err(e) => {
                    let name = draft.name.unwrap_or_else(|| format!("unnamed_{index}"));
                    warn!(index, %name, error = %e, "bulk import item rejected");
                    report.errors.push(ImportItemError { index, name, error: e.to_string() });
                    continue;
                }
            };
            if point.name.as_deref().is_some_and(|n| space.contains(n)) {
                report.skipped += 1;
                continue;
            }
            space.add(point);
            report.imported += 1;
        }

        info!(
            imported = report.imported,
            skipped = report.skipped,
            failed = report.errors.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "bulk import"
        );
        report
    }

    /// Write the current space as a snapshot.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        self.space.read().save(path)
    }

    /// Replace the whole space with the snapshot at `path`. The current space
    /// stays in place if the file cannot be read or parsed.
    pub fn import(&self, path: impl AsRef<Path>) -> Result<usize> {
        let fresh = Space::load(path)?;
        let count = fresh.len();
        *self.space.write() = fresh;
        Ok(count)
    }

    /// Copy of the live points, detached from the lock.
    #[cfg(feature = "runtime")]
    fn snapshot(&self) -> Space {
        Space::from_points(self.space.read().points().to_vec())
    }
}

// ============================================================================
// Bounded analytics
// ============================================================================

#[cfg(feature = "runtime")]
impl SpaceContext {
    /// Cluster a snapshot of the space, giving up after
    /// `analytics_timeout_ms`.
    pub async fn clusters_within(
        &self,
        n_clusters: usize,
        max_iterations: Option<usize>,
    ) -> Result<BTreeMap<usize, Vec<Point>>> {
        let max_iterations = max_iterations.unwrap_or(self.config.max_iterations);
        self.bounded("clusters", move |ops| ops.clusters(n_clusters, max_iterations))
            .await
    }

    /// Project a snapshot of the space, giving up after
    /// `analytics_timeout_ms`.
    pub async fn project_within(
        &self,
        target_dimensions: usize,
        method: ProjectionMethod,
    ) -> Result<Vec<Vec<f32>>> {
        self.bounded("project", move |ops| ops.project(target_dimensions, method))
            .await
    }

    /// Run `job` on the blocking pool over a detached snapshot. On expiry the
    /// cancel token is tripped so the worker stops at its next poll.
    async fn bounded<T, F>(&self, label: &'static str, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'s> FnOnce(Operations<'s>) -> Result<T> + Send + 'static,
    {
        let limit = self.config.analytics_timeout();
        let snapshot = self.snapshot();
        let clusterer = Arc::clone(&self.clusterer);
        let reducers = self.reducers.clone();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let ops = Operations::new(&snapshot)
                .with_clusterer(clusterer)
                .with_reducers(reducers)
                .with_cancel(worker_cancel);
            job(ops)
        });

        match tokio::time::timeout(limit, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::Backend(format!("{label} worker failed: {e}"))),
            Err(_) => {
                cancel.cancel();
                warn!(
                    operation = label,
                    timeout_ms = limit.as_millis() as u64,
                    "analytics timed out"
                );
                Err(Error::Timeout(limit))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn draft(name: &str, x: f64, i: f64) -> PointDraft {
        PointDraft {
            x,
            y: 0.0,
            z: 0.0,
            t: 0.0,
            o: "inside".into(),
            i,
            n: 0,
            name: Some(name.into()),
            description: None,
            metadata: None,
        }
    }

    fn seeded() -> SpaceContext {
        let ctx = SpaceContext::in_memory().unwrap();
        for (k, name) in ["Alpha", "beta", "Gamma", "alphabet"].iter().enumerate() {
            ctx.create_point(draft(name, k as f64 * 0.2, k as f64 * 0.25)).unwrap();
        }
        ctx
    }

    #[test]
    fn test_create_rejects_duplicate_name() {
        let ctx = seeded();
        let err = ctx.create_point(draft("beta", 0.9, 0.1)).unwrap_err();
        assert!(matches!(err, Error::DuplicateName(ref n) if n == "beta"));
        assert_eq!(ctx.get_point("beta").unwrap().x(), 0.2);
    }

    #[test]
    fn test_create_rejects_out_of_range() {
        let ctx = SpaceContext::in_memory().unwrap();
        assert!(matches!(ctx.create_point(draft("bad", 1.5, 0.0)), Err(Error::Validation(_))));
        assert_eq!(ctx.read(Space::len), 0);
    }

    #[test]
    fn test_update_and_delete() {
        let ctx = seeded();
        let p = ctx
            .update_point("Gamma", PointUpdate { i: Some(0.9), ..Default::default() })
            .unwrap();
        assert_eq!(p.i(), 0.9);

        let removed = ctx.delete_point("Gamma").unwrap();
        assert_eq!(removed.name.as_deref(), Some("Gamma"));
        assert!(matches!(ctx.get_point("Gamma"), Err(Error::NotFound(_))));
        assert!(matches!(ctx.delete_point("Gamma"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_list_window_then_filter() {
        let ctx = seeded();
        let filter = ListFilter { name_contains: Some("ALPHA".into()), ..Default::default() };
        let names: Vec<_> = ctx.list_points(&filter).into_iter().filter_map(|p| p.name).collect();
        assert_eq!(names, vec!["Alpha", "alphabet"]);

        // window of two drops "alphabet" before the name filter sees it
        let filter = ListFilter {
            limit: 2,
            name_contains: Some("alpha".into()),
            ..Default::default()
        };
        assert_eq!(ctx.list_points(&filter).len(), 1);

        let filter = ListFilter {
            min_truth: Some(0.3),
            max_truth: Some(0.6),
            ..Default::default()
        };
        let names: Vec<_> = ctx.list_points(&filter).into_iter().filter_map(|p| p.name).collect();
        assert_eq!(names, vec!["Gamma"]);
    }

    #[test]
    fn test_search_text_matches_description() {
        let ctx = seeded();
        let mut d = draft("delta", 0.1, 0.1);
        d.description = Some("Near the ALPHA cluster".into());
        ctx.create_point(d).unwrap();

        let hits = ctx.search_text("alpha", 10);
        let names: Vec<_> = hits.iter().filter_map(|h| h.point.name.clone()).collect();
        assert_eq!(names, vec!["Alpha", "alphabet", "delta"]);
        assert!(hits.iter().all(|h| h.distance == 0.0));
        assert_eq!(ctx.search_text("alpha", 1).len(), 1);
    }

    #[test]
    fn test_stats() {
        let ctx = SpaceContext::in_memory().unwrap();
        assert_eq!(ctx.stats().last_updated, 0.0);

        let mut d = draft("ab", 0.0, 0.0);
        d.description = Some("xyz".into());
        ctx.create_point(d).unwrap();
        ctx.neighbors("ab", None).unwrap();

        let stats = ctx.stats();
        assert_eq!(stats.total_points, 1);
        assert_eq!(stats.dimensions, 7);
        assert_eq!(stats.size_bytes, 2 + 3 + 28);
        assert!(stats.last_updated > 0.0);
        assert_eq!(stats.neighbor_searches, 1);
    }

    #[test]
    fn test_process_in_batches_uses_configured_pool() {
        let ctx = seeded();
        let names = ctx.process_in_batches(|p| p.name.clone().unwrap_or_default()).unwrap();
        assert_eq!(names, vec!["Alpha", "beta", "Gamma", "alphabet"]);
    }

    #[test]
    fn test_analyze_sees_live_space() {
        let ctx = seeded();
        let m = ctx.analyze(|ops| ops.similarity_matrix());
        assert_eq!(m.len(), 4);
    }
}
