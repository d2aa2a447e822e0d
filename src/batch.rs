//! # Batch Processor
//!
//! Map a pure function over every point of a space, batch by batch, on a
//! dedicated rayon pool.
//!
//! The function must not rely on side effects: batches run concurrently in
//! no particular order. Results are still returned in point order, because
//! rayon's indexed collection reassembles them by position.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::Point;
use crate::space::Space;
use crate::{Error, Result};

/// Persisted processor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorState {
    pub workers: usize,
    /// Space size when the state was written. Informational.
    pub space_size: usize,
}

/// Worker count when none is configured: all cores but one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

#[derive(Clone)]
pub struct BatchProcessor {
    workers: usize,
    pool: Arc<ThreadPool>,
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor").field("workers", &self.workers).finish()
    }
}

impl BatchProcessor {
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("semspace-batch-{i}"))
            .build()
            .map_err(|e| Error::Backend(format!("cannot start batch pool: {e}")))?;
        Ok(Self { workers, pool: Arc::new(pool) })
    }

    pub fn with_default_workers() -> Result<Self> {
        Self::new(default_workers())
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Apply `f` to every point in contiguous batches of `batch_size`.
    pub fn process_in_batches<F, R>(&self, space: &Space, f: F, batch_size: usize) -> Result<Vec<R>>
    where
        F: Fn(&Point) -> R + Send + Sync,
        R: Send,
    {
        if batch_size == 0 {
            return Err(Error::Validation("batch size must be at least 1".into()));
        }

        let start = Instant::now();
        let points = space.points();
        let batches: Vec<Vec<R>> = self.pool.install(|| {
            points
                .par_chunks(batch_size)
                .map(|batch| batch.iter().map(&f).collect::<Vec<R>>())
                .collect()
        });
        let results: Vec<R> = batches.into_iter().flatten().collect();

        debug!(
            points = points.len(),
            batch_size,
            workers = self.workers,
            elapsed_us = start.elapsed().as_micros() as u64,
            "process_in_batches"
        );
        Ok(results)
    }

    // ========================================================================
    // State
    // ========================================================================

    pub fn state(&self, space: &Space) -> ProcessorState {
        ProcessorState { workers: self.workers, space_size: space.len() }
    }

    pub fn save_state(&self, space: &Space, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.state(space))?;
        fs::write(path, json)?;
        info!(path = %path.display(), workers = self.workers, "processor state saved");
        Ok(())
    }

    pub fn load_state(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let state: ProcessorState = serde_json::from_str(&raw)
            .map_err(|e| Error::Validation(format!("malformed processor state: {e}")))?;
        Self::new(state.workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn counted_space(n: usize) -> Space {
        Space::from_points((0..n).map(|k| {
            Point::new([0.0, 0.0, 0.0, 0.0, 0.0, 0.0, k as f32]).with_name(format!("p{k}"))
        }))
    }

    #[test]
    fn test_results_follow_point_order() {
        let space = counted_space(23);
        let processor = BatchProcessor::new(4).unwrap();
        let out = processor.process_in_batches(&space, |p| p.n(), 5).unwrap();
        assert_eq!(out, (0..23u64).collect::<Vec<_>>());
    }

    #[test]
    fn test_batch_larger_than_space() {
        let space = counted_space(3);
        let processor = BatchProcessor::new(2).unwrap();
        let out = processor
            .process_in_batches(&space, |p| p.name.clone().unwrap_or_default(), 1000)
            .unwrap();
        assert_eq!(out, vec!["p0", "p1", "p2"]);
    }

    #[test]
    fn test_empty_space() {
        let processor = BatchProcessor::new(2).unwrap();
        let out = processor.process_in_batches(&Space::new(), |p| p.x(), 10).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_zero_batch_size() {
        let processor = BatchProcessor::new(1).unwrap();
        let err = processor.process_in_batches(&counted_space(2), |p| p.x(), 0);
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn test_state_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("processor.json");
        let space = counted_space(4);
        BatchProcessor::new(3).unwrap().save_state(&space, &path).unwrap();

        let raw: ProcessorState =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, ProcessorState { workers: 3, space_size: 4 });
        assert_eq!(BatchProcessor::load_state(&path).unwrap().workers(), 3);
    }
}
