//! # Delegated Primitives
//!
//! Clustering and dimensionality reduction are consumed, not owned, by the
//! analytics layer. These traits are the seam: the analytics code hands over
//! a row matrix and gets back assignments or projected rows.
//!
//! | Seam | Built-in | Notes |
//! |------|----------|-------|
//! | `Clusterer` | `KMeans` | k-means++ seeding, seeded ChaCha8, best of `n_init` runs |
//! | `Reducer` (PCA) | `Pca` | covariance + power iteration with deflation |
//! | `Reducer` (t-SNE, UMAP) | none | register an implementation via `Reducers` |
//!
//! Long-running primitives poll a `CancelToken` between iterations.

mod kmeans;
mod pca;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::model::DIMENSIONS;
use crate::ops::ProjectionMethod;
use crate::{Error, Result};

pub use kmeans::KMeans;
pub use pca::Pca;

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation flag shared between a caller and a worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Error::Cancelled)` once the token has been tripped.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Partition rows into `k` groups.
pub trait Clusterer: Send + Sync {
    /// One cluster id in `0..k` per input row.
    fn fit_predict(
        &self,
        rows: &[[f32; DIMENSIONS]],
        k: usize,
        max_iterations: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<usize>>;

    fn name(&self) -> &'static str;
}

/// Map rows into a lower-dimensional space.
pub trait Reducer: Send + Sync {
    /// One output row of length `target_dimensions` per input row.
    fn fit_transform(
        &self,
        rows: &[[f32; DIMENSIONS]],
        target_dimensions: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<f32>>>;

    fn name(&self) -> &'static str;
}

// ============================================================================
// Reducer registry
// ============================================================================

/// Reducer per projection method. PCA is always available.
#[derive(Clone)]
pub struct Reducers {
    pca: Arc<dyn Reducer>,
    tsne: Option<Arc<dyn Reducer>>,
    umap: Option<Arc<dyn Reducer>>,
}

impl Default for Reducers {
    fn default() -> Self {
        Self {
            pca: Arc::new(Pca::default()),
            tsne: None,
            umap: None,
        }
    }
}

impl fmt::Debug for Reducers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reducers")
            .field("pca", &self.pca.name())
            .field("tsne", &self.tsne.as_ref().map(|r| r.name()))
            .field("umap", &self.umap.as_ref().map(|r| r.name()))
            .finish()
    }
}

impl Reducers {
    /// Install a reducer for `method`, replacing any previous one.
    pub fn register(&mut self, method: ProjectionMethod, reducer: Arc<dyn Reducer>) {
        match method {
            ProjectionMethod::Pca => self.pca = reducer,
            ProjectionMethod::Tsne => self.tsne = Some(reducer),
            ProjectionMethod::Umap => self.umap = Some(reducer),
        }
    }

    pub fn with(mut self, method: ProjectionMethod, reducer: Arc<dyn Reducer>) -> Self {
        self.register(method, reducer);
        self
    }

    pub fn get(&self, method: ProjectionMethod) -> Result<Arc<dyn Reducer>> {
        let slot = match method {
            ProjectionMethod::Pca => Some(&self.pca),
            ProjectionMethod::Tsne => self.tsne.as_ref(),
            ProjectionMethod::Umap => self.umap.as_ref(),
        };
        slot.cloned()
            .ok_or_else(|| Error::Unsupported(format!("no reducer registered for {method}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Zeros;

    impl Reducer for Zeros {
        fn fit_transform(
            &self,
            rows: &[[f32; DIMENSIONS]],
            target_dimensions: usize,
            _cancel: &CancelToken,
        ) -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![0.0; target_dimensions]; rows.len()])
        }

        fn name(&self) -> &'static str {
            "zeros"
        }
    }

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let worker = token.clone();
        assert!(worker.check().is_ok());
        token.cancel();
        assert!(matches!(worker.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_default_registry_has_only_pca() {
        let reducers = Reducers::default();
        assert_eq!(reducers.get(ProjectionMethod::Pca).unwrap().name(), "pca");
        assert!(matches!(reducers.get(ProjectionMethod::Tsne), Err(Error::Unsupported(_))));
        assert!(matches!(reducers.get(ProjectionMethod::Umap), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_register_umap() {
        let reducers = Reducers::default().with(ProjectionMethod::Umap, Arc::new(Zeros));
        assert_eq!(reducers.get(ProjectionMethod::Umap).unwrap().name(), "zeros");
    }
}
