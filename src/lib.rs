//! # semspace — Seven-Axis Semantic Vector Index
//!
//! A fixed-dimension point store with a domain-weighted metric, exact
//! neighbor search and a handful of derived analytics.
//!
//! ## Design Principles
//!
//! 1. **Fixed shape**: every `Point` is exactly `[x, y, z, t, o, i, n]`, enforced by the type
//! 2. **One metric**: weighted Euclidean with a circular observation axis, shared by the scalar
//!    and matrix paths
//! 3. **Explicit handle**: `SpaceContext` replaces process-wide state; lock discipline lives there
//! 4. **Delegated math**: clustering and projection sit behind `Clusterer` / `Reducer` traits
//!
//! ## Quick Start
//!
//! ```rust
//! use semspace::{Point, Space};
//!
//! # fn example() -> semspace::Result<()> {
//! let mut space = Space::new();
//! space.add(Point::new([0.0; 7]).with_name("a"));
//! space.add(Point::new([1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).with_name("b"));
//! space.add(Point::new([0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]).with_name("c"));
//!
//! let neighbors = space.neighbors_of("a", 2)?;
//! assert_eq!(neighbors[0].point.name.as_deref(), Some("c"));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Layers
//!
//! | Layer | Module | Description |
//! |-------|--------|-------------|
//! | Model | `model` | `Point`, `ObservationPosition`, boundary drafts |
//! | Index | `space` | Storage, name index, metric, KNN, snapshots |
//! | Analytics | `ops` | Similarity, clusters, projection, interpolation, centroid |
//! | Batch | `batch` | Parallel map over a space |
//! | Handle | `context` | Locked, process-wide entry point |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod space;
pub mod ops;
pub mod primitives;
pub mod batch;
pub mod config;
pub mod context;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    Axes, Metadata, ObservationPosition, ObservationValue, Point, PointDraft, PointUpdate,
    DIMENSIONS,
};

// ============================================================================
// Re-exports: Index + analytics
// ============================================================================

pub use space::{Neighbor, Space, SpaceMetrics};
pub use ops::{InterpolationStep, Operations, ProjectionMethod};
pub use primitives::{CancelToken, Clusterer, KMeans, Pca, Reducer, Reducers};
pub use batch::{BatchProcessor, ProcessorState};

// ============================================================================
// Re-exports: Handle
// ============================================================================

pub use config::SpaceConfig;
pub use context::{ImportItemError, ImportReport, ListFilter, SpaceContext, SpaceStats};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {}", .0.join(", "))]
    NotFound(Vec<String>),

    #[error("Insufficient data: need {required}, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Point '{0}' already exists")]
    DuplicateName(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a single missing name.
    pub fn not_found(name: impl Into<String>) -> Self {
        Error::NotFound(vec![name.into()])
    }

    /// Coarse classification for boundary layers that map errors to
    /// transport codes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::Json(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InsufficientData { .. } => ErrorKind::InsufficientData,
            Error::DuplicateName(_) => ErrorKind::Conflict,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Timeout(_) | Error::Cancelled => ErrorKind::Interrupted,
            Error::Backend(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Error taxonomy seen by callers outside the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientData,
    Conflict,
    Unsupported,
    Interrupted,
    Internal,
}

pub type Result<T> = std::result::Result<T, Error>;
