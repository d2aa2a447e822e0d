//! # Point Model
//!
//! The data that crosses every boundary: points, the observation ring,
//! partial updates and unvalidated drafts.
//!
//! This module is pure data. No I/O, no locks, no shared state.

pub mod point;
pub mod observation;
pub mod draft;

pub use point::{Axes, Point, PointUpdate};
pub use observation::{ObservationPosition, ObservationValue};
pub use draft::PointDraft;

/// Number of axes in the space.
pub const DIMENSIONS: usize = 7;

/// Opaque descriptive payload attached to a point.
pub type Metadata = serde_json::Map<String, serde_json::Value>;
