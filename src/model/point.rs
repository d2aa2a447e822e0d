//! Point in the seven-axis space.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{Metadata, ObservationPosition, ObservationValue, DIMENSIONS};
use crate::{Error, Result};

/// Axis slots, in storage order.
pub const X: usize = 0;
pub const Y: usize = 1;
pub const Z: usize = 2;
pub const T: usize = 3;
pub const O: usize = 4;
pub const I: usize = 5;
pub const N: usize = 6;

/// Current wall-clock time as fractional epoch seconds.
pub(crate) fn now_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Named axis values, packed into `[x, y, z, t, o, i, n]` by `Point::from_axes`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axes {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub t: f32,
    pub o: ObservationPosition,
    pub i: f32,
    pub n: u64,
}

/// Partial update applied through `Point::update`.
///
/// `None` leaves the slot untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointUpdate {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
    pub t: Option<f32>,
    pub o: Option<ObservationValue>,
    pub i: Option<f32>,
    /// Truncated to an integral value.
    pub n: Option<f32>,
    pub description: Option<String>,
    pub metadata: Option<Metadata>,
}

/// A location in the space plus descriptive payload.
///
/// The coordinate shape is fixed; contents change only through `update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    coords: [f32; DIMENSIONS],
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    created_at: f64,
    updated_at: f64,
}

impl Point {
    pub fn new(coords: [f32; DIMENSIONS]) -> Self {
        let now = now_seconds();
        Self {
            coords,
            name: None,
            description: None,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Build from a raw vector. Fails unless it has exactly seven values.
    pub fn from_vector(values: &[f32]) -> Result<Self> {
        let coords: [f32; DIMENSIONS] = values.try_into().map_err(|_| {
            Error::Validation(format!(
                "coordinate vector must have {DIMENSIONS} values, got {}",
                values.len()
            ))
        })?;
        Ok(Self::new(coords))
    }

    pub fn from_axes(axes: Axes) -> Self {
        Self::new([
            axes.x,
            axes.y,
            axes.z,
            axes.t,
            axes.o.to_normalized(),
            axes.i,
            axes.n as f32,
        ])
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    // ========================================================================
    // Read accessors
    // ========================================================================

    /// Independent copy of the coordinates.
    pub fn to_vector(&self) -> [f32; DIMENSIONS] {
        self.coords
    }

    pub fn coords(&self) -> &[f32; DIMENSIONS] {
        &self.coords
    }

    pub fn x(&self) -> f32 {
        self.coords[X]
    }

    pub fn y(&self) -> f32 {
        self.coords[Y]
    }

    pub fn z(&self) -> f32 {
        self.coords[Z]
    }

    pub fn t(&self) -> f32 {
        self.coords[T]
    }

    pub fn i(&self) -> f32 {
        self.coords[I]
    }

    pub fn o(&self) -> ObservationPosition {
        ObservationPosition::from_normalized(self.coords[O])
    }

    pub fn n(&self) -> u64 {
        self.coords[N].round().max(0.0) as u64
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    pub fn updated_at(&self) -> f64 {
        self.updated_at
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Apply a partial update in place and refresh `updated_at`.
    pub fn update(&mut self, update: PointUpdate) {
        let linear = [(X, update.x), (Y, update.y), (Z, update.z), (T, update.t), (I, update.i)];
        for (slot, value) in linear {
            if let Some(v) = value {
                self.coords[slot] = v;
            }
        }
        if let Some(o) = update.o {
            self.coords[O] = o.to_coordinate();
        }
        if let Some(n) = update.n {
            self.coords[N] = n.trunc();
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(metadata) = update.metadata {
            self.metadata = metadata;
        }
        self.touch();
    }

    /// Timestamps never move backwards, even if the wall clock does.
    fn touch(&mut self) {
        self.updated_at = now_seconds().max(self.updated_at);
    }
}
