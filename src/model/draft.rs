//! PointDraft: an unvalidated point as it arrives from a request layer.
//!
//! The index only checks vector length. Range checks for the semantic axes
//! belong to whoever accepts external input. `PointDraft::validate` is that
//! check for creates, `PointUpdate::validate` for partial updates.

use serde::{Deserialize, Serialize};

use super::{Axes, Metadata, ObservationPosition, ObservationValue, Point, PointUpdate};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointDraft {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub t: f64,
    /// Observation position tag, e.g. `"inside"`.
    pub o: String,
    pub i: f64,
    pub n: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl PointDraft {
    /// Range-check every axis and build the point.
    pub fn validate(&self) -> Result<Point> {
        let x = linear("x", self.x)?;
        let y = linear("y", self.y)?;
        let z = linear("z", self.z)?;
        let t = linear("t", self.t)?;
        let o: ObservationPosition = self.o.parse()?;
        let i = unit("i", self.i)?;
        if self.n < 0 {
            return Err(Error::Validation(format!("n must be >= 0, got {}", self.n)));
        }

        let mut point = Point::from_axes(Axes { x, y, z, t, o, i, n: self.n as u64 });
        point.name = self.name.clone();
        point.description = self.description.clone();
        if let Some(metadata) = &self.metadata {
            point.metadata = metadata.clone();
        }
        Ok(point)
    }
}

impl PointUpdate {
    /// Range-check every slot the update sets. Unset slots are not checked.
    pub fn validate(&self) -> Result<()> {
        let linear_slots = [("x", self.x), ("y", self.y), ("z", self.z), ("t", self.t)];
        for (axis, value) in linear_slots {
            if let Some(v) = value {
                linear(axis, f64::from(v))?;
            }
        }
        if let Some(v) = self.i {
            unit("i", f64::from(v))?;
        }
        if let Some(ObservationValue::Normalized(v)) = self.o {
            unit("o", f64::from(v))?;
        }
        if let Some(n) = self.n {
            if !n.is_finite() || n < 0.0 {
                return Err(Error::Validation(format!("n must be a finite value >= 0, got {n}")));
            }
        }
        Ok(())
    }
}

fn linear(axis: &str, value: f64) -> Result<f32> {
    bounded(axis, value, -1.0, 1.0)
}

fn unit(axis: &str, value: f64) -> Result<f32> {
    bounded(axis, value, 0.0, 1.0)
}

fn bounded(axis: &str, value: f64, lo: f64, hi: f64) -> Result<f32> {
    // NaN fails the range test too.
    if (lo..=hi).contains(&value) {
        Ok(value as f32)
    } else {
        Err(Error::Validation(format!("{axis} must be in [{lo}, {hi}], got {value}")))
    }
}
