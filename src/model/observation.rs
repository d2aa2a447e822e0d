//! Observation position, the circular axis `o`.
//!
//! Seven positions laid out on a ring. A point stores the position as a
//! normalized index in `[0, 1]`, so `inside` (0.0) and `around` (1.0) are
//! neighbors on the ring, not opposite ends of a line.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One of the seven observation positions, in ring order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationPosition {
    Inside,
    Outside,
    Above,
    Below,
    Beside,
    Within,
    Around,
}

impl ObservationPosition {
    /// All positions in ring order.
    pub const ALL: [ObservationPosition; 7] = [
        ObservationPosition::Inside,
        ObservationPosition::Outside,
        ObservationPosition::Above,
        ObservationPosition::Below,
        ObservationPosition::Beside,
        ObservationPosition::Within,
        ObservationPosition::Around,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        self as usize
    }

    /// Normalized coordinate for this position: `index / (COUNT - 1)`.
    pub fn to_normalized(self) -> f32 {
        self.index() as f32 / (Self::COUNT - 1) as f32
    }

    /// Nearest position for a normalized coordinate.
    ///
    /// `round(value * (COUNT - 1))`, clamped to the valid range. Non-finite
    /// input maps to `Inside`.
    pub fn from_normalized(value: f32) -> Self {
        if !value.is_finite() {
            return ObservationPosition::Inside;
        }
        let max = (Self::COUNT - 1) as f32;
        let idx = (value * max).round().clamp(0.0, max) as usize;
        Self::ALL[idx]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObservationPosition::Inside => "inside",
            ObservationPosition::Outside => "outside",
            ObservationPosition::Above => "above",
            ObservationPosition::Below => "below",
            ObservationPosition::Beside => "beside",
            ObservationPosition::Within => "within",
            ObservationPosition::Around => "around",
        }
    }
}

impl fmt::Display for ObservationPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObservationPosition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("unknown observation position '{s}'")))
    }
}

/// Value accepted for the observation axis on update: either a position or
/// its normalized float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObservationValue {
    Position(ObservationPosition),
    Normalized(f32),
}

impl ObservationValue {
    /// Resolve to the stored coordinate. Floats snap to the nearest position
    /// so the axis only ever holds one of the seven ring values.
    pub fn to_coordinate(self) -> f32 {
        match self {
            ObservationValue::Position(p) => p.to_normalized(),
            ObservationValue::Normalized(v) => {
                ObservationPosition::from_normalized(v).to_normalized()
            }
        }
    }
}

impl From<ObservationPosition> for ObservationValue {
    fn from(p: ObservationPosition) -> Self {
        ObservationValue::Position(p)
    }
}

impl From<f32> for ObservationValue {
    fn from(v: f32) -> Self {
        ObservationValue::Normalized(v)
    }
}
