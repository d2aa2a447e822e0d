//! Snapshot persistence: the whole space as one JSON document.
//!
//! ```text
//! {
//!   "points":  [ { "coords": [f0..f6], "name", "description", "metadata",
//!                  "created_at", "updated_at" }, ... ],
//!   "metrics": { "distance_calls": int, "neighbor_searches": int,
//!                "last_operation_us": int }
//! }
//! ```
//!
//! Loading parses the full document before anything is replaced, so a bad
//! file never leaves a half-populated space behind.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Space, SpaceMetrics};
use crate::model::Point;
use crate::{Error, Result};

#[derive(Serialize)]
struct SnapshotRef<'a> {
    points: &'a [Point],
    metrics: SpaceMetrics,
}

#[derive(Deserialize)]
struct Snapshot {
    points: Vec<Point>,
    #[serde(default)]
    metrics: SpaceMetrics,
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl Space {
    /// Write the full space to `path`.
    ///
    /// The document goes to a sibling `.tmp` file first and is renamed over
    /// the target once complete.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = SnapshotRef {
            points: self.points(),
            metrics: self.metrics(),
        };

        let tmp = temp_path(path);
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &snapshot)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;

        info!(path = %path.display(), points = self.len(), "space saved");
        Ok(())
    }

    /// Read a space from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Space> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let space = Self::from_json(&raw)
            .map_err(|e| Error::Validation(format!("malformed snapshot {}: {e}", path.display())))?;
        info!(path = %path.display(), points = space.len(), "space loaded");
        Ok(space)
    }

    /// Replace this space with the contents of `path`. On error `self` is
    /// left exactly as it was.
    pub fn reload(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let fresh = Self::load(path)?;
        *self = fresh;
        Ok(())
    }

    fn from_json(raw: &str) -> std::result::Result<Space, serde_json::Error> {
        let snapshot: Snapshot = serde_json::from_str(raw)?;
        Ok(Space::from_points(snapshot.points).with_metrics(snapshot.metrics))
    }
}
