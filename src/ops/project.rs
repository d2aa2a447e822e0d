//! Projection to fewer dimensions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Dimensionality-reduction method. Closed set; string tags are parsed once
/// at the edge via `FromStr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMethod {
    Pca,
    Tsne,
    Umap,
}

impl ProjectionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectionMethod::Pca => "pca",
            ProjectionMethod::Tsne => "tsne",
            ProjectionMethod::Umap => "umap",
        }
    }
}

impl fmt::Display for ProjectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pca" => Ok(ProjectionMethod::Pca),
            "tsne" | "t-sne" => Ok(ProjectionMethod::Tsne),
            "umap" => Ok(ProjectionMethod::Umap),
            other => Err(Error::Validation(format!("unsupported projection method '{other}'"))),
        }
    }
}
