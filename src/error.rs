//! Pipeline error kinds
//!
//! Fragment-level problems (`InvalidGeometry`) are recovered by the filter,
//! everything else aborts the stage that raised it.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed bounding box on a single fragment
    #[error("invalid geometry: {reason}")]
    InvalidGeometry { reason: String },

    /// An input the stage depends on does not exist (a prior stage didn't run)
    #[error("stage {stage}: missing input {}", path.display())]
    MissingInput { stage: u8, path: PathBuf },

    /// A tabular input lacks a required column
    #[error("{}: expected column '{expected}', found [{}]", path.display(), found.join(", "))]
    SchemaMismatch {
        path: PathBuf,
        expected: String,
        found: Vec<String>,
    },

    /// Same filename seen twice while duplicates are rejected
    #[error("duplicate filename '{filename}'")]
    DuplicateFilename { filename: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    pub fn invalid_geometry(reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            reason: reason.into(),
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
