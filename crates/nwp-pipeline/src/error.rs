//! Error types for the pipeline crate.
//!
//! [`UnitError`] is scoped to one unit of work and never aborts a run.
//! [`PipelineError`] is raised before any unit is attempted and aborts the
//! whole invocation.

use std::path::PathBuf;

use nwp_common::GridError;
use thiserror::Error;

use crate::tool::ToolError;

/// Failure of one unit at one stage.
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("Not yet published: {url} returned HTTP {status}")]
    NotYetPublished { url: String, status: u16 },

    #[error("Network failure: {0}")]
    Network(String),

    #[error("Corrupt archive {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("{program} failed: {reason}")]
    ToolFailure { program: String, reason: String },

    #[error("Missing input: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UnitError {
    /// Short outcome label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            UnitError::NotYetPublished { .. } => "not_yet_published",
            UnitError::Network(_) => "network_failure",
            UnitError::Decode { .. } => "decode_error",
            UnitError::ToolFailure { .. } => "tool_failure",
            UnitError::MissingInput(_) => "missing_input",
            UnitError::Grid(_) => "grid_error",
            UnitError::Io(_) => "io_error",
        }
    }

    /// Expected conditions that are logged as skips rather than failures.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            UnitError::NotYetPublished { .. } | UnitError::MissingInput(_)
        )
    }
}

impl From<ToolError> for UnitError {
    fn from(err: ToolError) -> Self {
        UnitError::ToolFailure {
            program: err.program().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Errors that abort a whole pipeline invocation.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unreadable resource {}: {reason}", .path.display())]
    UnreadableResource { path: PathBuf, reason: String },

    #[error("Root directory {} is not writable: {reason}", .path.display())]
    UnwritableRoot { path: PathBuf, reason: String },

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),
}

/// Result type for unit-scoped stage operations.
pub type UnitResult<T> = std::result::Result<T, UnitError>;

/// Result type for pipeline-level operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
