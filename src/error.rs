//! Error types for restructure.

use std::path::PathBuf;
use thiserror::Error;

use crate::plan::PlanError;
use crate::rewrite::RewriteError;

/// Result type alias for restructure operations.
pub type Result<T> = std::result::Result<T, RestructureError>;

/// All errors that can occur in restructure.
#[derive(Error, Debug)]
pub enum RestructureError {
    /// Root directory does not exist
    #[error("Root not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Config file could not be parsed
    #[error("Invalid config {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    /// Invalid glob in scope or grouping rules
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Planning failed before any mutation
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Rewrite rules could not be derived
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    /// A file relocation failed; already-moved files were rolled back
    #[error("Move failed: {} -> {}: {message}", .from.display(), .to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        message: String,
    },

    /// A rewrite was computed but could not be written
    #[error("Partial rewrite: {}: {message}", .path.display())]
    PartialRewrite { path: PathBuf, message: String },

    /// The verification probe failed or timed out
    #[error("Verification failed: {reason}")]
    VerificationFailure { reason: String, output: String },

    /// Rollback could not restore one or more files
    #[error("Snapshot corruption: could not restore {paths:?}. {guidance}")]
    SnapshotCorruption {
        paths: Vec<PathBuf>,
        snapshot: Option<PathBuf>,
        guidance: String,
    },

    /// A migration step was called from the wrong state
    #[error("Cannot {action} while {state}")]
    InvalidTransition { state: String, action: String },

    /// The run was cancelled before commit
    #[error("Migration cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot encoding error
    #[error("Snapshot encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RestructureError {
    /// True for the errors that are raised before anything touched disk.
    pub fn is_pre_mutation(&self) -> bool {
        matches!(
            self,
            RestructureError::NotFound(_)
                | RestructureError::Config { .. }
                | RestructureError::InvalidPattern { .. }
                | RestructureError::Plan(_)
                | RestructureError::Rewrite(_)
        )
    }
}
