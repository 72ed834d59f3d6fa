//! Error types for the engine module.

use std::path::PathBuf;

use thiserror::Error;

use tg_core::ResourceId;
use tg_synth::OutputError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while materializing or tearing down a manifest.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Materialization of {project} failed: {reason}")]
    MaterializationFailed { project: String, reason: String },

    #[error("Resource {resource} failed: {reason}")]
    ResourceFailed { resource: ResourceId, reason: String },

    #[error("Invalid engine state in {path}: {reason}")]
    State { path: PathBuf, reason: String },

    #[error("Output resolution failed: {0}")]
    Output(#[from] OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
