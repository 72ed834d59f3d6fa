//! Error types for output resolution.

use thiserror::Error;

use tg_core::ResourceId;

/// Result type alias for output resolution.
pub type OutputResult<T> = Result<T, OutputError>;

/// A declared output could not be filled from materialized attributes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutputError {
    #[error("Output {output}: resource {source_id} was not materialized")]
    MissingSource { output: String, source_id: ResourceId },

    #[error("Output {output}: resource {source_id} has no attribute '{attribute}'")]
    MissingAttribute {
        output: String,
        source_id: ResourceId,
        attribute: String,
    },
}
