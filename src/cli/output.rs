//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::PipelineError;

/// Map pipeline errors to a string for CLI output.
pub fn map_error(e: &PipelineError) -> String {
    match e {
        PipelineError::ConfigError(msg) => format!("configuration error: {}", msg),
        PipelineError::Persistence(err) => format!("store error: {}", err),
        other => other.to_string(),
    }
}
