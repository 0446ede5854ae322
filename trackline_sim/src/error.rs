//! Errors raised by the simulation harness.

use thiserror::Error;
use trackline_core::{LinearizeError, PipelineError, SessionError};

#[derive(Debug, Error)]
pub enum SimError {
    /// The simulated maze or configuration cannot be walked
    #[error("invalid simulation setup: {0}")]
    Setup(String),

    #[error(transparent)]
    Linearize(#[from] LinearizeError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SimError {
    /// The pipeline failure behind this error, if any.
    pub fn pipeline_error(&self) -> Option<&PipelineError> {
        match self {
            SimError::Pipeline(err) => Some(err),
            SimError::Session(SessionError::Pipeline { source, .. }) => Some(source),
            _ => None,
        }
    }
}
