//! Error types for moodlens

use thiserror::Error;

/// Errors that can occur while classifying frames or running a capture session
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Missing landmarks: {0}")]
    MissingLandmarks(String),

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Capability acquisition failed: {0}")]
    CapabilityAcquisition(String),

    #[error("Capability failure: {0}")]
    Capability(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid transition: cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: String,
    },

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),
}

impl ComputeError {
    /// Errors scoped to a single frame. The pipeline skips the frame and keeps going.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            ComputeError::MissingLandmarks(_) | ComputeError::DegenerateGeometry(_)
        )
    }
}
