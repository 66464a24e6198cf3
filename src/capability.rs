//! Vision capability
//!
//! The camera device and landmark model are external. The pipeline only sees a
//! [`CapabilityProvider`] that asynchronously acquires a [`Capability`], and the
//! capability itself, which turns the current video frame into landmarks.
//!
//! Release is tied to ownership: a capability frees its device and model handles
//! when dropped, and the pipeline drops it exactly once.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;

use crate::error::ComputeError;
use crate::types::LandmarkFrame;

/// Parameters passed through to device and model acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Requested capture width in pixels
    pub width: u32,
    /// Requested capture height in pixels
    pub height: u32,
    /// Camera facing mode ("user" or "environment")
    pub facing_mode: String,
    /// Model inference delegate ("GPU" or "CPU")
    pub delegate: String,
    /// Maximum faces the model reports; the classifier reads the first
    pub max_faces: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            facing_mode: "user".to_string(),
            delegate: "GPU".to_string(),
            max_faces: 1,
        }
    }
}

/// An acquired camera + landmark model pair
pub trait Capability {
    /// Run landmark detection on the current video frame.
    ///
    /// Returns an empty frame when no face is visible. An error means the device
    /// or model is no longer usable.
    fn snapshot(&mut self) -> Result<LandmarkFrame, ComputeError>;
}

/// Acquires capabilities for capture sessions
pub trait CapabilityProvider {
    type Capability: Capability;

    /// Acquire device and model. Dropping the returned future abandons the
    /// acquisition.
    fn acquire(
        &mut self,
        config: &AcquisitionConfig,
    ) -> impl Future<Output = Result<Self::Capability, ComputeError>>;
}

/// Provider that replays recorded frames, one per snapshot
#[derive(Debug, Clone, Default)]
pub struct ReplayProvider {
    frames: Vec<LandmarkFrame>,
    failure: Option<String>,
    acquisitions: usize,
}

impl ReplayProvider {
    pub fn new(frames: Vec<LandmarkFrame>) -> Self {
        Self {
            frames,
            failure: None,
            acquisitions: 0,
        }
    }

    /// Provider whose acquisition always fails with `cause`
    pub fn failing(cause: impl Into<String>) -> Self {
        Self {
            frames: Vec::new(),
            failure: Some(cause.into()),
            acquisitions: 0,
        }
    }

    /// Number of successful acquisitions so far
    pub fn acquisitions(&self) -> usize {
        self.acquisitions
    }
}

impl CapabilityProvider for ReplayProvider {
    type Capability = ReplayCapability;

    fn acquire(
        &mut self,
        _config: &AcquisitionConfig,
    ) -> impl Future<Output = Result<ReplayCapability, ComputeError>> {
        let result = match &self.failure {
            Some(cause) => Err(ComputeError::CapabilityAcquisition(cause.clone())),
            None => {
                self.acquisitions += 1;
                Ok(ReplayCapability {
                    frames: self.frames.iter().cloned().collect(),
                })
            }
        };
        async move { result }
    }
}

/// Capability yielding recorded frames in order, then empty frames
#[derive(Debug, Clone)]
pub struct ReplayCapability {
    frames: VecDeque<LandmarkFrame>,
}

impl ReplayCapability {
    /// Frames not yet consumed
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl Capability for ReplayCapability {
    fn snapshot(&mut self) -> Result<LandmarkFrame, ComputeError> {
        Ok(self.frames.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Landmark;

    #[tokio::test]
    async fn test_replay_yields_frames_then_empty() {
        let frame = LandmarkFrame::new(vec![Landmark::new(0.1, 0.2)]);
        let mut provider = ReplayProvider::new(vec![frame.clone()]);

        let mut capability = provider.acquire(&AcquisitionConfig::default()).await.unwrap();
        assert_eq!(provider.acquisitions(), 1);
        assert_eq!(capability.remaining(), 1);

        assert_eq!(capability.snapshot().unwrap(), frame);
        assert!(capability.snapshot().unwrap().is_empty());
        assert_eq!(capability.remaining(), 0);
    }

    #[tokio::test]
    async fn test_failing_provider() {
        let mut provider = ReplayProvider::failing("Camera access denied");
        let err = provider.acquire(&AcquisitionConfig::default()).await.unwrap_err();

        assert!(matches!(err, ComputeError::CapabilityAcquisition(cause) if cause == "Camera access denied"));
        assert_eq!(provider.acquisitions(), 0);
    }

    #[test]
    fn test_acquisition_defaults() {
        let config: AcquisitionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 480);
        assert_eq!(config.facing_mode, "user");
        assert_eq!(config.delegate, "GPU");
        assert_eq!(config.max_faces, 1);
    }
}
