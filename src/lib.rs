//! MoodLens - On-device emotion estimation from facial landmarks
//!
//! MoodLens turns face-mesh landmark frames into a coarse emotion label through a
//! deterministic pipeline: feature extraction → rule classification → temporal
//! smoothing → daily mood history.
//!
//! ## Modules
//!
//! - **Capture Pipeline**: session state machine over an acquired vision capability,
//!   with discrete capture and continuous (HUD) detection
//! - **Mood History**: rolling 7-day per-label counts behind a pluggable backend
//! - **Analytics**: read-only summaries of the stored history

pub mod analytics;
pub mod capability;
pub mod classifier;
pub mod config;
pub mod error;
pub mod features;
pub mod history;
pub mod pipeline;
pub mod smoother;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use analytics::{summarize, MoodSummary};
pub use capability::{AcquisitionConfig, Capability, CapabilityProvider, ReplayProvider};
pub use classifier::{ClassificationRule, EmotionClassifier};
pub use config::PipelineConfig;
pub use error::ComputeError;
pub use features::FeatureExtractor;
pub use history::{FileBackend, HistoryBackend, MemoryBackend, MoodHistory, MoodHistoryStore};
pub use pipeline::{classify_frame, CaptureOutcome, CapturePipeline, FrameOutcome, PipelineEvent, SessionState};
pub use smoother::TemporalSmoother;
pub use types::{DailyMoodEntry, DayKey, EmotionLabel, FeatureVector, Landmark, LandmarkFrame, MoodCounts};

/// Library version reported by the CLI and FFI
pub const MOODLENS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for emitted records
pub const PRODUCER_NAME: &str = "moodlens";
