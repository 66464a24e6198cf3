//! Pipeline configuration

use serde::{Deserialize, Serialize};

use crate::capability::AcquisitionConfig;
use crate::error::ComputeError;
use crate::history::DEFAULT_HISTORY_DAYS;
use crate::smoother::DEFAULT_SMOOTHING_WINDOW;

/// Default minimum interval between history writes in continuous mode
pub const DEFAULT_WRITE_INTERVAL_SECS: u64 = 5;

/// Largest accepted UTC offset (exclusive), in minutes
const MAX_UTC_OFFSET_MINUTES: i32 = 24 * 60;

/// Settings for a capture pipeline.
///
/// Every field has a default, so a partial JSON document is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames in the majority-vote window
    pub smoothing_window: usize,
    /// Calendar days kept in the mood history
    pub history_days: usize,
    /// Minimum seconds between history writes in continuous mode
    pub write_interval_secs: u64,
    /// Offset from UTC used to bucket counts by local calendar day
    pub utc_offset_minutes: i32,
    /// Passed through to capability acquisition
    pub acquisition: AcquisitionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            history_days: DEFAULT_HISTORY_DAYS,
            write_interval_secs: DEFAULT_WRITE_INTERVAL_SECS,
            utc_offset_minutes: 0,
            acquisition: AcquisitionConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a config from JSON
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize config to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.smoothing_window == 0 {
            return Err(ComputeError::ConfigError(
                "smoothing_window must be at least 1".to_string(),
            ));
        }
        if self.history_days == 0 {
            return Err(ComputeError::ConfigError(
                "history_days must be at least 1".to_string(),
            ));
        }
        if self.utc_offset_minutes.abs() >= MAX_UTC_OFFSET_MINUTES {
            return Err(ComputeError::ConfigError(format!(
                "utc_offset_minutes {} is outside +/-{}",
                self.utc_offset_minutes, MAX_UTC_OFFSET_MINUTES
            )));
        }
        Ok(())
    }

    /// Write interval as a chrono duration
    pub fn write_interval(&self) -> chrono::Duration {
        let secs = i64::try_from(self.write_interval_secs).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
    }
}
