//! Pipeline orchestration
//!
//! This module provides the capture session: it owns the vision capability,
//! drives each landmark frame through extraction, classification and smoothing,
//! emits label changes to consumers and commits counts to the mood history.
//!
//! Two modes share one session:
//! - Discrete capture (`capture`): one snapshot, one history increment, then the
//!   capability is released and the session rests in `Captured`.
//! - Continuous detection (`on_frame`): every frame the host delivers while
//!   `Ready` is classified and smoothed; history writes are throttled.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capability::{Capability, CapabilityProvider};
use crate::classifier::{ClassificationRule, EmotionClassifier};
use crate::config::PipelineConfig;
use crate::error::ComputeError;
use crate::features::FeatureExtractor;
use crate::history::{MoodHistory, MoodHistoryStore};
use crate::smoother::TemporalSmoother;
use crate::types::{DayKey, EmotionLabel, FeatureVector, LandmarkFrame};

/// Classify a single frame without smoothing or persistence.
///
/// # Example
/// ```ignore
/// let label = classify_frame(&frame)?;
/// ```
pub fn classify_frame(frame: &LandmarkFrame) -> Result<EmotionLabel, ComputeError> {
    let features = FeatureExtractor::extract(frame)?;
    Ok(EmotionClassifier::classify(&features))
}

/// Capture session state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Initializing,
    Ready,
    Scanning,
    Captured { label: EmotionLabel },
    Error { cause: String },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Scanning => "scanning",
            SessionState::Captured { .. } => "captured",
            SessionState::Error { .. } => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Notifications for UI consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// The smoothed label changed, or a discrete capture completed
    EmotionChanged { label: EmotionLabel },
}

/// Result of classifying one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameClassification {
    pub features: FeatureVector,
    pub rule: ClassificationRule,
    /// Label for this frame alone
    pub raw: EmotionLabel,
    /// Majority label over the smoothing window
    pub smoothed: EmotionLabel,
    /// The smoothed label differs from the last one emitted
    pub changed: bool,
    /// This frame produced a history write
    pub persisted: bool,
}

/// What happened to a frame in continuous mode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FrameOutcome {
    Classified(FrameClassification),
    NoFace,
    Skipped { reason: String },
}

/// What happened to a discrete capture request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CaptureOutcome {
    /// Session moved to `Captured`
    Captured(FrameClassification),
    /// Session is back in `Ready`
    NoFace,
    /// Session is back in `Ready`
    Skipped { reason: String },
}

/// Minimum-interval gate for history writes
#[derive(Debug, Clone)]
struct WriteThrottle {
    interval: Duration,
    last_write: Option<DateTime<Utc>>,
}

impl WriteThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_write: None,
        }
    }

    /// A clock that moved backwards also opens the gate
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_write {
            None => true,
            Some(last) => now < last || now - last >= self.interval,
        }
    }

    fn mark(&mut self, now: DateTime<Utc>) {
        self.last_write = Some(now);
    }

    fn reset(&mut self) {
        self.last_write = None;
    }
}

/// Puts the session back to `Idle` if `start` is dropped mid-acquisition
struct InitializationGuard<'a> {
    session_id: Uuid,
    state: &'a mut SessionState,
    events: &'a mut Option<Sender<PipelineEvent>>,
    armed: bool,
}

impl Drop for InitializationGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let from = std::mem::replace(self.state, SessionState::Idle);
        info!(session = %self.session_id, from = %from, to = "idle", "capability acquisition cancelled");
        if let Some(tx) = self.events.as_ref() {
            let event = PipelineEvent::StateChanged {
                from,
                to: SessionState::Idle,
            };
            if tx.send(event).is_err() {
                *self.events = None;
            }
        }
    }
}

/// Stateful capture session.
///
/// Owns the smoothing buffer, the write throttle and the acquired capability.
/// The capability is dropped, and so released, when the session captures, fails,
/// resets, stops or is itself dropped.
pub struct CapturePipeline<P: CapabilityProvider> {
    session_id: Uuid,
    config: PipelineConfig,
    provider: P,
    capability: Option<P::Capability>,
    state: SessionState,
    smoother: TemporalSmoother,
    store: Arc<MoodHistoryStore>,
    throttle: WriteThrottle,
    last_emitted: Option<EmotionLabel>,
    events: Option<Sender<PipelineEvent>>,
}

impl<P: CapabilityProvider> CapturePipeline<P> {
    /// Create a session with default settings and the store's history window
    pub fn new(provider: P, store: Arc<MoodHistoryStore>) -> Self {
        let config = PipelineConfig {
            history_days: store.max_days(),
            ..PipelineConfig::default()
        };
        Self::build(provider, store, config)
    }

    /// Create a session with a validated config.
    ///
    /// The history window belongs to the store, so `config.history_days` must
    /// match `store.max_days()`.
    pub fn with_config(
        provider: P,
        store: Arc<MoodHistoryStore>,
        config: PipelineConfig,
    ) -> Result<Self, ComputeError> {
        config.validate()?;
        if config.history_days != store.max_days() {
            return Err(ComputeError::ConfigError(format!(
                "history_days {} does not match the store window of {} days",
                config.history_days,
                store.max_days()
            )));
        }
        Ok(Self::build(provider, store, config))
    }

    fn build(provider: P, store: Arc<MoodHistoryStore>, config: PipelineConfig) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            smoother: TemporalSmoother::with_window(config.smoothing_window),
            throttle: WriteThrottle::new(config.write_interval()),
            config,
            provider,
            capability: None,
            state: SessionState::Idle,
            store,
            last_emitted: None,
            events: None,
        }
    }

    /// Send events to `tx`. Sending stops once the receiver is dropped.
    pub fn with_event_channel(mut self, tx: Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Last smoothed label emitted to consumers
    pub fn current_label(&self) -> Option<EmotionLabel> {
        self.last_emitted
    }

    pub fn smoother(&self) -> &TemporalSmoother {
        &self.smoother
    }

    pub fn has_capability(&self) -> bool {
        self.capability.is_some()
    }

    pub fn store(&self) -> &Arc<MoodHistoryStore> {
        &self.store
    }

    /// Current persisted history
    pub fn history(&self) -> MoodHistory {
        self.store.load()
    }

    /// Acquire the capability: `Idle -> Initializing -> Ready`, or `Error` on
    /// failure. Dropping the future before it completes returns the session to
    /// `Idle`.
    pub async fn start(&mut self) -> Result<(), ComputeError> {
        if self.state != SessionState::Idle {
            return Err(self.invalid("start"));
        }
        self.set_state(SessionState::Initializing);

        let acquired = {
            let mut guard = InitializationGuard {
                session_id: self.session_id,
                state: &mut self.state,
                events: &mut self.events,
                armed: true,
            };
            let result = self.provider.acquire(&self.config.acquisition).await;
            guard.armed = false;
            result
        };

        match acquired {
            Ok(capability) => {
                self.capability = Some(capability);
                self.set_state(SessionState::Ready);
                Ok(())
            }
            Err(e) => {
                let cause = match e {
                    ComputeError::CapabilityAcquisition(cause) => cause,
                    other => other.to_string(),
                };
                warn!(session = %self.session_id, %cause, "capability acquisition failed");
                self.set_state(SessionState::Error {
                    cause: cause.clone(),
                });
                Err(ComputeError::CapabilityAcquisition(cause))
            }
        }
    }

    /// Discrete capture at the current time
    pub fn capture(&mut self) -> Result<CaptureOutcome, ComputeError> {
        self.capture_at(Utc::now())
    }

    /// Snapshot the current frame and classify it: `Ready -> Scanning`, then
    /// `Captured` on success or back to `Ready` when there is nothing to classify.
    ///
    /// Only capability failures are returned as errors; they move the session to
    /// `Error`.
    pub fn capture_at(&mut self, now: DateTime<Utc>) -> Result<CaptureOutcome, ComputeError> {
        if self.state != SessionState::Ready {
            return Err(self.invalid("capture"));
        }
        self.set_state(SessionState::Scanning);

        let snapshot = match self.capability.as_mut() {
            Some(capability) => capability.snapshot(),
            None => Err(ComputeError::Capability("no capability held".to_string())),
        };
        let frame = match snapshot {
            Ok(frame) => frame,
            Err(e) => {
                let cause = e.to_string();
                self.fail(cause.clone());
                return Err(ComputeError::Capability(cause));
            }
        };

        if frame.is_empty() {
            debug!(session = %self.session_id, "no face in snapshot");
            self.set_state(SessionState::Ready);
            return Ok(CaptureOutcome::NoFace);
        }

        let (features, rule) = match Self::classify(&frame) {
            Ok(classified) => classified,
            Err(e) => {
                debug!(session = %self.session_id, error = %e, "snapshot skipped");
                self.set_state(SessionState::Ready);
                return Ok(CaptureOutcome::Skipped {
                    reason: e.to_string(),
                });
            }
        };

        let raw = rule.label();
        let smoothed = self.smoother.push(raw);
        let changed = self.last_emitted != Some(smoothed);
        let persisted = self.persist(smoothed, now);

        self.release();
        self.last_emitted = Some(smoothed);
        self.set_state(SessionState::Captured { label: smoothed });
        self.emit(PipelineEvent::EmotionChanged { label: smoothed });

        Ok(CaptureOutcome::Captured(FrameClassification {
            features,
            rule,
            raw,
            smoothed,
            changed,
            persisted,
        }))
    }

    /// Continuous detection for a frame arriving now
    pub fn on_frame(&mut self, frame: &LandmarkFrame) -> Result<FrameOutcome, ComputeError> {
        self.on_frame_at(frame, Utc::now())
    }

    /// Classify a host-delivered frame while `Ready`.
    ///
    /// Frame-level problems come back as `NoFace` or `Skipped` with the smoothing
    /// buffer untouched; the only error is calling this outside `Ready`.
    pub fn on_frame_at(
        &mut self,
        frame: &LandmarkFrame,
        now: DateTime<Utc>,
    ) -> Result<FrameOutcome, ComputeError> {
        if self.state != SessionState::Ready {
            return Err(self.invalid("process frame"));
        }
        // Per-frame Ready -> Scanning -> Ready cycle; not reported as events
        self.state = SessionState::Scanning;

        let outcome = if frame.is_empty() {
            FrameOutcome::NoFace
        } else {
            match Self::classify(frame) {
                Ok((features, rule)) => {
                    FrameOutcome::Classified(self.smooth_and_commit(features, rule, now))
                }
                Err(e) => {
                    debug!(session = %self.session_id, error = %e, "frame skipped");
                    FrameOutcome::Skipped {
                        reason: e.to_string(),
                    }
                }
            }
        };

        self.state = SessionState::Ready;
        Ok(outcome)
    }

    fn smooth_and_commit(
        &mut self,
        features: FeatureVector,
        rule: ClassificationRule,
        now: DateTime<Utc>,
    ) -> FrameClassification {
        let raw = rule.label();
        let smoothed = self.smoother.push(raw);

        let changed = self.last_emitted != Some(smoothed);
        if changed {
            self.last_emitted = Some(smoothed);
            self.emit(PipelineEvent::EmotionChanged { label: smoothed });
        }

        let persisted = if self.throttle.is_due(now) {
            self.throttle.mark(now);
            self.persist(smoothed, now)
        } else {
            false
        };

        FrameClassification {
            features,
            rule,
            raw,
            smoothed,
            changed,
            persisted,
        }
    }

    /// Return to `Idle` from `Captured` or `Error`, clearing session state
    pub fn reset(&mut self) -> Result<(), ComputeError> {
        match self.state {
            SessionState::Captured { .. } | SessionState::Error { .. } => {
                self.clear_session();
                self.set_state(SessionState::Idle);
                Ok(())
            }
            _ => Err(self.invalid("reset")),
        }
    }

    /// End the session from any state, releasing the capability
    pub fn stop(&mut self) {
        if self.state == SessionState::Idle && self.capability.is_none() {
            return;
        }
        self.clear_session();
        self.set_state(SessionState::Idle);
    }

    fn classify(
        frame: &LandmarkFrame,
    ) -> Result<(FeatureVector, ClassificationRule), ComputeError> {
        let features = FeatureExtractor::extract(frame)?;
        let rule = EmotionClassifier::classify_with_rule(&features);
        Ok((features, rule))
    }

    /// Increment today's count. Failures are logged, never surfaced.
    fn persist(&self, label: EmotionLabel, now: DateTime<Utc>) -> bool {
        let day = DayKey::from_datetime(now, self.config.utc_offset_minutes);
        match self.store.increment(label, day) {
            Ok(_) => true,
            Err(e) => {
                warn!(session = %self.session_id, %label, %day, error = %e, "mood history write failed");
                false
            }
        }
    }

    fn clear_session(&mut self) {
        self.release();
        self.smoother.clear();
        self.throttle.reset();
        self.last_emitted = None;
    }

    fn release(&mut self) {
        if let Some(capability) = self.capability.take() {
            drop(capability);
            debug!(session = %self.session_id, "capability released");
        }
    }

    fn fail(&mut self, cause: String) {
        warn!(session = %self.session_id, %cause, "capture session failed");
        self.release();
        self.set_state(SessionState::Error { cause });
    }

    fn set_state(&mut self, to: SessionState) {
        let from = std::mem::replace(&mut self.state, to.clone());
        info!(session = %self.session_id, from = %from, to = %to, "session state changed");
        self.emit(PipelineEvent::StateChanged { from, to });
    }

    fn emit(&mut self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                debug!(session = %self.session_id, "event receiver dropped");
                self.events = None;
            }
        }
    }

    fn invalid(&self, operation: &'static str) -> ComputeError {
        ComputeError::InvalidTransition {
            operation,
            state: self.state.to_string(),
        }
    }
}
