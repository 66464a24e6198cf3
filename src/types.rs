//! Core types for the moodlens pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: landmark frames, feature vectors, emotion labels and the day-bucketed
//! mood counters that make up the persisted history.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ComputeError;

/// A single face landmark in normalized image space.
///
/// `x` grows to the right and `y` grows downward, both nominally in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    /// Relative depth, zero when the provider only reports 2-D points
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Landmarks for one detected face, indexed by face-mesh id.
///
/// An empty frame means no face was found in the video frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkFrame {
    points: Vec<Landmark>,
}

impl LandmarkFrame {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    /// Frame with no face
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }
}

/// One line of frame input: landmarks plus an optional capture timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub landmarks: LandmarkFrame,
}

/// Geometric features derived from a single landmark frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Mouth height over mouth width
    pub mouth_ratio: f64,
    /// Mean vertical eyelid gap of both eyes
    pub eye_openness: f64,
    /// Brows sit noticeably above the upper eyelids
    pub brow_raised: bool,
    /// Both mouth corners sit below the lip midline
    pub is_smiling: bool,
}

/// Emotion category emitted by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Happy,
    Sad,
    Angry,
    Surprised,
    Neutral,
}

impl EmotionLabel {
    /// Every label, in the column order of the persisted history
    pub const ALL: [EmotionLabel; 5] = [
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Angry,
        EmotionLabel::Surprised,
        EmotionLabel::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Surprised => "surprised",
            EmotionLabel::Neutral => "neutral",
        }
    }

    /// Position in [`EmotionLabel::ALL`], used for fixed-size tallies
    pub fn index(&self) -> usize {
        match self {
            EmotionLabel::Happy => 0,
            EmotionLabel::Sad => 1,
            EmotionLabel::Angry => 2,
            EmotionLabel::Surprised => 3,
            EmotionLabel::Neutral => 4,
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmotionLabel::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ComputeError::ParseError(format!("unknown emotion label '{}'", s)))
    }
}

/// Calendar-day bucket key (YYYY-MM-DD)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Local calendar day of `at` for a fixed UTC offset in minutes.
    ///
    /// Offsets outside +/-24h fall back to UTC.
    pub fn from_datetime(at: DateTime<Utc>, utc_offset_minutes: i32) -> Self {
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        Self(at.with_timezone(&offset).date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DayKey {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|e| ComputeError::ParseError(format!("invalid day key '{}': {}", s, e)))
    }
}

/// Per-label counters for one day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodCounts {
    #[serde(default)]
    pub happy: u32,
    #[serde(default)]
    pub sad: u32,
    #[serde(default)]
    pub angry: u32,
    #[serde(default)]
    pub surprised: u32,
    #[serde(default)]
    pub neutral: u32,
}

impl MoodCounts {
    pub fn get(&self, label: EmotionLabel) -> u32 {
        match label {
            EmotionLabel::Happy => self.happy,
            EmotionLabel::Sad => self.sad,
            EmotionLabel::Angry => self.angry,
            EmotionLabel::Surprised => self.surprised,
            EmotionLabel::Neutral => self.neutral,
        }
    }

    fn slot(&mut self, label: EmotionLabel) -> &mut u32 {
        match label {
            EmotionLabel::Happy => &mut self.happy,
            EmotionLabel::Sad => &mut self.sad,
            EmotionLabel::Angry => &mut self.angry,
            EmotionLabel::Surprised => &mut self.surprised,
            EmotionLabel::Neutral => &mut self.neutral,
        }
    }

    pub fn increment(&mut self, label: EmotionLabel) {
        let slot = self.slot(label);
        *slot = slot.saturating_add(1);
    }

    /// Add another day's counters into this one
    pub fn merge(&mut self, other: &MoodCounts) {
        for label in EmotionLabel::ALL {
            let slot = self.slot(label);
            *slot = slot.saturating_add(other.get(label));
        }
    }

    pub fn total(&self) -> u32 {
        EmotionLabel::ALL
            .iter()
            .fold(0u32, |acc, label| acc.saturating_add(self.get(*label)))
    }

    /// Most frequent label, ties resolved by [`EmotionLabel::ALL`] order.
    /// `None` when nothing was counted.
    pub fn dominant(&self) -> Option<EmotionLabel> {
        let mut best: Option<(EmotionLabel, u32)> = None;
        for label in EmotionLabel::ALL {
            let count = self.get(label);
            if count > 0 && best.map_or(true, |(_, top)| count > top) {
                best = Some((label, count));
            }
        }
        best.map(|(label, _)| label)
    }
}

/// Emotion counters for a single calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyMoodEntry {
    pub date: DayKey,
    #[serde(flatten)]
    pub counts: MoodCounts,
}

impl DailyMoodEntry {
    pub fn new(date: DayKey) -> Self {
        Self {
            date,
            counts: MoodCounts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_label_round_trip_through_str() {
        for label in EmotionLabel::ALL {
            assert_eq!(label.as_str().parse::<EmotionLabel>().unwrap(), label);
        }
        assert!("confused".parse::<EmotionLabel>().is_err());
        assert_eq!("Happy".parse::<EmotionLabel>().unwrap(), EmotionLabel::Happy);
    }

    #[test]
    fn test_daily_entry_layout() {
        let mut entry = DailyMoodEntry::new(DayKey::from_ymd(2024, 1, 15).unwrap());
        entry.counts.increment(EmotionLabel::Surprised);

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "date": "2024-01-15",
                "happy": 0,
                "sad": 0,
                "angry": 0,
                "surprised": 1,
                "neutral": 0
            })
        );
    }

    #[test]
    fn test_day_key_applies_offset() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap();
        assert_eq!(DayKey::from_datetime(at, 0).to_string(), "2024-01-15");
        assert_eq!(DayKey::from_datetime(at, 60).to_string(), "2024-01-16");
        assert_eq!(DayKey::from_datetime(at, -24 * 60 - 1).to_string(), "2024-01-15");
    }

    #[test]
    fn test_dominant_prefers_label_order_on_tie() {
        let counts = MoodCounts {
            sad: 3,
            neutral: 3,
            ..Default::default()
        };
        assert_eq!(counts.dominant(), Some(EmotionLabel::Sad));
        assert_eq!(MoodCounts::default().dominant(), None);
    }

    #[test]
    fn test_frame_record_accepts_2d_points() {
        let record: FrameRecord =
            serde_json::from_str(r#"{"landmarks": [{"x": 0.5, "y": 0.25}]}"#).unwrap();
        assert!(record.timestamp.is_none());
        assert_eq!(record.landmarks.get(0), Some(&Landmark::new(0.5, 0.25)));
    }
}
