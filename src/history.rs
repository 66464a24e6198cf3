//! Mood history management
//!
//! This module keeps day-bucketed emotion counters over a trailing window of
//! calendar days and persists them to a single named slot. Corrupt or unreadable
//! payloads are discarded and replaced by an empty history.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ComputeError;
use crate::types::{DailyMoodEntry, DayKey, EmotionLabel};

/// Default history window in days
pub const DEFAULT_HISTORY_DAYS: usize = 7;

/// Name of the persisted history slot
pub const HISTORY_SLOT: &str = "moodHistory";

/// Date-ascending daily mood counters, capped to a trailing window of days
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MoodHistory {
    entries: VecDeque<DailyMoodEntry>,
}

impl Default for MoodHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl MoodHistory {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Build a history from arbitrary entries: sorts by date, merges duplicate
    /// dates and keeps the most recent `max_days`.
    pub fn from_entries(entries: Vec<DailyMoodEntry>, max_days: usize) -> Self {
        let mut sorted = entries;
        sorted.sort_by_key(|entry| entry.date);

        let mut merged: VecDeque<DailyMoodEntry> = VecDeque::with_capacity(sorted.len());
        for entry in sorted {
            match merged.back_mut() {
                Some(last) if last.date == entry.date => last.counts.merge(&entry.counts),
                _ => merged.push_back(entry),
            }
        }

        let mut history = Self { entries: merged };
        history.truncate(max_days);
        history
    }

    /// Count one occurrence of `label` on `day`, then cap to `max_days` days
    pub fn increment(&mut self, label: EmotionLabel, day: DayKey, max_days: usize) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.date == day) {
            entry.counts.increment(label);
            return;
        }

        let mut entry = DailyMoodEntry::new(day);
        entry.counts.increment(label);

        let position = self
            .entries
            .iter()
            .position(|existing| existing.date > day)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, entry);
        self.truncate(max_days);
    }

    /// Drop the oldest entries until at most `max_days` remain
    fn truncate(&mut self, max_days: usize) {
        while self.entries.len() > max_days {
            self.entries.pop_front();
        }
    }

    pub fn entry(&self, day: DayKey) -> Option<&DailyMoodEntry> {
        self.entries.iter().find(|entry| entry.date == day)
    }

    pub fn entries(&self) -> impl Iterator<Item = &DailyMoodEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&DailyMoodEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load history from JSON, normalizing order, duplicates and length
    pub fn from_json(json: &str, max_days: usize) -> Result<Self, serde_json::Error> {
        let entries: Vec<DailyMoodEntry> = serde_json::from_str(json)?;
        Ok(Self::from_entries(entries, max_days))
    }

    /// Serialize history to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Durable key-value slot holding the serialized history
pub trait HistoryBackend: Send + Sync {
    /// Read the stored payload. `Ok(None)` when nothing has been stored yet.
    fn read(&self) -> Result<Option<String>, ComputeError>;

    /// Replace the stored payload. Readers never observe a partial write.
    fn write(&self, payload: &str) -> Result<(), ComputeError>;

    /// Human-readable location, for logs and diagnostics
    fn describe(&self) -> String;
}

impl<T: HistoryBackend + ?Sized> HistoryBackend for Arc<T> {
    fn read(&self) -> Result<Option<String>, ComputeError> {
        (**self).read()
    }

    fn write(&self, payload: &str) -> Result<(), ComputeError> {
        (**self).write(payload)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// In-process slot, for tests and embedders that persist elsewhere
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slot: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-seeded with a payload
    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(payload.into())),
        }
    }

    /// Current raw payload
    pub fn payload(&self) -> Option<String> {
        self.slot.lock().clone()
    }
}

impl HistoryBackend for MemoryBackend {
    fn read(&self) -> Result<Option<String>, ComputeError> {
        Ok(self.slot.lock().clone())
    }

    fn write(&self, payload: &str) -> Result<(), ComputeError> {
        *self.slot.lock() = Some(payload.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// JSON file slot. Writes go to a sibling temp file that is renamed over the
/// target.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| HISTORY_SLOT.to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()))
    }
}

impl HistoryBackend for FileBackend {
    fn read(&self) -> Result<Option<String>, ComputeError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ComputeError::Persistence(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write(&self, payload: &str) -> Result<(), ComputeError> {
        let temp = self.temp_path();
        let result = fs::write(&temp, payload).and_then(|()| fs::rename(&temp, &self.path));
        if let Err(e) = result {
            let _ = fs::remove_file(&temp);
            return Err(ComputeError::Persistence(format!(
                "cannot write {}: {}",
                self.path.display(),
                e
            )));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Shared, persisted mood history.
///
/// Increments are read-modify-write under a lock, so pipelines sharing one store
/// through an `Arc` never lose updates.
pub struct MoodHistoryStore {
    backend: Box<dyn HistoryBackend>,
    max_days: usize,
    write_lock: Mutex<()>,
}

impl MoodHistoryStore {
    /// Create a store over `backend` with the default seven-day window
    pub fn new(backend: impl HistoryBackend + 'static) -> Self {
        Self::with_window(backend, DEFAULT_HISTORY_DAYS)
    }

    /// Create a store with a specific window in days (at least one)
    pub fn with_window(backend: impl HistoryBackend + 'static, max_days: usize) -> Self {
        Self {
            backend: Box::new(backend),
            max_days: max_days.max(1),
            write_lock: Mutex::new(()),
        }
    }

    /// In-memory store, empty
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    pub fn max_days(&self) -> usize {
        self.max_days
    }

    pub fn backend(&self) -> &dyn HistoryBackend {
        self.backend.as_ref()
    }

    /// Load the stored history. Absent, unreadable or corrupt payloads yield an
    /// empty history.
    pub fn load(&self) -> MoodHistory {
        let payload = match self.backend.read() {
            Ok(Some(payload)) => payload,
            Ok(None) => return MoodHistory::new(),
            Err(e) => {
                warn!(backend = %self.backend.describe(), error = %e, "mood history unreadable, starting empty");
                return MoodHistory::new();
            }
        };

        if payload.trim().is_empty() {
            return MoodHistory::new();
        }

        match MoodHistory::from_json(&payload, self.max_days) {
            Ok(history) => history,
            Err(e) => {
                warn!(backend = %self.backend.describe(), error = %e, "discarding corrupt mood history");
                MoodHistory::new()
            }
        }
    }

    /// Replace the stored history
    pub fn save(&self, history: &MoodHistory) -> Result<(), ComputeError> {
        let _guard = self.write_lock.lock();
        self.write(history)
    }

    fn write(&self, history: &MoodHistory) -> Result<(), ComputeError> {
        let payload = history
            .to_json()
            .map_err(|e| ComputeError::Persistence(e.to_string()))?;
        self.backend.write(&payload)
    }

    /// Count one occurrence of `label` on `day` and persist the result.
    ///
    /// The current payload is read through [`load`](Self::load), so a payload that
    /// cannot be read or parsed is replaced by a history holding only this count.
    pub fn increment(&self, label: EmotionLabel, day: DayKey) -> Result<MoodHistory, ComputeError> {
        let _guard = self.write_lock.lock();
        let mut history = self.load();
        history.increment(label, day, self.max_days);
        self.write(&history)?;
        debug!(%label, %day, days = history.len(), "mood history incremented");
        Ok(history)
    }

    /// Remove all stored history
    pub fn clear(&self) -> Result<(), ComputeError> {
        self.save(&MoodHistory::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;

    fn day(d: u32) -> DayKey {
        DayKey::from_ymd(2024, 1, d).unwrap()
    }

    #[test]
    fn test_increment_merges_same_day() {
        let store = MoodHistoryStore::in_memory();
        store.increment(EmotionLabel::Happy, day(1)).unwrap();
        store.increment(EmotionLabel::Happy, day(1)).unwrap();

        let history = store.load();
        assert_eq!(history.len(), 1);
        assert_eq!(history.entry(day(1)).unwrap().counts.happy, 2);
    }

    #[test]
    fn test_new_entry_is_zero_initialized() {
        let store = MoodHistoryStore::in_memory();
        let history = store.increment(EmotionLabel::Angry, day(3)).unwrap();

        let counts = history.entry(day(3)).unwrap().counts;
        assert_eq!(counts.angry, 1);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn test_rollover_keeps_seven_days() {
        let store = MoodHistoryStore::in_memory();
        for d in 1..=8 {
            store.increment(EmotionLabel::Neutral, day(d)).unwrap();
        }

        let history = store.load();
        assert_eq!(history.len(), 7);
        assert!(history.entry(day(1)).is_none());
        assert_eq!(history.entries().next().unwrap().date, day(2));
        assert_eq!(history.latest().unwrap().date, day(8));
    }

    #[test]
    fn test_out_of_order_day_is_inserted_in_order() {
        let mut history = MoodHistory::new();
        history.increment(EmotionLabel::Happy, day(5), 7);
        history.increment(EmotionLabel::Sad, day(3), 7);

        let dates: Vec<DayKey> = history.entries().map(|e| e.date).collect();
        assert_eq!(dates, vec![day(3), day(5)]);
    }

    #[test]
    fn test_persisted_layout() {
        let backend = Arc::new(MemoryBackend::new());
        let store = MoodHistoryStore::new(Arc::clone(&backend));
        store.increment(EmotionLabel::Surprised, day(15)).unwrap();

        let payload: serde_json::Value = serde_json::from_str(&backend.payload().unwrap()).unwrap();
        assert_eq!(
            payload,
            serde_json::json!([{
                "date": "2024-01-15",
                "happy": 0,
                "sad": 0,
                "angry": 0,
                "surprised": 1,
                "neutral": 0
            }])
        );
    }

    #[test]
    fn test_absent_history_is_empty() {
        let store = MoodHistoryStore::in_memory();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_corrupt_history_is_discarded() {
        let store = MoodHistoryStore::new(MemoryBackend::with_payload("{not json"));
        assert!(store.load().is_empty());

        // The next increment starts over from an empty history
        let history = store.increment(EmotionLabel::Happy, day(1)).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_negative_count_is_corrupt() {
        let payload = r#"[{"date": "2024-01-01", "happy": -1}]"#;
        let store = MoodHistoryStore::new(MemoryBackend::with_payload(payload));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_normalizes_payload() {
        let payload = r#"[
            {"date": "2024-01-03", "happy": 1},
            {"date": "2024-01-01", "sad": 2},
            {"date": "2024-01-03", "happy": 4, "neutral": 1}
        ]"#;
        let store = MoodHistoryStore::new(MemoryBackend::with_payload(payload));
        let history = store.load();

        let dates: Vec<DayKey> = history.entries().map(|e| e.date).collect();
        assert_eq!(dates, vec![day(1), day(3)]);
        let merged = history.entry(day(3)).unwrap().counts;
        assert_eq!(merged.happy, 5);
        assert_eq!(merged.neutral, 1);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(MoodHistoryStore::in_memory());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..25 {
                        store.increment(EmotionLabel::Happy, day(1)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.load().entry(day(1)).unwrap().counts.happy, 100);
    }

    #[test]
    fn test_file_backend_round_trip() {
        let path = std::env::temp_dir().join(format!("moodlens-history-{}.json", Uuid::new_v4()));
        let store = MoodHistoryStore::new(FileBackend::new(&path));

        assert!(store.load().is_empty());
        store.increment(EmotionLabel::Sad, day(2)).unwrap();
        store.increment(EmotionLabel::Sad, day(2)).unwrap();

        let reopened = MoodHistoryStore::new(FileBackend::new(&path));
        assert_eq!(reopened.load().entry(day(2)).unwrap().counts.sad, 2);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_file_backend_absent_file_is_empty() {
        let path = std::env::temp_dir().join(format!("moodlens-absent-{}.json", Uuid::new_v4()));
        let backend = FileBackend::new(&path);

        assert_eq!(backend.read().unwrap(), None);
        let store = MoodHistoryStore::new(backend);
        assert!(store.load().is_empty());
        assert!(crate::analytics::summarize(&store.load()).is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_file_backend_write_failure() {
        let dir = std::env::temp_dir().join(format!("moodlens-missing-{}", Uuid::new_v4()));
        let store = MoodHistoryStore::new(FileBackend::new(dir.join("history.json")));

        let err = store.increment(EmotionLabel::Happy, day(1)).unwrap_err();
        assert!(matches!(err, ComputeError::Persistence(_)));
        assert!(!dir.exists());

        // Failed rename leaves no temp file next to the target
        let dir = std::env::temp_dir().join(format!("moodlens-blocked-{}", Uuid::new_v4()));
        let target = dir.join("history.json");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("occupied"), "x").unwrap();

        let err = FileBackend::new(&target).write("[]").unwrap_err();
        assert!(matches!(err, ComputeError::Persistence(_)));
        let leftovers: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_clear() {
        let store = MoodHistoryStore::in_memory();
        store.increment(EmotionLabel::Happy, day(1)).unwrap();
        store.clear().unwrap();
        assert!(store.load().is_empty());
    }
}
