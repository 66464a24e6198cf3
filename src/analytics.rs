//! Read-only summaries over the mood history
//!
//! Consumers such as dashboards render these. An empty history produces an empty
//! summary rather than an error.

use serde::Serialize;

use crate::history::MoodHistory;
use crate::types::{DayKey, EmotionLabel, MoodCounts};

/// Dominant mood of a single day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyMood {
    pub date: DayKey,
    pub dominant: Option<EmotionLabel>,
    pub total: u32,
}

/// Share of one label across the window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelShare {
    pub label: EmotionLabel,
    pub count: u32,
    /// Fraction of all counts (0-1)
    pub share: f64,
}

/// Summary of the whole history window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodSummary {
    pub days: usize,
    pub total: u32,
    pub totals: MoodCounts,
    pub dominant: Option<EmotionLabel>,
    pub shares: Vec<LabelShare>,
    pub daily: Vec<DailyMood>,
}

impl MoodSummary {
    /// Nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Summarize a history window
pub fn summarize(history: &MoodHistory) -> MoodSummary {
    let mut totals = MoodCounts::default();
    let mut daily = Vec::with_capacity(history.len());

    for entry in history.entries() {
        totals.merge(&entry.counts);
        daily.push(DailyMood {
            date: entry.date,
            dominant: entry.counts.dominant(),
            total: entry.counts.total(),
        });
    }

    let total = totals.total();
    let shares = EmotionLabel::ALL
        .iter()
        .map(|label| {
            let count = totals.get(*label);
            LabelShare {
                label: *label,
                count,
                share: if total > 0 {
                    count as f64 / total as f64
                } else {
                    0.0
                },
            }
        })
        .collect();

    MoodSummary {
        days: history.len(),
        total,
        totals,
        dominant: totals.dominant(),
        shares,
        daily,
    }
}
