//! Temporal smoothing
//!
//! Majority vote over the most recent per-frame labels. Ties go to the label
//! observed most recently.

use std::collections::VecDeque;

use crate::types::EmotionLabel;

/// Default smoothing window in frames
pub const DEFAULT_SMOOTHING_WINDOW: usize = 5;

/// Sliding-window majority-vote filter
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    /// Raw labels, oldest at the front
    buffer: VecDeque<EmotionLabel>,
    /// Maximum window size
    window: usize,
}

impl Default for TemporalSmoother {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporalSmoother {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_SMOOTHING_WINDOW)
    }

    /// Create a smoother with a specific window. A zero window is treated as one.
    pub fn with_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            buffer: VecDeque::with_capacity(window + 1),
            window,
        }
    }

    /// Record a raw label and return the smoothed label
    pub fn push(&mut self, label: EmotionLabel) -> EmotionLabel {
        self.buffer.push_back(label);
        while self.buffer.len() > self.window {
            self.buffer.pop_front();
        }
        self.majority().unwrap_or(label)
    }

    /// Smoothed label for the current buffer, `None` before the first push
    pub fn current(&self) -> Option<EmotionLabel> {
        self.majority()
    }

    /// Majority label, scanning newest to oldest so ties favour recency
    fn majority(&self) -> Option<EmotionLabel> {
        let mut counts = [0usize; EmotionLabel::ALL.len()];
        for label in &self.buffer {
            counts[label.index()] += 1;
        }
        let max = counts.iter().copied().max().unwrap_or(0);
        self.buffer
            .iter()
            .rev()
            .find(|label| counts[label.index()] == max)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Raw labels currently in the window, oldest first
    pub fn labels(&self) -> impl Iterator<Item = EmotionLabel> + '_ {
        self.buffer.iter().copied()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EmotionLabel::*;

    fn push_all(smoother: &mut TemporalSmoother, labels: &[EmotionLabel]) -> EmotionLabel {
        let mut last = Neutral;
        for label in labels {
            last = smoother.push(*label);
        }
        last
    }

    #[test]
    fn test_majority_wins() {
        let mut smoother = TemporalSmoother::new();
        assert_eq!(push_all(&mut smoother, &[Happy, Happy, Sad, Happy, Neutral]), Happy);
    }

    #[test]
    fn test_tie_prefers_most_recent() {
        let mut smoother = TemporalSmoother::new();
        assert_eq!(push_all(&mut smoother, &[Happy, Happy, Sad, Sad]), Sad);

        let mut smoother = TemporalSmoother::new();
        assert_eq!(push_all(&mut smoother, &[Sad, Sad, Happy, Happy]), Happy);
    }

    #[test]
    fn test_single_label_passes_through() {
        let mut smoother = TemporalSmoother::new();
        assert_eq!(smoother.push(Angry), Angry);
        assert_eq!(smoother.current(), Some(Angry));
    }

    #[test]
    fn test_all_distinct_returns_newest() {
        let mut smoother = TemporalSmoother::new();
        assert_eq!(push_all(&mut smoother, &[Happy, Sad, Angry, Surprised, Neutral]), Neutral);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut smoother = TemporalSmoother::new();
        push_all(&mut smoother, &[Happy, Happy, Happy, Sad, Sad]);
        assert_eq!(smoother.current(), Some(Happy));

        // Two more sads push two happies out: [Happy, Sad, Sad, Sad, Sad]
        assert_eq!(push_all(&mut smoother, &[Sad, Sad]), Sad);
        assert_eq!(smoother.len(), 5);
        assert_eq!(smoother.labels().collect::<Vec<_>>(), vec![Happy, Sad, Sad, Sad, Sad]);
    }

    #[test]
    fn test_length_never_exceeds_window() {
        let mut smoother = TemporalSmoother::with_window(3);
        for _ in 0..10 {
            smoother.push(Surprised);
            assert!(smoother.len() <= 3);
        }
    }

    #[test]
    fn test_clear_resets() {
        let mut smoother = TemporalSmoother::new();
        push_all(&mut smoother, &[Happy, Happy]);
        smoother.clear();
        assert!(smoother.is_empty());
        assert_eq!(smoother.current(), None);
        assert_eq!(smoother.push(Sad), Sad);
    }

    #[test]
    fn test_zero_window_is_clamped() {
        let mut smoother = TemporalSmoother::with_window(0);
        assert_eq!(smoother.window(), 1);
        smoother.push(Happy);
        assert_eq!(smoother.push(Sad), Sad);
        assert_eq!(smoother.len(), 1);
    }
}
