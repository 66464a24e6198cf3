//! Rule-based emotion classification
//!
//! An ordered decision list over the feature vector. The first matching rule
//! wins, so rule order is part of the observable behavior.

use serde::{Deserialize, Serialize};

use crate::types::{EmotionLabel, FeatureVector};

/// Mouth ratio above which a smile counts as happy
pub const HAPPY_MOUTH_RATIO: f64 = 0.15;
/// Eye openness above which raised brows count as surprise
pub const SURPRISED_EYE_OPENNESS: f64 = 0.02;
/// Mouth ratio below which an unsmiling mouth counts as sad
pub const SAD_MOUTH_RATIO: f64 = 0.08;
/// Mouth ratio above which an unsmiling mouth counts as angry
pub const ANGRY_MOUTH_RATIO: f64 = 0.2;

/// The rule that produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationRule {
    SmileWithOpenMouth,
    RaisedBrowsOpenEyes,
    ClosedMouthNoSmile,
    OpenMouthNoSmile,
    Fallback,
}

impl ClassificationRule {
    pub fn label(&self) -> EmotionLabel {
        match self {
            ClassificationRule::SmileWithOpenMouth => EmotionLabel::Happy,
            ClassificationRule::RaisedBrowsOpenEyes => EmotionLabel::Surprised,
            ClassificationRule::ClosedMouthNoSmile => EmotionLabel::Sad,
            ClassificationRule::OpenMouthNoSmile => EmotionLabel::Angry,
            ClassificationRule::Fallback => EmotionLabel::Neutral,
        }
    }
}

/// Deterministic emotion classifier
pub struct EmotionClassifier;

impl EmotionClassifier {
    /// Classify a feature vector. Total over the feature domain.
    pub fn classify(features: &FeatureVector) -> EmotionLabel {
        Self::classify_with_rule(features).label()
    }

    /// Classify and report which rule matched
    pub fn classify_with_rule(features: &FeatureVector) -> ClassificationRule {
        let FeatureVector {
            mouth_ratio,
            eye_openness,
            brow_raised,
            is_smiling,
        } = *features;

        if is_smiling && mouth_ratio > HAPPY_MOUTH_RATIO {
            ClassificationRule::SmileWithOpenMouth
        } else if brow_raised && eye_openness > SURPRISED_EYE_OPENNESS {
            ClassificationRule::RaisedBrowsOpenEyes
        } else if mouth_ratio < SAD_MOUTH_RATIO && !is_smiling {
            ClassificationRule::ClosedMouthNoSmile
        } else if mouth_ratio > ANGRY_MOUTH_RATIO && !is_smiling {
            ClassificationRule::OpenMouthNoSmile
        } else {
            ClassificationRule::Fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(mouth_ratio: f64, eye_openness: f64, brow_raised: bool, is_smiling: bool) -> FeatureVector {
        FeatureVector {
            mouth_ratio,
            eye_openness,
            brow_raised,
            is_smiling,
        }
    }

    #[test]
    fn test_each_rule() {
        assert_eq!(EmotionClassifier::classify(&features(0.3, 0.01, false, true)), EmotionLabel::Happy);
        assert_eq!(EmotionClassifier::classify(&features(0.1, 0.03, true, false)), EmotionLabel::Surprised);
        assert_eq!(EmotionClassifier::classify(&features(0.05, 0.01, false, false)), EmotionLabel::Sad);
        assert_eq!(EmotionClassifier::classify(&features(0.25, 0.01, false, false)), EmotionLabel::Angry);
        assert_eq!(EmotionClassifier::classify(&features(0.1, 0.01, false, false)), EmotionLabel::Neutral);
    }

    #[test]
    fn test_rule_order_happy_beats_surprised() {
        let f = features(0.3, 0.05, true, true);
        assert_eq!(EmotionClassifier::classify_with_rule(&f), ClassificationRule::SmileWithOpenMouth);
    }

    #[test]
    fn test_rule_order_surprised_beats_sad_and_angry() {
        assert_eq!(EmotionClassifier::classify(&features(0.01, 0.05, true, false)), EmotionLabel::Surprised);
        assert_eq!(EmotionClassifier::classify(&features(0.5, 0.05, true, false)), EmotionLabel::Surprised);
    }

    #[test]
    fn test_happy_boundary_is_strict() {
        // Exactly 0.15 fails rule 1 and falls through to the fallback
        assert_eq!(EmotionClassifier::classify(&features(0.15, 0.01, false, true)), EmotionLabel::Neutral);
        // With raised brows it reaches rule 2 instead
        assert_eq!(EmotionClassifier::classify(&features(0.15, 0.03, true, true)), EmotionLabel::Surprised);
    }

    #[test]
    fn test_remaining_boundaries_are_strict() {
        assert_eq!(EmotionClassifier::classify(&features(0.1, 0.02, true, false)), EmotionLabel::Neutral);
        assert_eq!(EmotionClassifier::classify(&features(0.08, 0.01, false, false)), EmotionLabel::Neutral);
        assert_eq!(EmotionClassifier::classify(&features(0.2, 0.01, false, false)), EmotionLabel::Neutral);
    }

    #[test]
    fn test_smiling_never_sad_or_angry() {
        assert_eq!(EmotionClassifier::classify(&features(0.01, 0.01, false, true)), EmotionLabel::Neutral);
        // A smile with ratio above 0.2 is happy, never angry
        assert_eq!(EmotionClassifier::classify(&features(0.5, 0.01, false, true)), EmotionLabel::Happy);
    }

    #[test]
    fn test_deterministic() {
        let f = features(0.12, 0.025, true, false);
        let first = EmotionClassifier::classify(&f);
        for _ in 0..100 {
            assert_eq!(EmotionClassifier::classify(&f), first);
        }
    }

    #[test]
    fn test_total_on_extreme_values() {
        for ratio in [0.0, f64::MIN_POSITIVE, 1e9, f64::MAX] {
            for smiling in [false, true] {
                for raised in [false, true] {
                    // Always produces some label without panicking
                    let _ = EmotionClassifier::classify(&features(ratio, 0.0, raised, smiling));
                }
            }
        }
    }
}
