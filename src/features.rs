//! Feature extraction
//!
//! This module derives the geometric features the classifier reads from a single
//! landmark frame:
//! - Mouth aspect ratio (height over width)
//! - Eye openness (mean eyelid gap)
//! - Smile curvature (mouth corners against the lip midline)
//! - Brow raise (brows against the upper eyelids)

use crate::error::ComputeError;
use crate::types::{FeatureVector, Landmark, LandmarkFrame};

/// Face-mesh indices of the landmarks the rule set reads
pub mod landmark_index {
    pub const LEFT_MOUTH_CORNER: usize = 61;
    pub const RIGHT_MOUTH_CORNER: usize = 291;
    pub const TOP_LIP: usize = 13;
    pub const BOTTOM_LIP: usize = 14;
    pub const LEFT_EYELID_TOP: usize = 159;
    pub const LEFT_EYELID_BOTTOM: usize = 145;
    pub const RIGHT_EYELID_TOP: usize = 386;
    pub const RIGHT_EYELID_BOTTOM: usize = 374;
    pub const LEFT_BROW: usize = 70;
    pub const RIGHT_BROW: usize = 300;

    /// Smallest frame length that contains every index above
    pub const MIN_FRAME_LEN: usize = RIGHT_EYELID_TOP + 1;
}

/// Minimum gap between eyelid line and brow line for a raised brow
pub const BROW_RAISE_THRESHOLD: f64 = 0.03;

/// Feature extractor for computing classifier inputs
pub struct FeatureExtractor;

/// The ten landmarks the rule set reads, resolved from one frame
struct FaceLandmarks<'a> {
    left_mouth: &'a Landmark,
    right_mouth: &'a Landmark,
    top_lip: &'a Landmark,
    bottom_lip: &'a Landmark,
    left_eye_top: &'a Landmark,
    left_eye_bottom: &'a Landmark,
    right_eye_top: &'a Landmark,
    right_eye_bottom: &'a Landmark,
    left_brow: &'a Landmark,
    right_brow: &'a Landmark,
}

impl FeatureExtractor {
    /// Extract features from a landmark frame.
    ///
    /// Fails with `MissingLandmarks` when the frame is empty or too short, and with
    /// `DegenerateGeometry` when a ratio would be undefined.
    pub fn extract(frame: &LandmarkFrame) -> Result<FeatureVector, ComputeError> {
        let face = resolve_landmarks(frame)?;

        let mouth_ratio = compute_mouth_ratio(&face)?;
        let eye_openness = compute_eye_openness(&face);
        let is_smiling = compute_is_smiling(&face);
        let brow_raised = compute_brow_raised(&face);

        if !eye_openness.is_finite() {
            return Err(ComputeError::DegenerateGeometry(
                "eye openness is not finite".to_string(),
            ));
        }

        Ok(FeatureVector {
            mouth_ratio,
            eye_openness,
            brow_raised,
            is_smiling,
        })
    }
}

fn resolve_landmarks(frame: &LandmarkFrame) -> Result<FaceLandmarks<'_>, ComputeError> {
    use landmark_index::*;

    if frame.is_empty() {
        return Err(ComputeError::MissingLandmarks(
            "frame contains no landmarks".to_string(),
        ));
    }

    Ok(FaceLandmarks {
        left_mouth: point(frame, LEFT_MOUTH_CORNER, "left mouth corner")?,
        right_mouth: point(frame, RIGHT_MOUTH_CORNER, "right mouth corner")?,
        top_lip: point(frame, TOP_LIP, "top lip")?,
        bottom_lip: point(frame, BOTTOM_LIP, "bottom lip")?,
        left_eye_top: point(frame, LEFT_EYELID_TOP, "left eyelid top")?,
        left_eye_bottom: point(frame, LEFT_EYELID_BOTTOM, "left eyelid bottom")?,
        right_eye_top: point(frame, RIGHT_EYELID_TOP, "right eyelid top")?,
        right_eye_bottom: point(frame, RIGHT_EYELID_BOTTOM, "right eyelid bottom")?,
        left_brow: point(frame, LEFT_BROW, "left brow")?,
        right_brow: point(frame, RIGHT_BROW, "right brow")?,
    })
}

/// Look up one landmark, rejecting absent or non-finite points
fn point<'a>(frame: &'a LandmarkFrame, index: usize, name: &str) -> Result<&'a Landmark, ComputeError> {
    let landmark = frame.get(index).ok_or_else(|| {
        ComputeError::MissingLandmarks(format!(
            "{} (index {}) not present in frame of {} points",
            name,
            index,
            frame.len()
        ))
    })?;
    if !landmark.is_finite() {
        return Err(ComputeError::DegenerateGeometry(format!(
            "{} (index {}) has non-finite coordinates",
            name, index
        )));
    }
    Ok(landmark)
}

/// Calculate mouth ratio: vertical lip gap / horizontal corner distance
fn compute_mouth_ratio(face: &FaceLandmarks<'_>) -> Result<f64, ComputeError> {
    let mouth_width = (face.right_mouth.x - face.left_mouth.x).abs();
    let mouth_height = (face.bottom_lip.y - face.top_lip.y).abs();

    if mouth_width == 0.0 {
        return Err(ComputeError::DegenerateGeometry(
            "mouth width is zero".to_string(),
        ));
    }

    let ratio = mouth_height / mouth_width;
    if !ratio.is_finite() {
        return Err(ComputeError::DegenerateGeometry(format!(
            "mouth ratio {} / {} is not finite",
            mouth_height, mouth_width
        )));
    }
    Ok(ratio)
}

/// Calculate eye openness: mean eyelid gap over both eyes
fn compute_eye_openness(face: &FaceLandmarks<'_>) -> f64 {
    let left = (face.left_eye_top.y - face.left_eye_bottom.y).abs();
    let right = (face.right_eye_top.y - face.right_eye_bottom.y).abs();
    (left + right) / 2.0
}

/// Mouth corners below the lip midline. Image y grows downward, so on screen
/// this reads as corners curving up.
fn compute_is_smiling(face: &FaceLandmarks<'_>) -> bool {
    let mouth_center_y = (face.top_lip.y + face.bottom_lip.y) / 2.0;
    face.left_mouth.y > mouth_center_y && face.right_mouth.y > mouth_center_y
}

/// Brow line sits more than the threshold above the upper eyelid line
fn compute_brow_raised(face: &FaceLandmarks<'_>) -> bool {
    let brow_height = (face.left_brow.y + face.right_brow.y) / 2.0;
    let eye_height = (face.left_eye_top.y + face.right_eye_top.y) / 2.0;
    eye_height - brow_height > BROW_RAISE_THRESHOLD
}

/// Synthetic full-size frames with only the rule-set landmarks placed
#[cfg(test)]
pub(crate) mod fixtures {
    use super::landmark_index::*;
    use crate::types::{Landmark, LandmarkFrame};

    /// Number of points in a MediaPipe face-mesh frame with iris refinement
    pub const FACE_MESH_POINTS: usize = 478;

    /// Vertical layout of a synthetic face
    #[derive(Debug, Clone, Copy)]
    pub struct FaceShape {
        pub mouth_left_x: f64,
        pub mouth_right_x: f64,
        pub top_lip_y: f64,
        pub bottom_lip_y: f64,
        /// y of both mouth corners
        pub corner_y: f64,
        pub eyelid_top_y: f64,
        pub eyelid_bottom_y: f64,
        pub brow_y: f64,
    }

    impl Default for FaceShape {
        /// A relaxed face: mouth ratio 0.1, corners on the lip midline, brows close
        /// to the eyes.
        fn default() -> Self {
            Self {
                mouth_left_x: 0.4,
                mouth_right_x: 0.6,
                top_lip_y: 0.70,
                bottom_lip_y: 0.72,
                corner_y: 0.71,
                eyelid_top_y: 0.40,
                eyelid_bottom_y: 0.41,
                brow_y: 0.38,
            }
        }
    }

    impl FaceShape {
        /// Wide open smile: ratio 0.3, corners low
        pub fn happy() -> Self {
            Self {
                top_lip_y: 0.70,
                bottom_lip_y: 0.76,
                corner_y: 0.75,
                ..Self::default()
            }
        }

        /// Raised brows, open eyes, neutral mouth
        pub fn surprised() -> Self {
            Self {
                eyelid_top_y: 0.40,
                eyelid_bottom_y: 0.43,
                brow_y: 0.33,
                ..Self::default()
            }
        }

        /// Nearly closed mouth with high corners
        pub fn sad() -> Self {
            Self {
                top_lip_y: 0.700,
                bottom_lip_y: 0.710,
                corner_y: 0.69,
                ..Self::default()
            }
        }

        /// Open mouth without smile curvature
        pub fn angry() -> Self {
            Self {
                top_lip_y: 0.70,
                bottom_lip_y: 0.75,
                corner_y: 0.70,
                ..Self::default()
            }
        }

        pub fn frame(&self) -> LandmarkFrame {
            let mut points = vec![Landmark::new(0.5, 0.5); FACE_MESH_POINTS];
            points[LEFT_MOUTH_CORNER] = Landmark::new(self.mouth_left_x, self.corner_y);
            points[RIGHT_MOUTH_CORNER] = Landmark::new(self.mouth_right_x, self.corner_y);
            points[TOP_LIP] = Landmark::new(0.5, self.top_lip_y);
            points[BOTTOM_LIP] = Landmark::new(0.5, self.bottom_lip_y);
            points[LEFT_EYELID_TOP] = Landmark::new(0.4, self.eyelid_top_y);
            points[LEFT_EYELID_BOTTOM] = Landmark::new(0.4, self.eyelid_bottom_y);
            points[RIGHT_EYELID_TOP] = Landmark::new(0.6, self.eyelid_top_y);
            points[RIGHT_EYELID_BOTTOM] = Landmark::new(0.6, self.eyelid_bottom_y);
            points[LEFT_BROW] = Landmark::new(0.4, self.brow_y);
            points[RIGHT_BROW] = Landmark::new(0.6, self.brow_y);
            LandmarkFrame::new(points)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::FaceShape;
    use super::landmark_index::*;
    use super::*;

    #[test]
    fn test_mouth_ratio() {
        let features = FeatureExtractor::extract(&FaceShape::happy().frame()).unwrap();
        // 0.06 / 0.2 = 0.3
        assert!((features.mouth_ratio - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_eye_openness_averages_both_eyes() {
        let mut frame = FaceShape::default().frame().points().to_vec();
        frame[RIGHT_EYELID_BOTTOM] = Landmark::new(0.6, 0.43);
        let features = FeatureExtractor::extract(&LandmarkFrame::new(frame)).unwrap();
        // (0.01 + 0.03) / 2 = 0.02
        assert!((features.eye_openness - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_smile_requires_both_corners_below_midline() {
        let happy = FeatureExtractor::extract(&FaceShape::happy().frame()).unwrap();
        assert!(happy.is_smiling);

        let mut points = FaceShape::happy().frame().points().to_vec();
        points[RIGHT_MOUTH_CORNER] = Landmark::new(0.6, 0.70);
        let lopsided = FeatureExtractor::extract(&LandmarkFrame::new(points)).unwrap();
        assert!(!lopsided.is_smiling);

        // Corners exactly on the midline do not count
        let relaxed = FeatureExtractor::extract(&FaceShape::default().frame()).unwrap();
        assert!(!relaxed.is_smiling);
    }

    #[test]
    fn test_brow_raised() {
        let surprised = FeatureExtractor::extract(&FaceShape::surprised().frame()).unwrap();
        assert!(surprised.brow_raised);

        // 0.40 - 0.38 = 0.02 is under the threshold
        let relaxed = FeatureExtractor::extract(&FaceShape::default().frame()).unwrap();
        assert!(!relaxed.brow_raised);
    }

    #[test]
    fn test_empty_frame_is_missing_landmarks() {
        let err = FeatureExtractor::extract(&LandmarkFrame::empty()).unwrap_err();
        assert!(matches!(err, ComputeError::MissingLandmarks(_)));
        assert!(err.is_frame_error());
    }

    #[test]
    fn test_short_frame_is_missing_landmarks() {
        let points = vec![Landmark::new(0.5, 0.5); MIN_FRAME_LEN - 1];
        let err = FeatureExtractor::extract(&LandmarkFrame::new(points)).unwrap_err();
        assert!(matches!(err, ComputeError::MissingLandmarks(msg) if msg.contains("386")));
    }

    #[test]
    fn test_minimal_frame_is_enough() {
        let points = FaceShape::happy().frame().points()[..MIN_FRAME_LEN].to_vec();
        assert!(FeatureExtractor::extract(&LandmarkFrame::new(points)).is_ok());
    }

    #[test]
    fn test_zero_mouth_width_is_degenerate() {
        let shape = FaceShape {
            mouth_left_x: 0.5,
            mouth_right_x: 0.5,
            ..FaceShape::default()
        };
        let err = FeatureExtractor::extract(&shape.frame()).unwrap_err();
        assert!(matches!(err, ComputeError::DegenerateGeometry(_)));
    }

    #[test]
    fn test_nan_coordinate_is_degenerate() {
        let mut points = FaceShape::default().frame().points().to_vec();
        points[TOP_LIP] = Landmark::new(0.5, f64::NAN);
        let err = FeatureExtractor::extract(&LandmarkFrame::new(points)).unwrap_err();
        assert!(matches!(err, ComputeError::DegenerateGeometry(_)));
    }
}
