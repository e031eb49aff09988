//! Per-frame face analysis.
//!
//! Localizes faces, then runs identity matching and emotion
//! classification for every face in parallel. Results come back in
//! localizer order regardless of completion order.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::frame::{EmotionPrediction, FaceDetection, FaceRegion, Frame};
use crate::metrics::{record_classification_failure, record_faces};
use crate::providers::{EmotionClassifier, FaceLocalizer, IdentityMatcher};

/// Analyzer thresholds.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Faces whose smaller side is below this many pixels are ignored
    pub min_face_size: f64,
    /// Predictions below this confidence are discarded
    pub emotion_confidence: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_face_size: 40.0,
            emotion_confidence: 0.40,
        }
    }
}

/// Result of analyzing one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameAnalysis {
    pub detections: Vec<FaceDetection>,
    /// Faces dropped for being too small
    pub dropped_small: usize,
    /// Faces whose emotion could not be classified
    pub unclassified: usize,
}

/// Runs the face capabilities over a frame.
pub struct FrameAnalyzer {
    localizer: Arc<dyn FaceLocalizer>,
    classifier: Arc<dyn EmotionClassifier>,
    matcher: Option<Arc<dyn IdentityMatcher>>,
    config: AnalyzerConfig,
}

impl FrameAnalyzer {
    pub fn new(
        localizer: Arc<dyn FaceLocalizer>,
        classifier: Arc<dyn EmotionClassifier>,
        matcher: Option<Arc<dyn IdentityMatcher>>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            localizer,
            classifier,
            matcher,
            config,
        }
    }

    /// Analyze one frame. Blocking; call from a blocking context.
    ///
    /// A localizer failure yields zero detections. Classifier and matcher
    /// failures only affect the face they occurred on.
    pub fn analyze(&self, frame: &Frame) -> FrameAnalysis {
        let regions = match self.localizer.locate(frame) {
            Ok(r) => r,
            Err(e) => {
                warn!(frame = frame.index, localizer = self.localizer.name(), "Face detection failed: {}", e);
                return FrameAnalysis::default();
            }
        };

        let total = regions.len();
        let kept: Vec<FaceRegion> = regions
            .into_iter()
            .filter(|r| r.bbox.is_valid() && r.bbox.min_side() >= self.config.min_face_size)
            .collect();
        let dropped_small = total - kept.len();

        let detections: Vec<FaceDetection> = kept
            .par_iter()
            .map(|region| self.analyze_face(frame, region))
            .collect();

        let unclassified = detections.iter().filter(|d| d.emotion.is_none()).count();
        record_faces(detections.len(), dropped_small);

        if total > 0 {
            debug!(
                frame = frame.index,
                faces = detections.len(),
                dropped_small,
                unclassified,
                "Analyzed frame"
            );
        }

        FrameAnalysis {
            detections,
            dropped_small,
            unclassified,
        }
    }

    fn analyze_face(&self, frame: &Frame, region: &FaceRegion) -> FaceDetection {
        let staff_identity = match &self.matcher {
            Some(matcher) => matcher.identify(frame, region).unwrap_or_else(|e| {
                debug!(frame = frame.index, face = region.index, "Identity matching failed: {}", e);
                None
            }),
            None => None,
        };

        let emotion = match self.classifier.classify(frame, region) {
            Ok(p) if p.confidence.is_finite() && p.confidence >= self.config.emotion_confidence => {
                Some(EmotionPrediction {
                    emotion: p.emotion,
                    confidence: p.confidence.min(1.0),
                })
            }
            Ok(_) => None,
            Err(e) => {
                record_classification_failure();
                debug!(frame = frame.index, face = region.index, "Emotion classification failed: {}", e);
                None
            }
        };

        FaceDetection {
            bbox: region.bbox,
            emotion,
            staff_identity,
        }
    }
}
