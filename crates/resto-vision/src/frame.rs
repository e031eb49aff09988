//! Frames and per-face analysis results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use resto_models::{BoundingBox, Emotion};

/// Face descriptor used for staff recognition.
pub type Descriptor = Vec<f32>;

/// Face annotation carried by pre-annotated sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceAnnotation {
    pub bbox: BoundingBox,
    pub emotion: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub descriptor: Option<Descriptor>,
}

/// One video frame.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Position in the stream, starting at 0
    pub index: u64,
    pub captured_at: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    /// Table the camera is on, when the source knows it
    pub table_number: Option<u32>,
    /// 8-bit grayscale pixels, row-major. Empty when the source has none.
    pub luma: Vec<u8>,
    /// Pre-computed faces, for annotated sources
    pub annotations: Vec<FaceAnnotation>,
}

/// A located face within a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRegion {
    /// Index of the region within its frame, in localizer order
    pub index: usize,
    pub bbox: BoundingBox,
    /// Localizer confidence in [0, 1]
    pub score: f64,
}

/// Classifier output for one face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionPrediction {
    pub emotion: Emotion,
    pub confidence: f64,
}

/// Everything the analyzer learned about one face.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    /// None when classification failed or fell below the confidence floor
    pub emotion: Option<EmotionPrediction>,
    /// Enrolled staff name, when recognized
    pub staff_identity: Option<String>,
}

impl FaceDetection {
    pub fn guest(bbox: BoundingBox, emotion: Emotion, confidence: f64) -> Self {
        Self {
            bbox,
            emotion: Some(EmotionPrediction {
                emotion,
                confidence,
            }),
            staff_identity: None,
        }
    }

    pub fn staff(bbox: BoundingBox, name: impl Into<String>, emotion: Emotion, confidence: f64) -> Self {
        Self {
            staff_identity: Some(name.into()),
            ..Self::guest(bbox, emotion, confidence)
        }
    }
}
