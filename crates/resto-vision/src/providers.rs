//! Capability traits for the external vision components.
//!
//! These traits give the pipeline a uniform interface over frame
//! capture and face models, so real models and replayed annotations
//! are interchangeable.

use async_trait::async_trait;

use crate::error::VisionResult;
use crate::frame::{Descriptor, EmotionPrediction, FaceRegion, Frame};

/// Source of video frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` at end of stream.
    ///
    /// A read error is reported as [`crate::VisionError::CaptureFailed`].
    async fn next_frame(&mut self) -> VisionResult<Option<Frame>>;

    /// Source name for logging.
    fn name(&self) -> &'static str;
}

/// Face localization.
pub trait FaceLocalizer: Send + Sync {
    /// Locate faces in a frame. An empty result means no faces.
    fn locate(&self, frame: &Frame) -> VisionResult<Vec<FaceRegion>>;

    fn name(&self) -> &'static str;
}

/// Emotion classification for a located face.
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, frame: &Frame, face: &FaceRegion) -> VisionResult<EmotionPrediction>;

    fn name(&self) -> &'static str;
}

/// Face descriptor extraction.
pub trait FaceEncoder: Send + Sync {
    /// Descriptor for a located face, or `None` if the face cannot be encoded.
    fn encode(&self, frame: &Frame, face: &FaceRegion) -> VisionResult<Option<Descriptor>>;

    fn name(&self) -> &'static str;
}

/// Staff identity resolution for a located face.
pub trait IdentityMatcher: Send + Sync {
    /// Enrolled staff name, or `None` for an unknown face.
    fn identify(&self, frame: &Frame, face: &FaceRegion) -> VisionResult<Option<String>>;

    fn name(&self) -> &'static str;
}
