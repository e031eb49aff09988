//! Error types for vision operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for vision operations.
pub type VisionResult<T> = Result<T, VisionError>;

/// Errors that can occur while reading frames or analyzing faces.
#[derive(Debug, Error)]
pub enum VisionError {
    /// The frame source cannot produce further frames.
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Face detection failed: {0}")]
    DetectionFailed(String),

    #[error("Emotion classification failed: {0}")]
    ClassificationFailed(String),

    #[error("Face encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Invalid staff gallery {path}: {message}")]
    InvalidGallery { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl VisionError {
    pub fn capture_failed(message: impl Into<String>) -> Self {
        Self::CaptureFailed(message.into())
    }

    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    pub fn classification_failed(message: impl Into<String>) -> Self {
        Self::ClassificationFailed(message.into())
    }

    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed(message.into())
    }

    pub fn invalid_gallery(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidGallery {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Only capture failures end a run; everything else degrades a single frame or face.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VisionError::CaptureFailed(_))
    }
}
