//! Engine error types.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Sink write failed: {0}")]
    SinkFailed(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Vision error: {0}")]
    Vision(#[from] resto_vision::VisionError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] resto_firestore::FirestoreError),

    #[error("Insight error: {0}")]
    Insight(#[from] resto_insight::InsightError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn capture_failed(msg: impl Into<String>) -> Self {
        Self::CaptureFailed(msg.into())
    }

    pub fn sink_failed(msg: impl Into<String>) -> Self {
        Self::SinkFailed(msg.into())
    }

    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Only a capture failure ends a run.
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::CaptureFailed(_) => true,
            EngineError::Vision(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::SinkFailed(_) | EngineError::Io(_) => true,
            EngineError::Firestore(e) => e.is_retryable(),
            EngineError::Insight(e) => e.is_retryable(),
            _ => false,
        }
    }
}
