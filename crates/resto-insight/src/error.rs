//! Insight service error types.

use thiserror::Error;

/// Result type for insight operations.
pub type InsightResult<T> = Result<T, InsightError>;

/// Errors from the insight service.
#[derive(Debug, Error)]
pub enum InsightError {
    #[error("Insight service not configured: {0}")]
    NotConfigured(String),

    #[error("Insight request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Insight service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Insight service returned no content")]
    EmptyResponse,

    #[error("Failed to parse insight: {0}")]
    Parse(String),

    #[error("All models failed: {0}")]
    AllModelsFailed(String),
}

impl InsightError {
    pub fn not_configured(msg: impl Into<String>) -> Self {
        Self::NotConfigured(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Check if a second attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            InsightError::NotConfigured(_) => false,
            InsightError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => true,
        }
    }
}
