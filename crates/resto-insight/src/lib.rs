//! Alert enrichment through an external insight service.
//!
//! [`InsightAnalyzer`] is the seam the engine's escalator calls;
//! [`GeminiInsightClient`] implements it against Google's Gemini API.

pub mod analyzer;
pub mod error;
pub mod gemini;
pub mod prompt;

pub use analyzer::{Insight, InsightAnalyzer, InsightRequest};
pub use error::{InsightError, InsightResult};
pub use gemini::{parse_insight, GeminiConfig, GeminiInsightClient};
