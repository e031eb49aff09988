//! Insight service contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use resto_models::{Alert, EmotionSnapshot, SentimentSummary};

use crate::error::InsightResult;

/// Everything the service sees about one alert.
#[derive(Debug, Clone)]
pub struct InsightRequest {
    pub alert: Alert,
    /// Recent observations at the alert's table, oldest first
    pub window: Vec<EmotionSnapshot>,
    /// Current guest sentiment at the table, if known
    pub table_sentiment: Option<SentimentSummary>,
}

/// Analysis returned for an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub root_cause: String,
    pub recommendation: String,
    /// Always within 1..=10
    pub urgency: u8,
}

impl Insight {
    pub fn new(root_cause: impl Into<String>, recommendation: impl Into<String>, urgency: i64) -> Self {
        Self {
            root_cause: root_cause.into(),
            recommendation: recommendation.into(),
            urgency: urgency.clamp(1, 10) as u8,
        }
    }
}

/// External analysis of an alert.
#[async_trait]
pub trait InsightAnalyzer: Send + Sync {
    async fn analyze(&self, request: &InsightRequest) -> InsightResult<Insight>;

    fn name(&self) -> &'static str;
}
