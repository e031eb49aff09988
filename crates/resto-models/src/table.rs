//! Per-table visit summaries.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Emotion, Trend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum TableStatus {
    Engaged,
    Free,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Engaged => "Engaged",
            TableStatus::Free => "Free",
        }
    }
}

/// Aggregate sentiment of one party (guests or staff) at a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SentimentSummary {
    pub avg_happiness: f64,
    pub dominant_emotion: Emotion,
    pub trend: Trend,
}

/// One visit to a table, from the first tracked person to the table change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableSummary {
    pub table_number: u32,
    pub status: TableStatus,
    /// Guest person ids seen at the table
    pub guests: Vec<String>,
    /// Staff names seen at the table
    pub staff: Vec<String>,
    pub guest_count: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub guest_sentiment: Option<SentimentSummary>,
    pub staff_sentiment: Option<SentimentSummary>,
}

impl TableSummary {
    /// Document id, e.g. `table_03`.
    pub fn doc_id(&self) -> String {
        format!("table_{:02}", self.table_number)
    }

    /// Visit length in minutes, if the table has been released.
    pub fn duration_minutes(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds().max(0) as f64 / 60_000.0)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.table_number == 0 {
            return Err("table_number must be >= 1".to_string());
        }
        if self.guest_count as usize != self.guests.len() {
            return Err("guest_count does not match guests".to_string());
        }
        if self.status == TableStatus::Free && self.end_time.is_none() {
            return Err("free table without end_time".to_string());
        }
        for s in [&self.guest_sentiment, &self.staff_sentiment].into_iter().flatten() {
            if !(0.0..=100.0).contains(&s.avg_happiness) {
                return Err(format!("avg_happiness out of range: {}", s.avg_happiness));
            }
        }
        Ok(())
    }
}
