//! Per-observation and per-session emotion records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{BoundingBox, Emotion, PersonType, SessionId, SnapshotId, TrackId, Trend};

/// One timestamped emotion observation for one tracked person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EmotionSnapshot {
    pub id: SnapshotId,
    pub session_id: SessionId,
    pub track_id: TrackId,
    /// Stable display id, e.g. `guest_3`
    pub person_id: String,
    pub person_type: PersonType,
    /// Staff name or `Guest N`
    pub person_name: String,
    /// Enrolled staff identity, if recognized
    pub staff_id: Option<String>,
    pub emotion: Emotion,
    /// Classifier confidence in [0, 1]
    pub confidence: f64,
    pub bounding_box: BoundingBox,
    pub table_number: u32,
    pub captured_at: DateTime<Utc>,
}

impl EmotionSnapshot {
    pub fn validate(&self) -> Result<(), String> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence out of range: {}", self.confidence));
        }
        if !self.bounding_box.is_valid() {
            return Err(format!("invalid bounding box: {:?}", self.bounding_box));
        }
        if self.person_id.is_empty() {
            return Err("person_id is empty".to_string());
        }
        if self.table_number == 0 {
            return Err("table_number must be >= 1".to_string());
        }
        if self.person_type == PersonType::Staff && self.staff_id.is_none() {
            return Err("staff snapshot without staff_id".to_string());
        }
        Ok(())
    }
}

/// Rolling or final sentiment aggregate of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SessionSentiment {
    pub session_id: SessionId,
    pub track_id: TrackId,
    pub person_id: String,
    pub person_type: PersonType,
    pub staff_id: Option<String>,
    pub table_number: u32,
    /// Mean happiness over the trailing window, in [0, 100]
    pub avg_happiness: f64,
    pub dominant_emotion: Emotion,
    pub emotion_trend: Trend,
    pub snapshot_count: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// True once the session is closed and the aggregates are frozen
    pub is_final: bool,
}

impl SessionSentiment {
    pub fn validate(&self) -> Result<(), String> {
        if !self.avg_happiness.is_finite() || !(0.0..=100.0).contains(&self.avg_happiness) {
            return Err(format!("avg_happiness out of range: {}", self.avg_happiness));
        }
        if self.snapshot_count == 0 {
            return Err("session sentiment without observations".to_string());
        }
        if self.is_final && self.ended_at.is_none() {
            return Err("final session sentiment without ended_at".to_string());
        }
        if let Some(end) = self.ended_at {
            if end < self.started_at {
                return Err("ended_at precedes started_at".to_string());
            }
        }
        Ok(())
    }
}
