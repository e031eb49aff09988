//! Record sinks.
//!
//! Everything the engine produces leaves through a [`RecordSink`]. The
//! publisher is the only caller, so sinks never see concurrent writes of
//! the same record.

mod firestore;
mod jsonl;
mod memory;

pub use firestore::FirestoreSink;
pub use jsonl::JsonlSink;
pub use memory::MemorySink;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use resto_models::{
    Alert, EmotionSnapshot, RealtimeMetrics, SessionSentiment, StaffDailyScore, TableSummary,
};

use crate::error::{EngineError, EngineResult};

/// One published record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Snapshot(EmotionSnapshot),
    Sentiment(SessionSentiment),
    Alert(Alert),
    StaffScore(StaffDailyScore),
    Table(TableSummary),
    Realtime(RealtimeMetrics),
}

impl Record {
    pub fn kind(&self) -> &'static str {
        match self {
            Record::Snapshot(_) => "snapshot",
            Record::Sentiment(_) => "sentiment",
            Record::Alert(_) => "alert",
            Record::StaffScore(_) => "staff_score",
            Record::Table(_) => "table",
            Record::Realtime(_) => "realtime",
        }
    }

    /// Boundary check applied before any write.
    pub fn validate(&self) -> EngineResult<()> {
        let result = match self {
            Record::Snapshot(r) => r.validate(),
            Record::Sentiment(r) => r.validate(),
            Record::Alert(r) => r.validate(),
            Record::StaffScore(r) => r.validate(),
            Record::Table(r) => r.validate(),
            Record::Realtime(r) => r.validate(),
        };
        result.map_err(|e| EngineError::invalid_record(format!("{}: {}", self.kind(), e)))
    }
}

/// Destination for published records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write(&self, record: &Record) -> EngineResult<()>;

    /// Flush buffered writes. Called once when publishing ends.
    async fn flush(&self) -> EngineResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}
