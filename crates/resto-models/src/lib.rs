//! Shared data models for the RestoInsight engine.
//!
//! This crate provides Serde-serializable types for:
//! - Emotion labels and person classification
//! - Bounding boxes and identifiers
//! - Published records (snapshots, sentiments, alerts, staff scores,
//!   table summaries, realtime metrics) with boundary validation

pub mod alert;
pub mod bbox;
pub mod emotion;
pub mod ids;
pub mod realtime;
pub mod snapshot;
pub mod staff;
pub mod table;

pub use alert::{Alert, AlertType, Severity, DEGRADED_ROOT_CAUSE};
pub use bbox::BoundingBox;
pub use emotion::{Emotion, PersonType, Trend, UnknownEmotion};
pub use ids::{AlertId, SessionId, SnapshotId, TrackId};
pub use realtime::RealtimeMetrics;
pub use snapshot::{EmotionSnapshot, SessionSentiment};
pub use staff::{Badge, PerformanceCategory, StaffDailyScore};
pub use table::{SentimentSummary, TableStatus, TableSummary};
