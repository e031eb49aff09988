//! RestoInsight engine.
//!
//! This crate provides:
//! - Per-track sentiment sessions
//! - Anomaly rules with per-table deduplication
//! - Background alert escalation to the insight service
//! - Daily staff performance scoring and realtime dashboard metrics
//! - Record sinks (Firestore, JSON lines, memory) behind a retrying publisher
//! - The frame pipeline tying them together, with graceful shutdown

pub mod anomaly;
pub mod config;
pub mod error;
pub mod escalator;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod publisher;
pub mod realtime;
pub mod retry;
pub mod scoring;
pub mod session;
pub mod sink;
pub mod tables;

pub use anomaly::{AnomalyConfig, AnomalyDetector, RaisedAlert};
pub use config::{EngineConfig, OutputKind};
pub use error::{EngineError, EngineResult};
pub use escalator::{EscalationConfig, EscalationJob, EscalationReport, Escalator};
pub use logging::RunLogger;
pub use pipeline::{Pipeline, RunReport, ShutdownHandle};
pub use publisher::{PublishReport, Publisher, PublisherConfig, PublisherHandle};
pub use realtime::RealtimeAggregator;
pub use scoring::{PerformanceScorer, ScoringConfig};
pub use session::{Observation, Session, SessionConfig, SessionManager};
pub use sink::{FirestoreSink, JsonlSink, MemorySink, Record, RecordSink};
pub use tables::TableTracker;
