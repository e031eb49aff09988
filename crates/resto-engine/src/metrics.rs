//! Engine metrics.

use metrics::{counter, gauge, histogram};

/// Metric name constants.
pub mod names {
    pub const FRAMES_TOTAL: &str = "resto_frames_total";
    pub const FRAME_DURATION_SECONDS: &str = "resto_frame_duration_seconds";
    pub const SNAPSHOTS_TOTAL: &str = "resto_snapshots_total";
    pub const SESSIONS_OPEN: &str = "resto_sessions_open";
    pub const ALERTS_TOTAL: &str = "resto_alerts_total";
    pub const ESCALATIONS_TOTAL: &str = "resto_escalations_total";
    pub const RECORDS_PUBLISHED_TOTAL: &str = "resto_records_published_total";
    pub const RECORDS_DROPPED_TOTAL: &str = "resto_records_dropped_total";
}

pub fn record_frame(duration_secs: f64) {
    counter!(names::FRAMES_TOTAL).increment(1);
    histogram!(names::FRAME_DURATION_SECONDS).record(duration_secs);
}

pub fn record_snapshot(person_type: &str) {
    counter!(names::SNAPSHOTS_TOTAL, "person_type" => person_type.to_string()).increment(1);
}

pub fn set_sessions_open(count: usize) {
    gauge!(names::SESSIONS_OPEN).set(count as f64);
}

pub fn record_alert(alert_type: &str, severity: &str) {
    counter!(
        names::ALERTS_TOTAL,
        "alert_type" => alert_type.to_string(),
        "severity" => severity.to_string()
    )
    .increment(1);
}

/// Outcome is one of `enriched`, `degraded`, `unenriched`, `cancelled`.
pub fn record_escalation(outcome: &str) {
    counter!(names::ESCALATIONS_TOTAL, "outcome" => outcome.to_string()).increment(1);
}

pub fn record_published(kind: &str) {
    counter!(names::RECORDS_PUBLISHED_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// Reason is `invalid` or `write_failed`.
pub fn record_dropped(kind: &str, reason: &str) {
    counter!(
        names::RECORDS_DROPPED_TOTAL,
        "kind" => kind.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}
