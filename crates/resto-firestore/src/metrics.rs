//! Firestore request metrics.

use metrics::{counter, histogram};

/// Metric name constants.
pub mod names {
    /// Requests by operation and HTTP status.
    pub const REQUESTS_TOTAL: &str = "resto_firestore_requests_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "resto_firestore_latency_seconds";

    /// Documents written by collection.
    pub const DOCUMENTS_WRITTEN_TOTAL: &str = "resto_firestore_documents_written_total";
}

/// Record a completed request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(names::LATENCY_SECONDS, "operation" => operation.to_string())
        .record(latency_ms / 1000.0);
}

pub fn record_document_written(collection: &str) {
    counter!(names::DOCUMENTS_WRITTEN_TOTAL, "collection" => collection.to_string()).increment(1);
}
