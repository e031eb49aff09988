//! Typed repository for RestoInsight records.
//!
//! Writes are single attempts; callers own the retry policy. Snapshot and
//! alert documents are created once, everything else is upserted.

use std::collections::HashMap;

use tracing::debug;

use resto_models::{
    Alert, AlertId, AlertType, BoundingBox, EmotionSnapshot, RealtimeMetrics, SentimentSummary,
    SessionSentiment, Severity, StaffDailyScore, TableSummary,
};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_document_written;
use crate::types::{Document, FromFirestoreValue, ToFirestoreValue, Value};

/// Collection names shared with the dashboards.
pub mod collections {
    pub const EMOTION_SNAPSHOTS: &str = "emotion_snapshots";
    pub const SESSION_SENTIMENTS: &str = "session_sentiments";
    pub const ALERTS: &str = "alerts";
    pub const STAFF_PERFORMANCE: &str = "staff_performance";
    pub const TABLES: &str = "tables";
    pub const REALTIME_METRICS: &str = "realtime_metrics";

    /// The single realtime summary document.
    pub const REALTIME_DOC: &str = "current";
}

/// Repository over the RestoInsight collections.
#[derive(Clone)]
pub struct InsightRepository {
    client: FirestoreClient,
}

impl InsightRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &FirestoreClient {
        &self.client
    }

    /// Create a snapshot document. A replayed create is a no-op.
    pub async fn put_snapshot(&self, snapshot: &EmotionSnapshot) -> FirestoreResult<()> {
        let result = self
            .client
            .create_document(
                collections::EMOTION_SNAPSHOTS,
                snapshot.id.as_str(),
                snapshot_to_fields(snapshot),
            )
            .await;
        created(result)?;
        record_document_written(collections::EMOTION_SNAPSHOTS);
        Ok(())
    }

    /// Upsert the sentiment document of a session.
    pub async fn put_sentiment(&self, sentiment: &SessionSentiment) -> FirestoreResult<()> {
        self.client
            .set_document(
                collections::SESSION_SENTIMENTS,
                sentiment.session_id.as_str(),
                sentiment_to_fields(sentiment),
                None,
            )
            .await?;
        record_document_written(collections::SESSION_SENTIMENTS);
        Ok(())
    }

    /// Create an alert. Alerts are never patched by the engine, so
    /// resolution fields written by operators are left alone.
    pub async fn create_alert(&self, alert: &Alert) -> FirestoreResult<()> {
        let result = self
            .client
            .create_document(collections::ALERTS, alert.id.as_str(), alert_to_fields(alert))
            .await;
        created(result)?;
        record_document_written(collections::ALERTS);
        debug!(alert_id = %alert.id, alert_type = alert.alert_type.as_str(), "Alert stored");
        Ok(())
    }

    pub async fn get_alert(&self, id: &AlertId) -> FirestoreResult<Option<Alert>> {
        match self.client.get_document(collections::ALERTS, id.as_str()).await? {
            Some(doc) => Ok(Some(document_to_alert(&doc, id)?)),
            None => Ok(None),
        }
    }

    /// Replace the day's score document for one staff member.
    pub async fn put_staff_score(&self, score: &StaffDailyScore) -> FirestoreResult<()> {
        self.client
            .set_document(
                collections::STAFF_PERFORMANCE,
                &score.doc_id(),
                staff_score_to_fields(score),
                None,
            )
            .await?;
        record_document_written(collections::STAFF_PERFORMANCE);
        Ok(())
    }

    /// Merge a table summary into `tables/table_NN`.
    pub async fn put_table(&self, table: &TableSummary) -> FirestoreResult<()> {
        let fields = table_to_fields(table);
        let mask = field_mask(&fields);
        self.client
            .set_document(collections::TABLES, &table.doc_id(), fields, Some(mask))
            .await?;
        record_document_written(collections::TABLES);
        Ok(())
    }

    /// Merge the rolling summary into `realtime_metrics/current`.
    pub async fn put_realtime(&self, metrics: &RealtimeMetrics) -> FirestoreResult<()> {
        let fields = realtime_to_fields(metrics);
        let mask = field_mask(&fields);
        self.client
            .set_document(
                collections::REALTIME_METRICS,
                collections::REALTIME_DOC,
                fields,
                Some(mask),
            )
            .await?;
        record_document_written(collections::REALTIME_METRICS);
        Ok(())
    }
}

/// A create that already landed on an earlier attempt counts as done.
fn created(result: FirestoreResult<Document>) -> FirestoreResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(e),
    }
}

fn field_mask(fields: &HashMap<String, Value>) -> Vec<String> {
    let mut mask: Vec<String> = fields.keys().cloned().collect();
    mask.sort();
    mask
}

// =============================================================================
// Field conversion
// =============================================================================

fn bbox_to_value(bbox: &BoundingBox) -> Value {
    let mut fields = HashMap::new();
    fields.insert("x".to_string(), bbox.x.to_firestore_value());
    fields.insert("y".to_string(), bbox.y.to_firestore_value());
    fields.insert("w".to_string(), bbox.width.to_firestore_value());
    fields.insert("h".to_string(), bbox.height.to_firestore_value());
    Value::map(fields)
}

fn summary_to_value(summary: Option<&SentimentSummary>) -> Value {
    let Some(summary) = summary else {
        return Value::null();
    };
    let mut fields = HashMap::new();
    fields.insert("avg_happiness".to_string(), summary.avg_happiness.to_firestore_value());
    fields.insert(
        "dominant_emotion".to_string(),
        summary.dominant_emotion.as_str().to_firestore_value(),
    );
    fields.insert("trend".to_string(), summary.trend.as_str().to_firestore_value());
    Value::map(fields)
}

pub fn snapshot_to_fields(s: &EmotionSnapshot) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("id".to_string(), s.id.as_str().to_firestore_value());
    fields.insert("session_id".to_string(), s.session_id.as_str().to_firestore_value());
    fields.insert("track_id".to_string(), s.track_id.get().to_firestore_value());
    fields.insert("person_id".to_string(), s.person_id.to_firestore_value());
    fields.insert("person_type".to_string(), s.person_type.as_str().to_firestore_value());
    fields.insert("person_name".to_string(), s.person_name.to_firestore_value());
    fields.insert("staff_id".to_string(), s.staff_id.to_firestore_value());
    fields.insert("emotion".to_string(), s.emotion.as_str().to_firestore_value());
    fields.insert("confidence".to_string(), s.confidence.to_firestore_value());
    fields.insert("bounding_box".to_string(), bbox_to_value(&s.bounding_box));
    fields.insert("table_number".to_string(), s.table_number.to_firestore_value());
    fields.insert("captured_at".to_string(), s.captured_at.to_firestore_value());
    fields
}

pub fn sentiment_to_fields(s: &SessionSentiment) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("session_id".to_string(), s.session_id.as_str().to_firestore_value());
    fields.insert("track_id".to_string(), s.track_id.get().to_firestore_value());
    fields.insert("person_id".to_string(), s.person_id.to_firestore_value());
    fields.insert("person_type".to_string(), s.person_type.as_str().to_firestore_value());
    fields.insert("staff_id".to_string(), s.staff_id.to_firestore_value());
    fields.insert("table_number".to_string(), s.table_number.to_firestore_value());
    fields.insert("avg_happiness".to_string(), s.avg_happiness.to_firestore_value());
    fields.insert(
        "dominant_emotion".to_string(),
        s.dominant_emotion.as_str().to_firestore_value(),
    );
    fields.insert("emotion_trend".to_string(), s.emotion_trend.as_str().to_firestore_value());
    fields.insert("snapshot_count".to_string(), s.snapshot_count.to_firestore_value());
    fields.insert("started_at".to_string(), s.started_at.to_firestore_value());
    fields.insert("ended_at".to_string(), s.ended_at.to_firestore_value());
    fields.insert("is_final".to_string(), s.is_final.to_firestore_value());
    fields
}

pub fn alert_to_fields(a: &Alert) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("id".to_string(), a.id.as_str().to_firestore_value());
    fields.insert("table_number".to_string(), a.table_number.to_firestore_value());
    fields.insert("alert_type".to_string(), a.alert_type.as_str().to_firestore_value());
    fields.insert("severity".to_string(), a.severity.as_str().to_firestore_value());
    fields.insert("title".to_string(), a.title.to_firestore_value());
    fields.insert("description".to_string(), a.description.to_firestore_value());
    fields.insert("root_cause".to_string(), a.root_cause.to_firestore_value());
    fields.insert("ai_recommendation".to_string(), a.ai_recommendation.to_firestore_value());
    fields.insert("urgency_score".to_string(), a.urgency_score.to_firestore_value());
    fields.insert("is_resolved".to_string(), a.is_resolved.to_firestore_value());
    fields.insert("resolved_at".to_string(), a.resolved_at.to_firestore_value());
    fields.insert("resolved_by".to_string(), a.resolved_by.to_firestore_value());
    fields.insert("created_at".to_string(), a.created_at.to_firestore_value());
    fields
}

fn document_to_alert(doc: &Document, id: &AlertId) -> FirestoreResult<Alert> {
    let fields = doc
        .fields
        .as_ref()
        .ok_or_else(|| FirestoreError::InvalidResponse("Document has no fields".to_string()))?;

    let get_string = |key: &str| fields.get(key).and_then(String::from_firestore_value);

    let alert_type = get_string("alert_type")
        .and_then(|s| parse_alert_type(&s))
        .ok_or_else(|| FirestoreError::InvalidResponse(format!("alert {} has no valid type", id)))?;
    let severity = match get_string("severity").as_deref() {
        Some("urgent") => Severity::Urgent,
        Some("warning") => Severity::Warning,
        _ => Severity::Info,
    };
    let created_at = doc
        .get("created_at")
        .ok_or_else(|| FirestoreError::InvalidResponse(format!("alert {} has no created_at", id)))?;

    Ok(Alert {
        id: id.clone(),
        table_number: doc.get::<u32>("table_number").unwrap_or(0),
        alert_type,
        severity,
        title: get_string("title").unwrap_or_default(),
        description: get_string("description").unwrap_or_default(),
        root_cause: get_string("root_cause"),
        ai_recommendation: get_string("ai_recommendation"),
        urgency_score: doc
            .get::<u32>("urgency_score")
            .and_then(|u| u8::try_from(u).ok()),
        is_resolved: doc.get::<bool>("is_resolved").unwrap_or(false),
        resolved_at: doc.get("resolved_at"),
        resolved_by: get_string("resolved_by"),
        created_at,
    })
}

fn parse_alert_type(s: &str) -> Option<AlertType> {
    [
        AlertType::DisputeStaffCustomer,
        AlertType::DisputeCustomers,
        AlertType::ServiceDissatisfaction,
        AlertType::NegativeExperience,
        AlertType::GuestAngry,
        AlertType::DeterioratingMood,
    ]
    .into_iter()
    .find(|t| t.as_str() == s)
}

pub fn staff_score_to_fields(s: &StaffDailyScore) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("staff_id".to_string(), s.staff_id.to_firestore_value());
    fields.insert("date".to_string(), s.date.to_firestore_value());
    fields.insert("score".to_string(), s.score.to_firestore_value());
    fields.insert("rank".to_string(), s.rank.to_firestore_value());
    fields.insert("badge".to_string(), s.badge.as_str().to_firestore_value());
    fields.insert("category".to_string(), s.category.as_str().to_firestore_value());
    fields.insert("detection_count".to_string(), s.detection_count.to_firestore_value());
    fields.insert(
        "dominant_emotion".to_string(),
        s.dominant_emotion.as_str().to_firestore_value(),
    );
    fields.insert("tables_served".to_string(), s.tables_served.to_firestore_value());
    fields.insert(
        "resolved_negative_trends".to_string(),
        s.resolved_negative_trends.to_firestore_value(),
    );
    fields.insert("responsiveness".to_string(), s.responsiveness.to_firestore_value());
    fields.insert("friendliness".to_string(), s.friendliness.to_firestore_value());
    fields.insert("consistency".to_string(), s.consistency.to_firestore_value());
    fields
}

pub fn table_to_fields(t: &TableSummary) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("table_number".to_string(), t.table_number.to_firestore_value());
    fields.insert("status".to_string(), t.status.as_str().to_firestore_value());
    fields.insert("guests".to_string(), t.guests.to_firestore_value());
    fields.insert("staff".to_string(), t.staff.to_firestore_value());
    fields.insert("guest_count".to_string(), t.guest_count.to_firestore_value());
    fields.insert("start_time".to_string(), t.start_time.to_firestore_value());
    fields.insert("end_time".to_string(), t.end_time.to_firestore_value());
    fields.insert(
        "guest_sentiment".to_string(),
        summary_to_value(t.guest_sentiment.as_ref()),
    );
    fields.insert(
        "staff_sentiment".to_string(),
        summary_to_value(t.staff_sentiment.as_ref()),
    );
    fields
}

pub fn realtime_to_fields(m: &RealtimeMetrics) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("guests_inside".to_string(), m.guests_inside.to_firestore_value());
    fields.insert("total_walkins".to_string(), m.total_walkins.to_firestore_value());
    fields.insert("avg_table_time".to_string(), m.avg_table_time.to_firestore_value());
    fields.insert("service_score".to_string(), m.service_score.to_firestore_value());
    fields.insert("happy_pct".to_string(), m.happy_pct.to_firestore_value());
    fields.insert("neutral_pct".to_string(), m.neutral_pct.to_firestore_value());
    fields.insert("confused_pct".to_string(), m.confused_pct.to_firestore_value());
    fields.insert("angry_pct".to_string(), m.angry_pct.to_firestore_value());
    fields.insert("current_vibe".to_string(), m.current_vibe.to_firestore_value());
    fields.insert("updated_at".to_string(), m.updated_at.to_firestore_value());
    fields
}
