//! Service alerts raised by the anomaly rules.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::AlertId;

/// Root cause recorded when the insight service could not be reached.
pub const DEGRADED_ROOT_CAUSE: &str = "Unable to analyze";

/// Kind of anomalous pattern an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Staff and guest both hostile at the same table
    DisputeStaffCustomer,
    /// Two or more guests hostile at the same table
    DisputeCustomers,
    /// Negative guests while staff is also negative
    ServiceDissatisfaction,
    /// A guest stays negative (not mostly angry) for too long
    NegativeExperience,
    /// A guest is angry for too long, or strongly angry once
    GuestAngry,
    /// Several guests at a table trending down
    DeterioratingMood,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::DisputeStaffCustomer => "dispute_staff_customer",
            AlertType::DisputeCustomers => "dispute_customers",
            AlertType::ServiceDissatisfaction => "service_dissatisfaction",
            AlertType::NegativeExperience => "negative_experience",
            AlertType::GuestAngry => "guest_angry",
            AlertType::DeterioratingMood => "deteriorating_mood",
        }
    }

    /// Human label used in alert titles.
    pub fn label(&self) -> &'static str {
        match self {
            AlertType::DisputeStaffCustomer => "Staff-Customer Dispute",
            AlertType::DisputeCustomers => "Guest Dispute",
            AlertType::ServiceDissatisfaction => "Service Issue",
            AlertType::NegativeExperience => "Negative Guest Experience",
            AlertType::GuestAngry => "Angry Guest",
            AlertType::DeterioratingMood => "Deteriorating Mood",
        }
    }

    /// Title for an alert of this type at `table_number`, e.g. `Table 05: Guest Dispute`.
    pub fn title(&self, table_number: u32) -> String {
        format!("Table {:02}: {}", table_number, self.label())
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Urgent,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Urgent => "urgent",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service alert.
///
/// Core fields never change after creation. Only the insight fields are
/// filled in before publishing, and only an external actor sets the
/// resolution fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Alert {
    pub id: AlertId,
    pub table_number: u32,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub root_cause: Option<String>,
    pub ai_recommendation: Option<String>,
    /// Insight-service urgency in [1, 10]
    pub urgency_score: Option<u8>,
    pub is_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Create an unenriched, unresolved alert with the standard title.
    pub fn new(
        table_number: u32,
        alert_type: AlertType,
        severity: Severity,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AlertId::new(),
            table_number,
            alert_type,
            severity,
            title: alert_type.title(table_number),
            description: description.into(),
            root_cause: None,
            ai_recommendation: None,
            urgency_score: None,
            is_resolved: false,
            resolved_at: None,
            resolved_by: None,
            created_at,
        }
    }

    /// Attach insight-service output. Urgency is clamped to [1, 10].
    pub fn enrich(&mut self, root_cause: String, recommendation: String, urgency: i64) {
        self.root_cause = Some(root_cause);
        self.ai_recommendation = Some(recommendation);
        self.urgency_score = Some(urgency.clamp(1, 10) as u8);
    }

    /// Mark the alert as published without a usable analysis.
    pub fn degrade(&mut self) {
        self.root_cause = Some(DEGRADED_ROOT_CAUSE.to_string());
        self.ai_recommendation = None;
        self.urgency_score = None;
    }

    pub fn is_enriched(&self) -> bool {
        self.ai_recommendation.is_some()
    }

    pub fn is_degraded(&self) -> bool {
        self.root_cause.as_deref() == Some(DEGRADED_ROOT_CAUSE)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.table_number == 0 {
            return Err("table_number must be >= 1".to_string());
        }
        if self.title.trim().is_empty() {
            return Err("alert title is empty".to_string());
        }
        if self.description.trim().is_empty() {
            return Err("alert description is empty".to_string());
        }
        if let Some(u) = self.urgency_score {
            if !(1..=10).contains(&u) {
                return Err(format!("urgency_score out of range: {}", u));
            }
        }
        if !self.is_resolved && (self.resolved_at.is_some() || self.resolved_by.is_some()) {
            return Err("unresolved alert carries resolution fields".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert() -> Alert {
        Alert::new(
            5,
            AlertType::DisputeStaffCustomer,
            Severity::Urgent,
            "Both staff and customer showing anger. Immediate intervention needed.",
            Utc::now(),
        )
    }

    #[test]
    fn test_title_format() {
        assert_eq!(alert().title, "Table 05: Staff-Customer Dispute");
        assert_eq!(AlertType::DisputeCustomers.title(12), "Table 12: Guest Dispute");
    }

    #[test]
    fn test_enrich_clamps_urgency() {
        let mut a = alert();
        a.enrich("cause".into(), "do this".into(), 42);
        assert_eq!(a.urgency_score, Some(10));
        a.enrich("cause".into(), "do this".into(), -3);
        assert_eq!(a.urgency_score, Some(1));
        assert!(a.is_enriched());
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_degrade_keeps_core_fields() {
        let mut a = alert();
        let before = a.clone();
        a.degrade();
        assert!(a.is_degraded());
        assert_eq!(a.alert_type, before.alert_type);
        assert_eq!(a.severity, before.severity);
        assert_eq!(a.title, before.title);
        assert_eq!(a.description, before.description);
        assert_eq!(a.ai_recommendation, None);
    }

    #[test]
    fn test_serde_field_values() {
        let json = serde_json::to_value(alert()).unwrap();
        assert_eq!(json["alert_type"], "dispute_staff_customer");
        assert_eq!(json["severity"], "urgent");
        assert_eq!(json["is_resolved"], false);
        assert!(json["resolved_at"].is_null());
    }
}
