//! Daily staff performance records.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Emotion;

/// Badge shown next to a staff member on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Badge {
    #[serde(rename = "High Empathy")]
    HighEmpathy,
    #[serde(rename = "Consistent")]
    Consistent,
    #[serde(rename = "Needs Support")]
    NeedsSupport,
}

impl Badge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Badge::HighEmpathy => "High Empathy",
            Badge::Consistent => "Consistent",
            Badge::NeedsSupport => "Needs Support",
        }
    }

    /// Dashboard category paired with this badge.
    pub fn category(&self) -> PerformanceCategory {
        match self {
            Badge::HighEmpathy => PerformanceCategory::TopPerformer,
            Badge::Consistent => PerformanceCategory::MostPraised,
            Badge::NeedsSupport => PerformanceCategory::NeedsSupport,
        }
    }
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceCategory {
    TopPerformer,
    MostPraised,
    NeedsSupport,
}

impl PerformanceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceCategory::TopPerformer => "top_performer",
            PerformanceCategory::MostPraised => "most_praised",
            PerformanceCategory::NeedsSupport => "needs_support",
        }
    }
}

/// One staff member's score for one day. Recomputed from scratch, never accumulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StaffDailyScore {
    pub staff_id: String,
    pub date: NaiveDate,
    /// Overall score in [0, 100], one decimal
    pub score: f64,
    /// 1-based rank among the day's staff
    pub rank: u32,
    pub badge: Badge,
    pub category: PerformanceCategory,
    pub detection_count: u32,
    pub dominant_emotion: Emotion,
    pub tables_served: Vec<u32>,
    pub resolved_negative_trends: u32,
    /// Absent when no guest negative episode overlapped this staff member
    pub responsiveness: Option<f64>,
    pub friendliness: f64,
    pub consistency: f64,
}

impl StaffDailyScore {
    /// Document id, e.g. `Maria_Lopez_2026-10-19`.
    pub fn doc_id(&self) -> String {
        format!("{}_{}", self.staff_id.replace(' ', "_"), self.date)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.staff_id.trim().is_empty() {
            return Err("staff_id is empty".to_string());
        }
        if !self.score.is_finite() || !(0.0..=100.0).contains(&self.score) {
            return Err(format!("score out of range: {}", self.score));
        }
        if self.rank == 0 {
            return Err("rank must be >= 1".to_string());
        }
        if self.category != self.badge.category() {
            return Err(format!(
                "category {} does not match badge {}",
                self.category.as_str(),
                self.badge
            ));
        }
        let unit = [Some(self.friendliness), Some(self.consistency), self.responsiveness];
        for v in unit.into_iter().flatten() {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(format!("dimension out of range: {}", v));
            }
        }
        Ok(())
    }
}
