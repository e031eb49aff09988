//! Rolling dashboard summary.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Single rolling summary shown on the live dashboard. Replaced wholesale on each refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RealtimeMetrics {
    /// Guests currently tracked
    pub guests_inside: u32,
    /// Distinct guests seen since start
    pub total_walkins: u32,
    /// Mean closed-table duration in minutes
    pub avg_table_time: f64,
    /// Share of positive guest observations, 0-100
    pub service_score: f64,
    pub happy_pct: f64,
    pub neutral_pct: f64,
    /// Fear and surprise
    pub confused_pct: f64,
    /// Angry, sad and disgust
    pub angry_pct: f64,
    /// Mean happiness of live guest sessions, 0-100
    pub current_vibe: f64,
    pub updated_at: DateTime<Utc>,
}

impl RealtimeMetrics {
    /// Metrics before any guest has been observed.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            guests_inside: 0,
            total_walkins: 0,
            avg_table_time: 0.0,
            service_score: 0.0,
            happy_pct: 0.0,
            neutral_pct: 0.0,
            confused_pct: 0.0,
            angry_pct: 0.0,
            current_vibe: 0.0,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let pcts = [
            ("service_score", self.service_score),
            ("happy_pct", self.happy_pct),
            ("neutral_pct", self.neutral_pct),
            ("confused_pct", self.confused_pct),
            ("angry_pct", self.angry_pct),
            ("current_vibe", self.current_vibe),
        ];
        for (name, v) in pcts {
            if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                return Err(format!("{} out of range: {}", name, v));
            }
        }
        if !self.avg_table_time.is_finite() || self.avg_table_time < 0.0 {
            return Err(format!("avg_table_time out of range: {}", self.avg_table_time));
        }
        if self.guests_inside > self.total_walkins {
            return Err("guests_inside exceeds total_walkins".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_valid() {
        assert!(RealtimeMetrics::empty(Utc::now()).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_pct() {
        let mut m = RealtimeMetrics::empty(Utc::now());
        m.angry_pct = 120.0;
        assert!(m.validate().is_err());
    }
}
