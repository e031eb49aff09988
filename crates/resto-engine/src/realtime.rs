//! Rolling dashboard metrics.

use chrono::{DateTime, Utc};

use resto_models::{Emotion, RealtimeMetrics};

use crate::session::round1;

/// Run-scoped counters behind [`RealtimeMetrics`]. Owned by the pipeline loop.
#[derive(Debug, Default)]
pub struct RealtimeAggregator {
    total_walkins: u32,
    /// Guest observation counts in `Emotion::ALL` order
    guest_counts: [u64; 7],
    table_minutes_sum: f64,
    tables_closed: u32,
}

impl RealtimeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_guest_opened(&mut self) {
        self.total_walkins += 1;
    }

    pub fn record_guest_observation(&mut self, emotion: Emotion) {
        self.guest_counts[emotion as usize] += 1;
    }

    pub fn record_table_closed(&mut self, minutes: f64) {
        if minutes.is_finite() && minutes >= 0.0 {
            self.table_minutes_sum += minutes;
            self.tables_closed += 1;
        }
    }

    pub fn total_walkins(&self) -> u32 {
        self.total_walkins
    }

    fn count(&self, emotion: Emotion) -> u64 {
        self.guest_counts[emotion as usize]
    }

    /// Build the current summary.
    ///
    /// `live_happiness` holds the rolling happiness of each live guest session.
    pub fn snapshot(&self, guests_inside: usize, live_happiness: &[f64], now: DateTime<Utc>) -> RealtimeMetrics {
        let total: u64 = self.guest_counts.iter().sum();
        let pct = |n: u64| {
            if total == 0 {
                0.0
            } else {
                round1(n as f64 * 100.0 / total as f64)
            }
        };

        let positive = self.count(Emotion::Happy) + self.count(Emotion::Surprise);
        let service_score = pct(positive);
        let current_vibe = if live_happiness.is_empty() {
            service_score
        } else {
            round1(live_happiness.iter().sum::<f64>() / live_happiness.len() as f64)
        };

        RealtimeMetrics {
            guests_inside: (guests_inside as u32).min(self.total_walkins),
            total_walkins: self.total_walkins,
            avg_table_time: if self.tables_closed == 0 {
                0.0
            } else {
                round1(self.table_minutes_sum / self.tables_closed as f64)
            },
            service_score,
            happy_pct: pct(self.count(Emotion::Happy)),
            neutral_pct: pct(self.count(Emotion::Neutral)),
            confused_pct: pct(self.count(Emotion::Fear) + self.count(Emotion::Surprise)),
            angry_pct: pct(
                self.count(Emotion::Angry) + self.count(Emotion::Sad) + self.count(Emotion::Disgust),
            ),
            current_vibe: current_vibe.clamp(0.0, 100.0),
            updated_at: now,
        }
    }
}
