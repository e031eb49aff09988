//! Daily staff performance scoring.
//!
//! Scores are a pure function of the day's closed sessions: running the
//! scorer twice over the same sessions yields identical records, so the
//! pipeline simply recomputes and overwrites on every tick.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};

use resto_models::{Badge, Emotion, StaffDailyScore};

use crate::session::{round1, Observation, Session};

/// Scoring weights and horizons.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Staff response later than this scores zero for the episode
    pub response_horizon: Duration,
    pub responsiveness_weight: f64,
    pub friendliness_weight: f64,
    pub consistency_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            response_horizon: Duration::from_secs(120),
            responsiveness_weight: 0.4,
            friendliness_weight: 0.35,
            consistency_weight: 0.25,
        }
    }
}

/// Start of a guest's negative stretch.
#[derive(Debug, Clone, Copy)]
struct Episode {
    table_number: u32,
    at: DateTime<Utc>,
}

/// Computes [`StaffDailyScore`] records.
#[derive(Debug, Clone, Default)]
pub struct PerformanceScorer {
    config: ScoringConfig,
}

impl PerformanceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score and rank every staff member with observations on `date`.
    ///
    /// Sessions are attributed to the UTC date they started on.
    pub fn score_day(&self, date: NaiveDate, sessions: &[Session]) -> Vec<StaffDailyScore> {
        let day: Vec<&Session> = sessions
            .iter()
            .filter(|s| s.started_at.date_naive() == date)
            .collect();

        let episodes: Vec<Episode> = day
            .iter()
            .filter(|s| s.is_guest())
            .flat_map(|s| negative_episodes(&s.observations))
            .collect();

        let mut by_staff: BTreeMap<&str, Vec<&Session>> = BTreeMap::new();
        for session in day.iter().filter(|s| !s.is_guest()) {
            if let Some(staff_id) = session.staff_id.as_deref() {
                by_staff.entry(staff_id).or_default().push(session);
            }
        }

        let mut scores: Vec<StaffDailyScore> = by_staff
            .into_iter()
            .filter_map(|(staff_id, sessions)| self.score_staff(staff_id, date, &sessions, &episodes))
            .collect();

        scores.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.detection_count.cmp(&a.detection_count))
                .then(a.staff_id.cmp(&b.staff_id))
        });
        for (i, score) in scores.iter_mut().enumerate() {
            score.rank = i as u32 + 1;
        }
        scores
    }

    fn score_staff(
        &self,
        staff_id: &str,
        date: NaiveDate,
        sessions: &[&Session],
        episodes: &[Episode],
    ) -> Option<StaffDailyScore> {
        let mut observations: Vec<Observation> = sessions
            .iter()
            .flat_map(|s| s.observations.iter().copied())
            .collect();
        if observations.is_empty() {
            return None;
        }
        observations.sort_by_key(|o| o.captured_at);

        let tables: BTreeSet<u32> = observations.iter().map(|o| o.table_number).collect();

        // Responsiveness over the guest episodes at this staff member's tables.
        let horizon = self.config.response_horizon.as_secs_f64();
        let mut episode_scores = Vec::new();
        let mut resolved = 0u32;
        for episode in episodes.iter().filter(|e| tables.contains(&e.table_number)) {
            let response = observations.iter().find(|o| {
                o.table_number == episode.table_number
                    && o.captured_at >= episode.at
                    && o.emotion.is_positive()
            });
            let score = match response {
                Some(o) => {
                    let latency = (o.captured_at - episode.at).num_milliseconds() as f64 / 1000.0;
                    if latency <= horizon {
                        resolved += 1;
                    }
                    (1.0 - latency / horizon).max(0.0)
                }
                None => 0.0,
            };
            episode_scores.push(score);
        }
        let responsiveness = (!episode_scores.is_empty())
            .then(|| episode_scores.iter().sum::<f64>() / episode_scores.len() as f64);

        let positive = observations.iter().filter(|o| o.emotion.is_positive()).count();
        let friendliness = positive as f64 / observations.len() as f64;

        let session_happiness: Vec<f64> = sessions
            .iter()
            .filter(|s| !s.observations.is_empty())
            .map(|s| s.avg_happiness)
            .collect();
        let consistency = 1.0 / (1.0 + variance(&session_happiness) / 100.0);

        let c = &self.config;
        let mut weighted = c.friendliness_weight * friendliness + c.consistency_weight * consistency;
        let mut total_weight = c.friendliness_weight + c.consistency_weight;
        if let Some(r) = responsiveness {
            weighted += c.responsiveness_weight * r;
            total_weight += c.responsiveness_weight;
        }
        let ratio = if total_weight > 0.0 { weighted / total_weight } else { 0.0 };
        let score = round1(100.0 * ratio).clamp(0.0, 100.0);

        let badge = if score >= 75.0 && responsiveness.map_or(true, |r| r >= 0.5) {
            Badge::HighEmpathy
        } else if score >= 55.0 {
            Badge::Consistent
        } else {
            Badge::NeedsSupport
        };

        Some(StaffDailyScore {
            staff_id: staff_id.to_string(),
            date,
            score,
            rank: 0,
            badge,
            category: badge.category(),
            detection_count: observations.len() as u32,
            dominant_emotion: mode_by_label(&observations)?,
            tables_served: tables.into_iter().collect(),
            resolved_negative_trends: resolved,
            responsiveness,
            friendliness,
            consistency,
        })
    }
}

/// Negative observations that follow a non-negative one or open the session.
fn negative_episodes(observations: &[Observation]) -> Vec<Episode> {
    let mut episodes = Vec::new();
    let mut previous_negative = false;
    for o in observations {
        let negative = o.emotion.is_negative();
        if negative && !previous_negative {
            episodes.push(Episode {
                table_number: o.table_number,
                at: o.captured_at,
            });
        }
        previous_negative = negative;
    }
    episodes
}

/// Most frequent emotion; ties go to the earlier label.
fn mode_by_label(observations: &[Observation]) -> Option<Emotion> {
    let mut counts: BTreeMap<Emotion, usize> = BTreeMap::new();
    for o in observations {
        *counts.entry(o.emotion).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(emotion, _)| emotion)
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}
