//! Per-track sentiment sessions.
//!
//! A session lives exactly as long as its track. Every accepted observation
//! recomputes the rolling aggregates; closing freezes them.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use resto_models::{
    Emotion, PersonType, SentimentSummary, SessionId, SessionSentiment, TrackId, Trend,
};
use resto_vision::Track;

/// Session aggregation configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Trailing observations for the dominant emotion
    pub dominant_window: usize,
    /// Trailing observations for the happiness average
    pub happiness_window: usize,
    /// Upper bound on each half of the trend comparison
    pub trend_window: usize,
    /// Happiness points a trend must move to leave `stable`
    pub trend_threshold: f64,
    /// Publish a rolling sentiment every N observations
    pub sentiment_every: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dominant_window: 5,
            happiness_window: 30,
            trend_window: 4,
            trend_threshold: 12.0,
            sentiment_every: 5,
        }
    }
}

/// One emotion observation accepted into a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub emotion: Emotion,
    pub confidence: f64,
    /// Table the person was at when observed
    pub table_number: u32,
    pub captured_at: DateTime<Utc>,
}

/// Sentiment lifecycle of one track.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub track_id: TrackId,
    pub person_id: String,
    pub person_name: String,
    pub person_type: PersonType,
    pub staff_id: Option<String>,
    /// Table at which the session started
    pub table_number: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub observations: Vec<Observation>,
    pub avg_happiness: f64,
    /// `None` until the first observation
    pub dominant_emotion: Option<Emotion>,
    pub trend: Trend,
    pub is_final: bool,
}

impl Session {
    fn new(track: &Track, table_number: u32, started_at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            track_id: track.id,
            person_id: track.person_id(),
            person_name: track.display_name(),
            person_type: track.person_type,
            staff_id: track.staff_identity.clone(),
            table_number,
            started_at,
            ended_at: None,
            observations: Vec::new(),
            avg_happiness: 0.0,
            dominant_emotion: None,
            trend: Trend::Stable,
            is_final: false,
        }
    }

    pub fn last_observed_at(&self) -> Option<DateTime<Utc>> {
        self.observations.last().map(|o| o.captured_at)
    }

    pub fn is_guest(&self) -> bool {
        self.person_type == PersonType::Guest
    }

    /// Publishable aggregate; `None` before the first observation.
    pub fn sentiment(&self) -> Option<SessionSentiment> {
        let dominant_emotion = self.dominant_emotion?;
        Some(SessionSentiment {
            session_id: self.id.clone(),
            track_id: self.track_id,
            person_id: self.person_id.clone(),
            person_type: self.person_type,
            staff_id: self.staff_id.clone(),
            table_number: self.table_number,
            avg_happiness: self.avg_happiness,
            dominant_emotion,
            emotion_trend: self.trend,
            snapshot_count: self.observations.len() as u32,
            started_at: self.started_at,
            ended_at: self.ended_at,
            is_final: self.is_final,
        })
    }

    fn recompute(&mut self, config: &SessionConfig) {
        let n = self.observations.len();
        let dominant_from = n.saturating_sub(config.dominant_window.max(1));
        let happiness_from = n.saturating_sub(config.happiness_window.max(1));

        self.dominant_emotion = dominant_emotion(&self.observations[dominant_from..]);
        self.avg_happiness = average_happiness(&self.observations[happiness_from..]);
        self.trend = trend(
            &happiness_scores(&self.observations),
            config.trend_window,
            config.trend_threshold,
        );
    }
}

// =============================================================================
// Aggregates
// =============================================================================

/// Most frequent emotion; ties go to the label observed most recently.
pub fn dominant_emotion(observations: &[Observation]) -> Option<Emotion> {
    // emotion -> (count, index of last occurrence)
    let mut stats: HashMap<Emotion, (usize, usize)> = HashMap::new();
    for (i, o) in observations.iter().enumerate() {
        let entry = stats.entry(o.emotion).or_insert((0, i));
        entry.0 += 1;
        entry.1 = i;
    }
    stats
        .into_iter()
        .max_by_key(|(_, (count, last))| (*count, *last))
        .map(|(emotion, _)| emotion)
}

/// Mean happiness score, clamped to [0, 100] and rounded to one decimal.
pub fn average_happiness(observations: &[Observation]) -> f64 {
    if observations.is_empty() {
        return 0.0;
    }
    let sum: f64 = observations.iter().map(|o| o.emotion.happiness_score()).sum();
    round1((sum / observations.len() as f64).clamp(0.0, 100.0))
}

fn happiness_scores(observations: &[Observation]) -> Vec<f64> {
    observations.iter().map(|o| o.emotion.happiness_score()).collect()
}

/// Compare the last `w` scores with the `w` before them, `w = min(window, n / 2)`.
pub fn trend(scores: &[f64], window: usize, threshold: f64) -> Trend {
    let w = window.min(scores.len() / 2);
    if w == 0 {
        return Trend::Stable;
    }
    let n = scores.len();
    let recent = mean(&scores[n - w..]);
    let before = mean(&scores[n - 2 * w..n - w]);
    let delta = recent - before;
    if delta > threshold {
        Trend::Improving
    } else if delta < -threshold {
        Trend::Deteriorating
    } else {
        Trend::Stable
    }
}

/// Aggregate of time-ordered observations from several sessions.
pub fn summarize(observations: &[Observation], config: &SessionConfig) -> Option<SentimentSummary> {
    let dominant_emotion = dominant_emotion(observations)?;
    Some(SentimentSummary {
        avg_happiness: average_happiness(observations),
        dominant_emotion,
        trend: trend(
            &happiness_scores(observations),
            config.trend_window,
            config.trend_threshold,
        ),
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub(crate) fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

// =============================================================================
// Manager
// =============================================================================

/// Outcome of [`SessionManager::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    /// Added; `publish_sentiment` is set on every Nth observation.
    Accepted { publish_sentiment: bool },
    /// Older than the session's last observation.
    OutOfOrder,
    /// No open session for the track.
    UnknownTrack,
}

/// Owns open sessions and the closed sessions kept for scoring.
pub struct SessionManager {
    config: SessionConfig,
    open: HashMap<TrackId, Session>,
    closed: Vec<Session>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            open: HashMap::new(),
            closed: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start the session of a new track. Opening twice returns the existing session.
    pub fn open(&mut self, track: &Track, table_number: u32, started_at: DateTime<Utc>) -> &Session {
        self.open
            .entry(track.id)
            .or_insert_with(|| Session::new(track, table_number, started_at))
    }

    pub fn observe(&mut self, track_id: TrackId, observation: Observation) -> ObserveOutcome {
        let Some(session) = self.open.get_mut(&track_id) else {
            return ObserveOutcome::UnknownTrack;
        };
        if session
            .last_observed_at()
            .is_some_and(|last| observation.captured_at < last)
        {
            return ObserveOutcome::OutOfOrder;
        }

        session.observations.push(observation);
        session.recompute(&self.config);

        let every = self.config.sentiment_every.max(1) as usize;
        ObserveOutcome::Accepted {
            publish_sentiment: session.observations.len() % every == 0,
        }
    }

    /// Finalize a session and keep it for scoring.
    pub fn close(&mut self, track_id: TrackId, ended_at: DateTime<Utc>) -> Option<Session> {
        let mut session = self.open.remove(&track_id)?;
        let last = session.last_observed_at().unwrap_or(session.started_at);
        session.ended_at = Some(ended_at.max(last));
        session.is_final = true;
        self.closed.push(session.clone());
        Some(session)
    }

    /// Close every open session, oldest track first.
    pub fn flush(&mut self, ended_at: DateTime<Utc>) -> Vec<Session> {
        let mut ids: Vec<TrackId> = self.open.keys().copied().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| self.close(id, ended_at))
            .collect()
    }

    pub fn get(&self, track_id: TrackId) -> Option<&Session> {
        self.open.get(&track_id)
    }

    pub fn open_sessions(&self) -> impl Iterator<Item = &Session> {
        self.open.values()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn closed_sessions(&self) -> &[Session] {
        &self.closed
    }

    /// Drop closed sessions that started before `date`.
    pub fn prune_closed_before(&mut self, date: NaiveDate) {
        self.closed.retain(|s| s.started_at.date_naive() >= date);
    }

    /// Time-ordered observations of one person type at a table, open and closed sessions.
    pub fn observations_at_table(&self, table_number: u32, person_type: PersonType) -> Vec<Observation> {
        let mut observations: Vec<Observation> = self
            .open
            .values()
            .chain(self.closed.iter())
            .filter(|s| s.person_type == person_type)
            .flat_map(|s| s.observations.iter())
            .filter(|o| o.table_number == table_number)
            .copied()
            .collect();
        observations.sort_by_key(|o| o.captured_at);
        observations
    }

    pub fn table_summary(&self, table_number: u32, person_type: PersonType) -> Option<SentimentSummary> {
        summarize(
            &self.observations_at_table(table_number, person_type),
            &self.config,
        )
    }

    /// Happiness of open guest sessions that have observations.
    pub fn live_guest_happiness(&self) -> Vec<f64> {
        self.open
            .values()
            .filter(|s| s.is_guest() && !s.observations.is_empty())
            .map(|s| s.avg_happiness)
            .collect()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use resto_models::BoundingBox;
    use resto_vision::{FaceDetection, PersonTracker};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-19T18:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn guest_track() -> Track {
        let mut tracker = PersonTracker::default();
        let det = FaceDetection::guest(BoundingBox::new(0.0, 0.0, 80.0, 80.0), Emotion::Neutral, 0.9);
        let update = tracker.update(&[det], t0());
        tracker.get(update.assignments[0].track_id).unwrap().clone()
    }

    fn obs(emotion: Emotion, secs: i64) -> Observation {
        Observation {
            emotion,
            confidence: 0.8,
            table_number: 1,
            captured_at: t0() + Duration::seconds(secs),
        }
    }

    #[test]
    fn test_dominant_ties_go_to_most_recent() {
        let o = vec![obs(Emotion::Happy, 0), obs(Emotion::Sad, 1)];
        assert_eq!(dominant_emotion(&o), Some(Emotion::Sad));

        let o = vec![
            obs(Emotion::Sad, 0),
            obs(Emotion::Happy, 1),
            obs(Emotion::Happy, 2),
            obs(Emotion::Sad, 3),
        ];
        assert_eq!(dominant_emotion(&o), Some(Emotion::Sad));
        assert_eq!(dominant_emotion(&[]), None);
    }

    #[test]
    fn test_trend_needs_two_observations() {
        assert_eq!(trend(&[], 4, 12.0), Trend::Stable);
        assert_eq!(trend(&[100.0], 4, 12.0), Trend::Stable);
        assert_eq!(trend(&[0.0, 100.0], 4, 12.0), Trend::Improving);
        assert_eq!(trend(&[50.0, 55.0], 4, 12.0), Trend::Stable);
    }

    #[test]
    fn test_happy_then_sad_scenario() {
        let track = guest_track();
        let mut sessions = SessionManager::default();
        sessions.open(&track, 1, t0());

        let sequence = [
            Emotion::Neutral,
            Emotion::Neutral,
            Emotion::Happy,
            Emotion::Happy,
            Emotion::Happy,
            Emotion::Sad,
            Emotion::Sad,
            Emotion::Sad,
            Emotion::Sad,
            Emotion::Sad,
        ];
        let mut publishes = 0;
        for (i, emotion) in sequence.iter().enumerate() {
            let outcome = sessions.observe(track.id, obs(*emotion, i as i64 * 5));
            if outcome == (ObserveOutcome::Accepted { publish_sentiment: true }) {
                publishes += 1;
            }
            if i == 4 {
                assert_eq!(sessions.get(track.id).unwrap().dominant_emotion, Some(Emotion::Happy));
            }
        }

        let session = sessions.get(track.id).unwrap();
        assert_eq!(session.dominant_emotion, Some(Emotion::Sad));
        assert_eq!(session.trend, Trend::Deteriorating);
        assert!((0.0..=100.0).contains(&session.avg_happiness));
        assert_eq!(publishes, 2);
    }

    #[test]
    fn test_out_of_order_observation_is_dropped() {
        let track = guest_track();
        let mut sessions = SessionManager::default();
        sessions.open(&track, 1, t0());

        sessions.observe(track.id, obs(Emotion::Happy, 10));
        assert_eq!(sessions.observe(track.id, obs(Emotion::Sad, 5)), ObserveOutcome::OutOfOrder);
        assert_eq!(sessions.get(track.id).unwrap().observations.len(), 1);
        assert_eq!(
            sessions.observe(TrackId(99), obs(Emotion::Sad, 20)),
            ObserveOutcome::UnknownTrack
        );
    }

    #[test]
    fn test_close_freezes_and_keeps_session() {
        let track = guest_track();
        let mut sessions = SessionManager::default();
        sessions.open(&track, 1, t0());
        sessions.observe(track.id, obs(Emotion::Happy, 3));

        let closed = sessions.close(track.id, t0() + Duration::seconds(60)).unwrap();
        assert!(closed.is_final);
        let sentiment = closed.sentiment().unwrap();
        assert!(sentiment.validate().is_ok());
        assert_eq!(sentiment.avg_happiness, 100.0);

        assert!(sessions.get(track.id).is_none());
        assert_eq!(sessions.closed_sessions().len(), 1);
        assert_eq!(sessions.observe(track.id, obs(Emotion::Sad, 70)), ObserveOutcome::UnknownTrack);
    }

    #[test]
    fn test_session_without_observations_has_no_sentiment() {
        let track = guest_track();
        let mut sessions = SessionManager::default();
        sessions.open(&track, 1, t0());
        let flushed = sessions.flush(t0());
        assert_eq!(flushed.len(), 1);
        assert!(flushed[0].sentiment().is_none());
    }

    #[test]
    fn test_table_summary_spans_sessions() {
        let track = guest_track();
        let mut sessions = SessionManager::default();
        sessions.open(&track, 1, t0());
        sessions.observe(track.id, obs(Emotion::Happy, 0));
        sessions.observe(track.id, obs(Emotion::Neutral, 5));

        let summary = sessions.table_summary(1, PersonType::Guest).unwrap();
        assert_eq!(summary.avg_happiness, 75.0);
        assert_eq!(summary.dominant_emotion, Emotion::Neutral);
        assert!(sessions.table_summary(2, PersonType::Guest).is_none());
        assert!(sessions.table_summary(1, PersonType::Staff).is_none());
    }
}
