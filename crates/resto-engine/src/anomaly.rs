//! Escalation rules over per-table emotion state.
//!
//! Every accepted observation updates the state of the table it was seen
//! at, then each rule is re-evaluated for that table. A rule that holds is
//! a *condition*; conditions go through per-(table, type) deduplication
//! before they become alerts.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use resto_models::{Alert, AlertType, Emotion, EmotionSnapshot, PersonType, Severity, TrackId, Trend};

/// Rule thresholds.
#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    /// How far back hostile observations count toward a dispute
    pub dispute_window: Duration,
    /// Minimum confidence for an observation to count toward any rule
    pub anomaly_confidence: f64,
    /// Length of a negative run that warrants an alert
    pub sustained_negative: Duration,
    /// Confidence of a single angry detection that warrants an alert
    pub strong_confidence: f64,
    /// Minimum time between two alerts of the same kind at the same table
    pub cooldown: Duration,
    /// Time a cleared condition must stay cleared before it can alert again
    pub rearm_delay: Duration,
    /// Snapshots attached to each alert
    pub window_size: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            dispute_window: Duration::from_secs(10),
            anomaly_confidence: 0.55,
            sustained_negative: Duration::from_secs(20),
            strong_confidence: 0.9,
            cooldown: Duration::from_secs(300),
            rearm_delay: Duration::from_secs(30),
            window_size: 10,
        }
    }
}

/// Alert plus the observations that support it.
#[derive(Debug, Clone)]
pub struct RaisedAlert {
    pub alert: Alert,
    /// Latest snapshots at the table, oldest first
    pub window: Vec<EmotionSnapshot>,
}

/// A guest's uninterrupted sequence of confident negative observations.
#[derive(Debug, Clone)]
struct NegativeRun {
    person_name: String,
    started_at: DateTime<Utc>,
    last_at: DateTime<Utc>,
    angry: u32,
    total: u32,
}

impl NegativeRun {
    fn duration(&self) -> chrono::Duration {
        self.last_at - self.started_at
    }

    fn is_angry_majority(&self) -> bool {
        self.angry * 2 > self.total
    }
}

/// Dedup state of one (table, type) pair.
#[derive(Debug, Clone, Default)]
struct DedupState {
    last_alert_at: Option<DateTime<Utc>>,
    /// Condition held at the latest evaluation
    active: bool,
    cleared_at: Option<DateTime<Utc>>,
}

impl DedupState {
    /// Feed one evaluation; true when an alert should be raised.
    fn observe(&mut self, present: bool, now: DateTime<Utc>, config: &AnomalyConfig) -> bool {
        if !present {
            if self.active {
                self.active = false;
                self.cleared_at = Some(now);
            }
            return false;
        }

        let raise = match self.last_alert_at {
            None => true,
            Some(last) if now - last >= span(config.cooldown) => true,
            Some(_) if self.active => false,
            Some(_) => self
                .cleared_at
                .is_some_and(|cleared| now - cleared >= span(config.rearm_delay)),
        };

        self.active = true;
        if raise {
            self.last_alert_at = Some(now);
        }
        raise
    }
}

#[derive(Debug, Default)]
struct TableState {
    /// Observations within the dispute window
    recent: VecDeque<EmotionSnapshot>,
    /// Last `window_size` snapshots
    window: VecDeque<EmotionSnapshot>,
    runs: HashMap<TrackId, NegativeRun>,
    trends: HashMap<TrackId, Trend>,
    dedup: HashMap<AlertType, DedupState>,
}

/// A rule that currently holds.
struct Condition {
    severity: Severity,
    description: String,
}

/// Per-table anomaly detector.
pub struct AnomalyDetector {
    config: AnomalyConfig,
    tables: BTreeMap<u32, TableState>,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self {
            config,
            tables: BTreeMap::new(),
        }
    }

    /// Update state with one snapshot and return the alerts it raises.
    ///
    /// `trend` is the observed person's current session trend.
    pub fn evaluate(&mut self, snapshot: &EmotionSnapshot, trend: Option<Trend>) -> Vec<RaisedAlert> {
        let now = snapshot.captured_at;
        let config = &self.config;
        let table = self.tables.entry(snapshot.table_number).or_default();

        table.recent.push_back(snapshot.clone());
        let horizon = now - span(config.dispute_window);
        while table.recent.front().is_some_and(|s| s.captured_at < horizon) {
            table.recent.pop_front();
        }
        table.window.push_back(snapshot.clone());
        while table.window.len() > config.window_size.max(1) {
            table.window.pop_front();
        }

        if snapshot.person_type == PersonType::Guest {
            update_run(table, snapshot, config);
            if let Some(trend) = trend {
                table.trends.insert(snapshot.track_id, trend);
            }
        }

        let conditions = evaluate_rules(table, config);

        let mut raised = Vec::new();
        for alert_type in RULE_ORDER {
            let condition = conditions.get(&alert_type);
            let fire = table
                .dedup
                .entry(alert_type)
                .or_default()
                .observe(condition.is_some(), now, config);
            if let (true, Some(condition)) = (fire, condition) {
                debug!(
                    table = snapshot.table_number,
                    alert_type = alert_type.as_str(),
                    severity = condition.severity.as_str(),
                    "Anomaly condition raised"
                );
                raised.push(RaisedAlert {
                    alert: Alert::new(
                        snapshot.table_number,
                        alert_type,
                        condition.severity,
                        condition.description.clone(),
                        now,
                    ),
                    window: table.window.iter().cloned().collect(),
                });
            }
        }
        raised
    }

    /// Drop a closed track's runs and trend so its conditions can clear.
    pub fn forget_track(&mut self, track_id: TrackId) {
        for table in self.tables.values_mut() {
            table.runs.remove(&track_id);
            table.trends.remove(&track_id);
        }
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(AnomalyConfig::default())
    }
}

const RULE_ORDER: [AlertType; 6] = [
    AlertType::DisputeStaffCustomer,
    AlertType::DisputeCustomers,
    AlertType::GuestAngry,
    AlertType::NegativeExperience,
    AlertType::ServiceDissatisfaction,
    AlertType::DeterioratingMood,
];

fn update_run(table: &mut TableState, snapshot: &EmotionSnapshot, config: &AnomalyConfig) {
    if !snapshot.emotion.is_negative() {
        table.runs.remove(&snapshot.track_id);
        return;
    }
    // Low-confidence negatives neither extend nor break a run.
    if snapshot.confidence < config.anomaly_confidence {
        return;
    }
    let run = table
        .runs
        .entry(snapshot.track_id)
        .or_insert_with(|| NegativeRun {
            person_name: snapshot.person_name.clone(),
            started_at: snapshot.captured_at,
            last_at: snapshot.captured_at,
            angry: 0,
            total: 0,
        });
    run.last_at = snapshot.captured_at;
    run.total += 1;
    if snapshot.emotion == Emotion::Angry {
        run.angry += 1;
    }
}

fn evaluate_rules(table: &TableState, config: &AnomalyConfig) -> HashMap<AlertType, Condition> {
    let mut conditions = HashMap::new();
    let confident = || {
        table
            .recent
            .iter()
            .filter(|s| s.confidence >= config.anomaly_confidence)
    };

    // Disputes
    let hostile_guests: HashSet<TrackId> = confident()
        .filter(|s| s.person_type == PersonType::Guest && s.emotion.is_hostile())
        .map(|s| s.track_id)
        .collect();
    let hostile_staff = confident().any(|s| s.person_type == PersonType::Staff && s.emotion.is_hostile());

    if hostile_staff && !hostile_guests.is_empty() {
        conditions.insert(
            AlertType::DisputeStaffCustomer,
            Condition {
                severity: Severity::Urgent,
                description: "Both staff and customer showing anger. Immediate intervention needed."
                    .to_string(),
            },
        );
    }
    if hostile_guests.len() >= 2 {
        conditions.insert(
            AlertType::DisputeCustomers,
            Condition {
                severity: Severity::Urgent,
                description: "Multiple angry guests detected. Possible dispute among guests."
                    .to_string(),
            },
        );
    }

    // Sustained runs, longest first so descriptions name the worst case.
    let sustained = span(config.sustained_negative);
    let mut long_runs: Vec<&NegativeRun> = table
        .runs
        .values()
        .filter(|r| r.duration() >= sustained)
        .collect();
    long_runs.sort_by_key(|r| std::cmp::Reverse(r.duration()));

    if let Some(run) = long_runs.iter().find(|r| r.is_angry_majority()) {
        conditions.insert(
            AlertType::GuestAngry,
            Condition {
                severity: Severity::Urgent,
                description: format!(
                    "{} has been angry for {} seconds. Immediate attention needed.",
                    run.person_name,
                    run.duration().num_seconds()
                ),
            },
        );
    } else if let Some(strong) = confident()
        .filter(|s| {
            s.person_type == PersonType::Guest
                && s.emotion == Emotion::Angry
                && s.confidence >= config.strong_confidence
        })
        .last()
    {
        conditions.insert(
            AlertType::GuestAngry,
            Condition {
                severity: Severity::Warning,
                description: format!(
                    "{} showing strong anger ({:.0}% confidence). Check on the table.",
                    strong.person_name,
                    strong.confidence * 100.0
                ),
            },
        );
    }

    if let Some(run) = long_runs.iter().find(|r| !r.is_angry_majority()) {
        conditions.insert(
            AlertType::NegativeExperience,
            Condition {
                severity: Severity::Warning,
                description: format!(
                    "{} has shown negative emotions for {} seconds. Guest experience at risk.",
                    run.person_name,
                    run.duration().num_seconds()
                ),
            },
        );
    }

    // Service issue, only when no dispute explains the mood.
    let negative_guests = confident()
        .filter(|s| s.person_type == PersonType::Guest && s.emotion.is_negative())
        .count();
    let unhappy_staff = confident()
        .filter(|s| {
            s.person_type == PersonType::Staff && matches!(s.emotion, Emotion::Angry | Emotion::Sad)
        })
        .count();
    let disputed = conditions.contains_key(&AlertType::DisputeStaffCustomer)
        || conditions.contains_key(&AlertType::DisputeCustomers);
    if negative_guests >= 2 && unhappy_staff >= 1 && !disputed {
        conditions.insert(
            AlertType::ServiceDissatisfaction,
            Condition {
                severity: Severity::Warning,
                description: "Negative emotions from both guest and staff. Check service quality."
                    .to_string(),
            },
        );
    }

    let deteriorating = table
        .trends
        .values()
        .filter(|t| **t == Trend::Deteriorating)
        .count();
    if deteriorating >= 2 {
        conditions.insert(
            AlertType::DeterioratingMood,
            Condition {
                severity: if deteriorating >= 3 {
                    Severity::Warning
                } else {
                    Severity::Info
                },
                description: format!(
                    "{} guests at the table are trending toward negative emotions.",
                    deteriorating
                ),
            },
        );
    }

    conditions
}

/// Convert a config duration for timestamp arithmetic.
pub(crate) fn span(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use resto_models::{BoundingBox, SessionId, SnapshotId};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-19T19:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn snap(track: u64, person_type: PersonType, emotion: Emotion, confidence: f64, secs: i64) -> EmotionSnapshot {
        let staff = person_type == PersonType::Staff;
        EmotionSnapshot {
            id: SnapshotId::new(),
            session_id: SessionId::new(),
            track_id: TrackId(track),
            person_id: format!("{}_{}", person_type.as_str(), track),
            person_type,
            person_name: if staff { "Maria".to_string() } else { format!("Guest {}", track) },
            staff_id: staff.then(|| "Maria".to_string()),
            emotion,
            confidence,
            bounding_box: BoundingBox::new(0.0, 0.0, 60.0, 60.0),
            table_number: 5,
            captured_at: t0() + ChronoDuration::seconds(secs),
        }
    }

    fn types(raised: &[RaisedAlert]) -> Vec<AlertType> {
        raised.iter().map(|r| r.alert.alert_type).collect()
    }

    #[test]
    fn test_staff_customer_dispute() {
        let mut detector = AnomalyDetector::default();
        assert!(detector
            .evaluate(&snap(1, PersonType::Guest, Emotion::Angry, 0.8, 0), None)
            .is_empty());

        let raised = detector.evaluate(&snap(2, PersonType::Staff, Emotion::Angry, 0.8, 3), None);
        assert_eq!(types(&raised), vec![AlertType::DisputeStaffCustomer]);
        let alert = &raised[0].alert;
        assert_eq!(alert.severity, Severity::Urgent);
        assert_eq!(alert.title, "Table 05: Staff-Customer Dispute");
        assert_eq!(raised[0].window.len(), 2);
    }

    #[test]
    fn test_dispute_needs_observations_inside_window() {
        let mut detector = AnomalyDetector::default();
        detector.evaluate(&snap(1, PersonType::Guest, Emotion::Angry, 0.8, 0), None);
        let raised = detector.evaluate(&snap(2, PersonType::Guest, Emotion::Disgust, 0.8, 15), None);
        assert!(!types(&raised).contains(&AlertType::DisputeCustomers));
    }

    #[test]
    fn test_low_confidence_hostility_is_ignored() {
        let mut detector = AnomalyDetector::default();
        detector.evaluate(&snap(1, PersonType::Guest, Emotion::Angry, 0.5, 0), None);
        let raised = detector.evaluate(&snap(2, PersonType::Guest, Emotion::Angry, 0.5, 1), None);
        assert!(raised.is_empty());
    }

    #[test]
    fn test_guest_dispute_deduplicated_while_persisting() {
        let mut detector = AnomalyDetector::default();
        detector.evaluate(&snap(1, PersonType::Guest, Emotion::Angry, 0.8, 0), None);
        let raised = detector.evaluate(&snap(2, PersonType::Guest, Emotion::Angry, 0.8, 1), None);
        assert_eq!(types(&raised), vec![AlertType::DisputeCustomers]);

        for secs in 2..8 {
            let raised = detector.evaluate(&snap(1 + secs as u64 % 2, PersonType::Guest, Emotion::Angry, 0.8, secs), None);
            assert!(!types(&raised).contains(&AlertType::DisputeCustomers));
        }
    }

    #[test]
    fn test_sustained_sad_run_raises_negative_experience_once() {
        let mut detector = AnomalyDetector::default();
        let mut all = Vec::new();
        for (i, secs) in (0..=40).step_by(5).enumerate() {
            let raised = detector.evaluate(&snap(1, PersonType::Guest, Emotion::Sad, 0.8, secs), None);
            if i * 5 >= 20 && all.is_empty() {
                assert_eq!(types(&raised), vec![AlertType::NegativeExperience]);
            }
            all.extend(raised);
        }
        assert_eq!(types(&all), vec![AlertType::NegativeExperience]);
        assert_eq!(all[0].alert.severity, Severity::Warning);
        assert!(all[0].alert.description.starts_with("Guest 1 has shown negative emotions for 20 seconds"));
    }

    #[test]
    fn test_angry_majority_run_is_urgent() {
        let mut detector = AnomalyDetector::default();
        let mut all = Vec::new();
        for secs in (0..=20).step_by(5) {
            all.extend(detector.evaluate(&snap(1, PersonType::Guest, Emotion::Angry, 0.7, secs), None));
        }
        assert_eq!(types(&all), vec![AlertType::GuestAngry]);
        assert_eq!(all[0].alert.severity, Severity::Urgent);
    }

    #[test]
    fn test_strong_single_anger_is_warning() {
        let mut detector = AnomalyDetector::default();
        let raised = detector.evaluate(&snap(1, PersonType::Guest, Emotion::Angry, 0.95, 0), None);
        assert_eq!(types(&raised), vec![AlertType::GuestAngry]);
        assert_eq!(raised[0].alert.severity, Severity::Warning);
    }

    #[test]
    fn test_condition_rearms_after_clear() {
        let mut detector = AnomalyDetector::default();
        // Strong anger, then calm long enough for it to leave the window.
        assert_eq!(
            detector.evaluate(&snap(1, PersonType::Guest, Emotion::Angry, 0.95, 0), None).len(),
            1
        );
        assert!(detector.evaluate(&snap(1, PersonType::Guest, Emotion::Happy, 0.9, 11), None).is_empty());

        // Reoccurs 4 s after clearing: suppressed.
        assert!(detector.evaluate(&snap(1, PersonType::Guest, Emotion::Angry, 0.95, 15), None).is_empty());
        assert!(detector.evaluate(&snap(1, PersonType::Guest, Emotion::Happy, 0.9, 26), None).is_empty());

        // Reoccurs 34 s after the latest clear: raised again.
        let raised = detector.evaluate(&snap(1, PersonType::Guest, Emotion::Angry, 0.95, 60), None);
        assert_eq!(types(&raised), vec![AlertType::GuestAngry]);
    }

    #[test]
    fn test_service_dissatisfaction() {
        let mut detector = AnomalyDetector::default();
        detector.evaluate(&snap(1, PersonType::Guest, Emotion::Sad, 0.7, 0), None);
        detector.evaluate(&snap(1, PersonType::Guest, Emotion::Fear, 0.7, 2), None);
        let raised = detector.evaluate(&snap(9, PersonType::Staff, Emotion::Sad, 0.7, 4), None);
        assert_eq!(types(&raised), vec![AlertType::ServiceDissatisfaction]);
        assert_eq!(raised[0].alert.title, "Table 05: Service Issue");
    }

    #[test]
    fn test_deteriorating_mood_and_forget_track() {
        let mut detector = AnomalyDetector::default();
        detector.evaluate(&snap(1, PersonType::Guest, Emotion::Neutral, 0.7, 0), Some(Trend::Deteriorating));
        let raised = detector.evaluate(&snap(2, PersonType::Guest, Emotion::Neutral, 0.7, 1), Some(Trend::Deteriorating));
        assert_eq!(types(&raised), vec![AlertType::DeterioratingMood]);
        assert_eq!(raised[0].alert.severity, Severity::Info);

        detector.forget_track(TrackId(1));
        detector.evaluate(&snap(2, PersonType::Guest, Emotion::Neutral, 0.7, 2), Some(Trend::Deteriorating));
        assert!(detector.tables[&5].dedup[&AlertType::DeterioratingMood].cleared_at.is_some());
    }

    #[test]
    fn test_persisting_condition_realerts_after_cooldown() {
        let mut detector = AnomalyDetector::default();
        let mut alerts = Vec::new();
        for (i, secs) in (0..=320).step_by(10).enumerate() {
            let track = 1 + i as u64 % 2;
            let raised = detector.evaluate(
                &snap(track, PersonType::Guest, Emotion::Neutral, 0.7, secs),
                Some(Trend::Deteriorating),
            );
            alerts.extend(raised.into_iter().map(|r| r.alert));
        }

        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.alert_type == AlertType::DeterioratingMood));
        let gap = alerts[1].created_at - alerts[0].created_at;
        assert_eq!(gap, ChronoDuration::seconds(300));
    }

    #[test]
    fn test_three_deteriorating_guests_is_warning() {
        let mut detector = AnomalyDetector::default();
        for track in 1..=3 {
            detector.evaluate(
                &snap(track, PersonType::Guest, Emotion::Neutral, 0.7, track as i64),
                Some(Trend::Deteriorating),
            );
        }
        let conditions = evaluate_rules(&detector.tables[&5], &detector.config);
        let condition = &conditions[&AlertType::DeterioratingMood];
        assert_eq!(condition.severity, Severity::Warning);
        assert!(condition.description.starts_with("3 guests"));

        // Still held after the cooldown, so it is raised again at the new severity.
        let raised = detector.evaluate(
            &snap(1, PersonType::Guest, Emotion::Neutral, 0.7, 310),
            Some(Trend::Deteriorating),
        );
        assert_eq!(types(&raised), vec![AlertType::DeterioratingMood]);
        assert_eq!(raised[0].alert.severity, Severity::Warning);
    }

    #[test]
    fn test_dispute_suppresses_service_dissatisfaction() {
        let mut detector = AnomalyDetector::default();
        detector.evaluate(&snap(1, PersonType::Guest, Emotion::Angry, 0.8, 0), None);
        detector.evaluate(&snap(2, PersonType::Guest, Emotion::Angry, 0.8, 1), None);
        let raised = detector.evaluate(&snap(9, PersonType::Staff, Emotion::Angry, 0.8, 2), None);
        assert_eq!(types(&raised), vec![AlertType::DisputeStaffCustomer]);

        let conditions = evaluate_rules(&detector.tables[&5], &detector.config);
        assert!(conditions.contains_key(&AlertType::DisputeCustomers));
        assert!(!conditions.contains_key(&AlertType::ServiceDissatisfaction));
    }
}
