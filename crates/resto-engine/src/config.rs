//! Engine configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use resto_vision::{AnalyzerConfig, TrackerConfig, DEFAULT_MATCH_THRESHOLD, DEFAULT_SCENE_THRESHOLD};

use crate::anomaly::AnomalyConfig;
use crate::error::{EngineError, EngineResult};
use crate::escalator::EscalationConfig;
use crate::publisher::PublisherConfig;
use crate::scoring::ScoringConfig;
use crate::session::SessionConfig;

/// Where published records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputKind {
    /// Dashboard collections in Firestore
    Firestore,
    /// Append to a local JSON-lines file
    Jsonl(PathBuf),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pre-annotated footage to replay
    pub replay_path: Option<PathBuf>,
    pub replay_fps: f64,
    /// Enrolled staff descriptors; staff recognition is off without it
    pub staff_gallery: Option<PathBuf>,
    pub match_threshold: f32,
    /// Histogram distance that starts the next table
    pub scene_threshold: f64,
    /// Frames buffered between the source task and the loop
    pub frame_buffer: usize,
    /// How often realtime metrics are refreshed
    pub metrics_interval: Duration,
    /// How often staff scores are recomputed
    pub score_interval: Duration,
    /// Wait for outstanding escalations at end of stream
    pub shutdown_timeout: Duration,
    pub output: OutputKind,
    pub tracker: TrackerConfig,
    pub analyzer: AnalyzerConfig,
    pub session: SessionConfig,
    pub anomaly: AnomalyConfig,
    pub escalation: EscalationConfig,
    pub scoring: ScoringConfig,
    pub publisher: PublisherConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            replay_path: None,
            replay_fps: 5.0,
            staff_gallery: None,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            scene_threshold: DEFAULT_SCENE_THRESHOLD,
            frame_buffer: 8,
            metrics_interval: Duration::from_secs(10),
            score_interval: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(30),
            output: OutputKind::Jsonl(PathBuf::from("resto_records.jsonl")),
            tracker: TrackerConfig::default(),
            analyzer: AnalyzerConfig::default(),
            session: SessionConfig::default(),
            anomaly: AnomalyConfig::default(),
            escalation: EscalationConfig::default(),
            scoring: ScoringConfig::default(),
            publisher: PublisherConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> EngineResult<Self> {
        let d = Self::default();

        let output = match std::env::var("RESTO_OUTPUT").ok().as_deref() {
            None | Some("jsonl") => OutputKind::Jsonl(
                std::env::var("RESTO_OUTPUT_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("resto_records.jsonl")),
            ),
            Some("firestore") => OutputKind::Firestore,
            Some(other) => {
                return Err(EngineError::config_error(format!(
                    "RESTO_OUTPUT must be 'jsonl' or 'firestore', got '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            replay_path: std::env::var("RESTO_REPLAY_PATH").ok().map(PathBuf::from),
            replay_fps: env_or("RESTO_REPLAY_FPS", d.replay_fps),
            staff_gallery: std::env::var("RESTO_STAFF_GALLERY").ok().map(PathBuf::from),
            match_threshold: env_or("RESTO_MATCH_THRESHOLD", d.match_threshold),
            scene_threshold: env_or("RESTO_SCENE_THRESHOLD", d.scene_threshold),
            frame_buffer: env_or("RESTO_FRAME_BUFFER", d.frame_buffer),
            metrics_interval: env_secs("RESTO_METRICS_INTERVAL_SECS", d.metrics_interval),
            score_interval: env_secs("RESTO_SCORE_INTERVAL_SECS", d.score_interval),
            shutdown_timeout: env_secs("RESTO_SHUTDOWN_TIMEOUT_SECS", d.shutdown_timeout),
            output,
            tracker: TrackerConfig {
                iou_threshold: env_or("RESTO_IOU_THRESHOLD", d.tracker.iou_threshold),
                max_misses: env_or("RESTO_MAX_MISSES", d.tracker.max_misses),
                ..d.tracker
            },
            analyzer: AnalyzerConfig {
                min_face_size: env_or("RESTO_MIN_FACE_SIZE", d.analyzer.min_face_size),
                emotion_confidence: env_or("RESTO_EMOTION_CONFIDENCE", d.analyzer.emotion_confidence),
            },
            session: SessionConfig {
                sentiment_every: env_or("RESTO_SENTIMENT_EVERY", d.session.sentiment_every),
                ..d.session
            },
            anomaly: AnomalyConfig {
                anomaly_confidence: env_or("RESTO_ANOMALY_CONFIDENCE", d.anomaly.anomaly_confidence),
                sustained_negative: env_secs("RESTO_SUSTAINED_NEGATIVE_SECS", d.anomaly.sustained_negative),
                cooldown: env_secs("RESTO_ALERT_COOLDOWN_SECS", d.anomaly.cooldown),
                ..d.anomaly
            },
            escalation: EscalationConfig {
                timeout: env_secs("RESTO_ESCALATION_TIMEOUT_SECS", d.escalation.timeout),
                max_concurrent: env_or("RESTO_ESCALATION_CONCURRENCY", d.escalation.max_concurrent),
                ..d.escalation
            },
            scoring: d.scoring,
            publisher: PublisherConfig {
                max_retries: env_or("RESTO_PUBLISH_MAX_RETRIES", d.publisher.max_retries),
                ..d.publisher
            },
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
