//! End-to-end runs over in-memory footage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use resto_engine::{EngineConfig, MemorySink, Pipeline};
use resto_insight::{Insight, InsightAnalyzer, InsightError, InsightRequest, InsightResult};
use resto_models::{AlertType, BoundingBox, TableStatus};
use resto_vision::{
    AnalyzerConfig, FaceAnnotation, Frame, FrameAnalyzer, FrameSource, GalleryMatcher,
    IdentityMatcher, ReplayVision, StaffEntry, StaffGallery, VecFrameSource, VisionError,
    VisionResult,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 19, 0, 0).unwrap()
}

fn face(x: f64, emotion: &str, confidence: f64) -> FaceAnnotation {
    FaceAnnotation {
        bbox: BoundingBox::new(x, 100.0, 80.0, 80.0),
        emotion: Some(emotion.to_string()),
        confidence,
        descriptor: None,
    }
}

fn staff_face(x: f64, emotion: &str) -> FaceAnnotation {
    FaceAnnotation {
        descriptor: Some(vec![1.0, 0.0]),
        ..face(x, emotion, 0.9)
    }
}

/// One frame every five seconds at the given table.
fn frame(index: u64, table: u32, faces: Vec<FaceAnnotation>) -> Frame {
    Frame {
        index,
        captured_at: t0() + chrono::Duration::seconds(5 * index as i64),
        width: 640,
        height: 480,
        table_number: Some(table),
        annotations: faces,
        ..Default::default()
    }
}

fn guest_run(emotions: &[&str]) -> Vec<Frame> {
    emotions
        .iter()
        .enumerate()
        .map(|(i, e)| frame(i as u64, 1, vec![face(100.0, e, 0.8)]))
        .collect()
}

fn analyzer(with_staff: bool) -> FrameAnalyzer {
    let vision = Arc::new(ReplayVision);
    let matcher = with_staff.then(|| {
        let gallery = StaffGallery::new(vec![StaffEntry {
            name: "maria".into(),
            descriptor: vec![1.0, 0.0],
        }]);
        Arc::new(GalleryMatcher::new(vision.clone(), gallery, 0.5)) as Arc<dyn IdentityMatcher>
    });
    FrameAnalyzer::new(vision.clone(), vision, matcher, AnalyzerConfig::default())
}

fn pipeline(
    source: Box<dyn FrameSource>,
    with_staff: bool,
    insight: Option<Arc<dyn InsightAnalyzer>>,
    sink: Arc<MemorySink>,
) -> Pipeline {
    let config = EngineConfig {
        shutdown_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    Pipeline::new(config, source, analyzer(with_staff), insight, sink)
}

struct FailingInsight;

#[async_trait]
impl InsightAnalyzer for FailingInsight {
    async fn analyze(&self, _request: &InsightRequest) -> InsightResult<Insight> {
        Err(InsightError::Api {
            status: 503,
            body: "unavailable".into(),
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

struct CannedInsight;

#[async_trait]
impl InsightAnalyzer for CannedInsight {
    async fn analyze(&self, request: &InsightRequest) -> InsightResult<Insight> {
        assert!(!request.window.is_empty());
        Ok(Insight::new("Long wait for food", "Check on the kitchen", 7))
    }

    fn name(&self) -> &'static str {
        "canned"
    }
}

/// Yields its frames, then fails.
struct BrokenSource {
    frames: VecFrameSource,
    remaining: usize,
}

#[async_trait]
impl FrameSource for BrokenSource {
    async fn next_frame(&mut self) -> VisionResult<Option<Frame>> {
        if self.remaining == 0 {
            return Err(VisionError::capture_failed("camera unplugged"));
        }
        self.remaining -= 1;
        self.frames.next_frame().await
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

/// Yields its frames, then never ends.
struct LiveSource {
    frames: VecFrameSource,
}

#[async_trait]
impl FrameSource for LiveSource {
    async fn next_frame(&mut self) -> VisionResult<Option<Frame>> {
        match self.frames.next_frame().await? {
            Some(frame) => Ok(Some(frame)),
            None => std::future::pending().await,
        }
    }

    fn name(&self) -> &'static str {
        "live"
    }
}

#[tokio::test]
async fn test_sustained_sadness_raises_one_alert() {
    let frames = guest_run(&[
        "neutral", "neutral", "happy", "happy", "happy", "sad", "sad", "sad", "sad", "sad",
    ]);
    let sink = Arc::new(MemorySink::new());
    let report = pipeline(Box::new(VecFrameSource::new(frames)), false, None, sink.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.frames, 10);
    assert_eq!(report.tracks_opened, 1);
    assert_eq!(report.snapshots, 10);
    assert_eq!(report.alerts, 1);
    assert_eq!(report.escalation.unenriched, 1);
    assert_eq!(report.publish.dropped_invalid, 0);

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::NegativeExperience);
    assert_eq!(alerts[0].table_number, 1);
    assert!(alerts[0].root_cause.is_none());

    assert_eq!(sink.count("snapshot"), 10);
    // Two rolling updates plus the final one.
    assert_eq!(sink.count("sentiment"), 3);
    assert!(sink.count("realtime") >= 1);
}

#[tokio::test]
async fn test_persisting_condition_is_not_repeated() {
    let mut emotions = vec!["sad"; 25];
    emotions.insert(0, "neutral");
    let sink = Arc::new(MemorySink::new());
    let report = pipeline(Box::new(VecFrameSource::new(guest_run(&emotions))), false, None, sink.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.alerts, 1);
    assert_eq!(sink.alerts().len(), 1);
}

#[tokio::test]
async fn test_alert_is_enriched_by_insight() {
    let frames = vec![frame(0, 4, vec![face(100.0, "angry", 0.97)])];
    let sink = Arc::new(MemorySink::new());
    let insight: Arc<dyn InsightAnalyzer> = Arc::new(CannedInsight);
    let report = pipeline(Box::new(VecFrameSource::new(frames)), false, Some(insight), sink.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.escalation.enriched, 1);
    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::GuestAngry);
    assert_eq!(alerts[0].root_cause.as_deref(), Some("Long wait for food"));
    assert_eq!(alerts[0].urgency_score, Some(7));
}

#[tokio::test]
async fn test_failing_insight_publishes_degraded_alert() {
    let frames = vec![frame(0, 4, vec![face(100.0, "angry", 0.97)])];
    let sink = Arc::new(MemorySink::new());
    let insight: Arc<dyn InsightAnalyzer> = Arc::new(FailingInsight);
    let report = pipeline(Box::new(VecFrameSource::new(frames)), false, Some(insight), sink.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.escalation.degraded, 1);
    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert!(alert.is_degraded());
    assert_eq!(alert.alert_type, AlertType::GuestAngry);
    assert_eq!(alert.table_number, 4);
    assert!(!alert.title.is_empty());
    assert!(!alert.description.is_empty());
}

#[tokio::test]
async fn test_table_change_closes_guests_and_table() {
    let frames = vec![
        frame(0, 1, vec![face(100.0, "happy", 0.9)]),
        frame(1, 1, vec![face(100.0, "happy", 0.9)]),
        frame(2, 2, vec![face(300.0, "neutral", 0.9)]),
        frame(3, 2, vec![face(300.0, "neutral", 0.9)]),
    ];
    let sink = Arc::new(MemorySink::new());
    let report = pipeline(Box::new(VecFrameSource::new(frames)), false, None, sink.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.tracks_opened, 2);
    assert_eq!(report.tables_closed, 2);

    let tables = sink.tables();
    let free: Vec<_> = tables.iter().filter(|t| t.status == TableStatus::Free).collect();
    assert_eq!(free.len(), 2);
    assert_eq!(free[0].table_number, 1);
    assert_eq!(free[0].guest_count, 1);
    assert!(free[0].guest_sentiment.is_some());
    assert_eq!(free[1].table_number, 2);
    assert!(free.iter().all(|t| t.end_time.is_some()));
}

#[tokio::test]
async fn test_staff_score_is_published() {
    let frames: Vec<Frame> = (0..6)
        .map(|i| {
            frame(
                i,
                3,
                vec![staff_face(100.0, "happy"), face(400.0, "neutral", 0.8)],
            )
        })
        .collect();
    let sink = Arc::new(MemorySink::new());
    pipeline(Box::new(VecFrameSource::new(frames)), true, None, sink.clone())
        .run()
        .await
        .unwrap();

    let scores = sink.staff_scores();
    assert!(!scores.is_empty());
    assert!(scores.iter().all(|s| s.staff_id == "Maria"));
    assert!(scores.iter().all(|s| s.rank == 1));
    assert_eq!(scores[0].tables_served, vec![3]);
}

#[tokio::test]
async fn test_capture_failure_flushes_then_errors() {
    let source = BrokenSource {
        frames: VecFrameSource::new(guest_run(&["happy", "happy", "happy"])),
        remaining: 3,
    };
    let sink = Arc::new(MemorySink::new());
    let err = pipeline(Box::new(source), false, None, sink.clone())
        .run()
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(sink.count("snapshot"), 3);
    assert_eq!(sink.count("sentiment"), 1);
    assert_eq!(sink.tables().last().map(|t| t.status), Some(TableStatus::Free));
}

#[tokio::test]
async fn test_stop_request_ends_live_run() {
    let source = LiveSource {
        frames: VecFrameSource::new(guest_run(&["happy", "neutral"])),
    };
    let sink = Arc::new(MemorySink::new());
    let pipeline = pipeline(Box::new(source), false, None, sink.clone());
    let shutdown = pipeline.shutdown_handle();

    let run = tokio::spawn(pipeline.run());
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.stop();

    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(report.stopped);
    assert_eq!(report.frames, 2);
    assert_eq!(sink.count("sentiment"), 1);
}
