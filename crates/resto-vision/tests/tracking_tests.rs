//! Replay -> analyzer -> tracker integration tests.

use std::io::Write;
use std::sync::Arc;

use resto_models::{PersonType, TrackId};
use resto_vision::{
    AnalyzerConfig, FrameAnalyzer, FrameSource, GalleryMatcher, PersonTracker, ReplaySource,
    ReplayVision, StaffEntry, StaffGallery, TrackerConfig,
};

fn analyzer_with_staff() -> FrameAnalyzer {
    let vision = Arc::new(ReplayVision);
    let gallery = StaffGallery::new(vec![StaffEntry {
        name: "maria".into(),
        descriptor: vec![1.0, 0.0],
    }]);
    let matcher = GalleryMatcher::new(vision.clone(), gallery, 0.5);
    FrameAnalyzer::new(
        vision.clone(),
        vision,
        Some(Arc::new(matcher)),
        AnalyzerConfig::default(),
    )
}

#[tokio::test]
async fn test_replay_staff_and_guest_tracks() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for i in 0..6 {
        let x = 100 + i * 3;
        writeln!(
            file,
            concat!(
                r#"{{"faces": ["#,
                r#"{{"bbox": {{"x": {x}, "y": 50, "w": 80, "h": 80}}, "emotion": "happy", "confidence": 0.9, "descriptor": [0.95, 0.05]}}, "#,
                r#"{{"bbox": {{"x": 400, "y": 60, "w": 80, "h": 80}}, "emotion": "sad", "confidence": 0.7, "descriptor": [0.0, 1.0]}}"#,
                r#"]}}"#
            ),
            x = x
        )
        .unwrap();
    }
    // Guest leaves; staff stays.
    for _ in 0..4 {
        writeln!(
            file,
            r#"{{"faces": [{{"bbox": {{"x": 118, "y": 50, "w": 80, "h": 80}}, "emotion": "neutral", "confidence": 0.8, "descriptor": [1.0, 0.0]}}]}}"#
        )
        .unwrap();
    }

    let mut source = ReplaySource::open(file.path(), 5.0).await.unwrap();
    let analyzer = analyzer_with_staff();
    let mut tracker = PersonTracker::new(TrackerConfig {
        max_misses: 2,
        ..Default::default()
    });

    let mut closed = Vec::new();
    let mut staff_ids = Vec::new();
    while let Some(frame) = source.next_frame().await.unwrap() {
        let analysis = analyzer.analyze(&frame);
        let update = tracker.update(&analysis.detections, frame.captured_at);
        for a in &update.assignments {
            if analysis.detections[a.detection].staff_identity.is_some() {
                staff_ids.push(a.track_id);
            }
        }
        closed.extend(update.closed);
    }

    assert!(staff_ids.iter().all(|id| *id == TrackId(1)));
    let staff = tracker.get(TrackId(1)).unwrap();
    assert_eq!(staff.person_type, PersonType::Staff);
    assert_eq!(staff.staff_identity.as_deref(), Some("Maria"));

    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].id, TrackId(2));
    assert_eq!(closed[0].person_type, PersonType::Guest);
    assert_eq!(closed[0].hits, 6);
}

#[tokio::test]
async fn test_low_confidence_faces_are_tracked_without_emotion() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{"faces": [{{"bbox": {{"x": 0, "y": 0, "w": 60, "h": 60}}, "emotion": "angry", "confidence": 0.1}}]}}"#
    )
    .unwrap();

    let mut source = ReplaySource::open(file.path(), 5.0).await.unwrap();
    let frame = source.next_frame().await.unwrap().unwrap();
    let analysis = analyzer_with_staff().analyze(&frame);

    assert_eq!(analysis.detections.len(), 1);
    assert!(analysis.detections[0].emotion.is_none());

    let mut tracker = PersonTracker::default();
    let update = tracker.update(&analysis.detections, frame.captured_at);
    assert_eq!(update.assignments.len(), 1);
}
