//! The frame loop.
//!
//! A reader task pulls frames from the source into a small channel. The
//! loop owns all tracking, session, anomaly and table state and processes
//! frames strictly in order; escalation and publishing run beside it.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use resto_insight::InsightAnalyzer;
use resto_models::{EmotionSnapshot, PersonType, SnapshotId};
use resto_vision::{
    Assignment, FaceDetection, Frame, FrameAnalyzer, FrameSource, PersonTracker, SceneDetector,
    Track, VisionResult,
};

use crate::anomaly::AnomalyDetector;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::escalator::{signalled, EscalationJob, EscalationReport, Escalator};
use crate::logging::RunLogger;
use crate::metrics::{record_alert, record_frame, record_snapshot, set_sessions_open};
use crate::publisher::{PublishReport, Publisher, PublisherHandle};
use crate::realtime::RealtimeAggregator;
use crate::scoring::PerformanceScorer;
use crate::session::{ObserveOutcome, Observation, SessionManager};
use crate::sink::{Record, RecordSink};
use crate::tables::TableTracker;

/// Summary of one run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub run_id: String,
    pub frames: u64,
    pub tracks_opened: u64,
    pub snapshots: u64,
    pub alerts: u64,
    pub tables_closed: u64,
    /// True when the run ended on a stop request
    pub stopped: bool,
    pub escalation: EscalationReport,
    pub publish: PublishReport,
}

/// Requests a graceful stop of a running pipeline.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

/// One engine run over one frame source.
pub struct Pipeline {
    config: EngineConfig,
    source: Box<dyn FrameSource>,
    analyzer: Arc<FrameAnalyzer>,
    insight: Option<Arc<dyn InsightAnalyzer>>,
    sink: Arc<dyn RecordSink>,
    shutdown: Arc<watch::Sender<bool>>,
    logger: RunLogger,
}

impl Pipeline {
    pub fn new(
        config: EngineConfig,
        source: Box<dyn FrameSource>,
        analyzer: FrameAnalyzer,
        insight: Option<Arc<dyn InsightAnalyzer>>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            source,
            analyzer: Arc::new(analyzer),
            insight,
            sink,
            shutdown: Arc::new(shutdown),
            logger: RunLogger::new(Uuid::new_v4().to_string(), "pipeline"),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown.clone(),
        }
    }

    pub fn run_id(&self) -> &str {
        self.logger.run_id()
    }

    /// Process frames until the source ends, fails, or a stop is requested.
    ///
    /// Final records are published in every case. A capture failure is
    /// returned as the error after that flush.
    pub async fn run(self) -> EngineResult<RunReport> {
        let span = self.logger.create_span();
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> EngineResult<RunReport> {
        let Pipeline {
            config,
            source,
            analyzer,
            insight,
            sink,
            shutdown,
            logger,
        } = self;

        logger.log_start(&format!("source={} sink={}", source.name(), sink.name()));

        let publisher = Publisher::spawn(sink, config.publisher.clone());
        let escalator = Escalator::spawn(insight, publisher.handle(), config.escalation.clone());
        let mut state = RunState::new(&config, publisher.handle(), logger.run_id());

        let (frame_tx, mut frame_rx) = mpsc::channel(config.frame_buffer.max(1));
        let reader = tokio::spawn(read_frames(source, frame_tx));

        let mut stop_rx = shutdown.subscribe();
        let mut metrics_tick = ticker(config.metrics_interval);
        let mut score_tick = ticker(config.score_interval);
        let mut failure: Option<EngineError> = None;

        loop {
            tokio::select! {
                biased;
                _ = signalled(&mut stop_rx) => {
                    logger.log_warning("stop requested");
                    state.report.stopped = true;
                    escalator.cancel();
                    break;
                }
                frame = frame_rx.recv() => match frame {
                    Some(Ok(frame)) => {
                        state.process_frame(frame, &analyzer, &escalator).await;
                        if state.report.frames % 500 == 0 {
                            logger.log_progress(&format!(
                                "{} frames, {} live tracks",
                                state.report.frames,
                                state.tracker.live_count()
                            ));
                        }
                    }
                    Some(Err(e)) => {
                        logger.log_error(&format!("capture failed: {}", e));
                        failure = Some(e.into());
                        break;
                    }
                    None => {
                        logger.log_progress("end of stream");
                        break;
                    }
                },
                _ = metrics_tick.tick() => state.publish_realtime().await,
                _ = score_tick.tick() => state.publish_scores().await,
            }
        }

        drop(frame_rx);
        reader.abort();

        state.finish().await;

        let grace = if state.report.stopped {
            Duration::ZERO
        } else {
            config.shutdown_timeout
        };
        let escalation = escalator.finish(grace).await;

        let mut report = state.into_report();
        report.escalation = escalation;
        report.publish = publisher.finish().await;

        logger.log_completion(&format!(
            "frames={} tracks={} snapshots={} alerts={} published={}",
            report.frames,
            report.tracks_opened,
            report.snapshots,
            report.alerts,
            report.publish.written
        ));

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

/// Interval whose first tick is one period away.
fn ticker(period: Duration) -> tokio::time::Interval {
    let period = period.max(Duration::from_millis(1));
    let mut tick = interval_at(tokio::time::Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick
}

async fn read_frames(mut source: Box<dyn FrameSource>, tx: mpsc::Sender<VisionResult<Frame>>) {
    loop {
        match source.next_frame().await {
            Ok(Some(frame)) => {
                if tx.send(Ok(frame)).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        }
    }
}

/// Everything the loop owns.
struct RunState {
    tracker: PersonTracker,
    scene: SceneDetector,
    sessions: SessionManager,
    anomalies: AnomalyDetector,
    scorer: PerformanceScorer,
    realtime: RealtimeAggregator,
    tables: TableTracker,
    current_table: u32,
    last_frame_at: Option<DateTime<Utc>>,
    publisher: PublisherHandle,
    report: RunReport,
}

impl RunState {
    fn new(config: &EngineConfig, publisher: PublisherHandle, run_id: &str) -> Self {
        Self {
            tracker: PersonTracker::new(config.tracker.clone()),
            scene: SceneDetector::new(config.scene_threshold),
            sessions: SessionManager::new(config.session.clone()),
            anomalies: AnomalyDetector::new(config.anomaly.clone()),
            scorer: PerformanceScorer::new(config.scoring.clone()),
            realtime: RealtimeAggregator::new(),
            tables: TableTracker::new(),
            current_table: 1,
            last_frame_at: None,
            publisher,
            report: RunReport {
                run_id: run_id.to_string(),
                ..Default::default()
            },
        }
    }

    async fn process_frame(&mut self, frame: Frame, analyzer: &Arc<FrameAnalyzer>, escalator: &Escalator) {
        let started = Instant::now();
        let at = frame.captured_at;
        let index = frame.index;
        self.last_frame_at = Some(at);

        let table = match frame.table_number.filter(|t| *t > 0) {
            Some(table) => table,
            None => self.scene.check(&frame).table_number,
        };
        if table != self.current_table {
            self.change_table(table, at).await;
        }

        let analyzer = analyzer.clone();
        let analysis = match tokio::task::spawn_blocking(move || analyzer.analyze(&frame)).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(frame = index, error = %e, "Frame analysis panicked, skipping frame");
                return;
            }
        };

        let update = self.tracker.update(&analysis.detections, at);
        for track in &update.closed {
            self.close_track(track).await;
        }
        for assignment in &update.assignments {
            if let Some(detection) = analysis.detections.get(assignment.detection) {
                self.handle_detection(assignment, detection, table, at, escalator).await;
            }
        }

        self.report.frames += 1;
        set_sessions_open(self.sessions.open_count());
        record_frame(started.elapsed().as_secs_f64());
    }

    async fn handle_detection(
        &mut self,
        assignment: &Assignment,
        detection: &FaceDetection,
        table: u32,
        at: DateTime<Utc>,
        escalator: &Escalator,
    ) {
        let Some(track) = self.tracker.get(assignment.track_id).cloned() else {
            return;
        };
        let is_guest = track.person_type == PersonType::Guest;

        if assignment.is_new {
            self.sessions.open(&track, table, at);
            self.report.tracks_opened += 1;
            if is_guest {
                self.realtime.record_guest_opened();
            }
        }

        if self.tables.current_table() != Some(table) {
            if let Some(engaged) = self.tables.open(table, at) {
                self.publisher.publish(Record::Table(engaged)).await;
            }
        }
        let table_name = if is_guest { track.person_id() } else { track.display_name() };
        self.tables.note_person(track.person_type, &table_name);

        // Unclassified faces still move their track, but record nothing.
        let Some(prediction) = detection.emotion else {
            return;
        };

        let observation = Observation {
            emotion: prediction.emotion,
            confidence: prediction.confidence,
            table_number: table,
            captured_at: at,
        };
        let publish_sentiment = match self.sessions.observe(track.id, observation) {
            ObserveOutcome::Accepted { publish_sentiment } => publish_sentiment,
            ObserveOutcome::OutOfOrder => {
                debug!(track_id = %track.id, "Dropping out-of-order observation");
                return;
            }
            ObserveOutcome::UnknownTrack => return,
        };
        let Some(session) = self.sessions.get(track.id) else {
            return;
        };
        let trend = session.trend;
        let sentiment = publish_sentiment.then(|| session.sentiment()).flatten();

        let snapshot = EmotionSnapshot {
            id: SnapshotId::new(),
            session_id: session.id.clone(),
            track_id: track.id,
            person_id: track.person_id(),
            person_type: track.person_type,
            person_name: track.display_name(),
            staff_id: track.staff_identity.clone(),
            emotion: prediction.emotion,
            confidence: prediction.confidence,
            bounding_box: detection.bbox,
            table_number: table,
            captured_at: at,
        };

        self.report.snapshots += 1;
        record_snapshot(track.person_type.as_str());
        if is_guest {
            self.realtime.record_guest_observation(prediction.emotion);
        }

        let raised = self.anomalies.evaluate(&snapshot, Some(trend));
        self.publisher.publish(Record::Snapshot(snapshot)).await;
        if let Some(sentiment) = sentiment {
            self.publisher.publish(Record::Sentiment(sentiment)).await;
        }

        for r in raised {
            self.report.alerts += 1;
            record_alert(r.alert.alert_type.as_str(), r.alert.severity.as_str());
            info!(
                alert_id = %r.alert.id,
                table = r.alert.table_number,
                alert_type = r.alert.alert_type.as_str(),
                severity = r.alert.severity.as_str(),
                "Alert raised"
            );
            let table_sentiment = self.sessions.table_summary(r.alert.table_number, PersonType::Guest);
            escalator
                .submit(EscalationJob {
                    alert: r.alert,
                    window: r.window,
                    table_sentiment,
                })
                .await;
        }
    }

    /// Finalize a track's session and forget its anomaly state.
    async fn close_track(&mut self, track: &Track) {
        if let Some(session) = self.sessions.close(track.id, track.last_seen) {
            if let Some(sentiment) = session.sentiment() {
                self.publisher.publish(Record::Sentiment(sentiment)).await;
            }
        }
        self.anomalies.forget_track(track.id);
    }

    /// Guests leave with the table; staff tracks carry over.
    async fn change_table(&mut self, table: u32, at: DateTime<Utc>) {
        info!(from = self.current_table, to = table, "Table change");
        for track in self.tracker.close_guests() {
            self.close_track(&track).await;
        }
        self.close_table(at).await;
        self.current_table = table;
    }

    async fn close_table(&mut self, at: DateTime<Utc>) {
        let Some(table) = self.tables.current_table() else {
            return;
        };
        let guest = self.sessions.table_summary(table, PersonType::Guest);
        let staff = self.sessions.table_summary(table, PersonType::Staff);
        if let Some(summary) = self.tables.close(at, guest, staff) {
            if let Some(minutes) = summary.duration_minutes() {
                self.realtime.record_table_closed(minutes);
            }
            self.report.tables_closed += 1;
            self.publisher.publish(Record::Table(summary)).await;
        }
    }

    async fn publish_realtime(&mut self) {
        let guests_inside = self.tracker.live_tracks().filter(|t| !t.is_staff()).count();
        let metrics = self.realtime.snapshot(
            guests_inside,
            &self.sessions.live_guest_happiness(),
            Utc::now(),
        );
        self.publisher.publish(Record::Realtime(metrics)).await;
    }

    /// Recompute and overwrite the scores of every day with closed sessions.
    async fn publish_scores(&mut self) {
        let dates: BTreeSet<NaiveDate> = self
            .sessions
            .closed_sessions()
            .iter()
            .map(|s| s.started_at.date_naive())
            .collect();

        for date in &dates {
            let scores = self.scorer.score_day(*date, self.sessions.closed_sessions());
            debug!(%date, staff = scores.len(), "Publishing staff scores");
            for score in scores {
                self.publisher.publish(Record::StaffScore(score)).await;
            }
        }

        // Keep yesterday for sessions that straddle midnight.
        if let Some(latest) = dates.last().and_then(|d| d.pred_opt()) {
            self.sessions.prune_closed_before(latest);
        }
    }

    /// Close everything and publish final records.
    async fn finish(&mut self) {
        let end = self.last_frame_at.unwrap_or_else(Utc::now);
        for track in self.tracker.close_all() {
            self.close_track(&track).await;
        }
        for session in self.sessions.flush(end) {
            if let Some(sentiment) = session.sentiment() {
                self.publisher.publish(Record::Sentiment(sentiment)).await;
            }
        }
        self.close_table(end).await;
        self.publish_scores().await;
        self.publish_realtime().await;
    }

    fn into_report(self) -> RunReport {
        self.report
    }
}
