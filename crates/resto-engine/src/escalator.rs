//! Alert enrichment off the frame path.
//!
//! The pipeline only enqueues. A background task hands each alert to the
//! insight service with bounded concurrency, then publishes it exactly
//! once: enriched on success, degraded on failure or cancellation, as-is
//! when no service is configured.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use resto_insight::{Insight, InsightAnalyzer, InsightRequest};
use resto_models::{Alert, EmotionSnapshot, SentimentSummary};

use crate::metrics::record_escalation;
use crate::publisher::PublisherHandle;
use crate::sink::Record;

/// Escalation settings.
#[derive(Debug, Clone)]
pub struct EscalationConfig {
    /// Per-attempt timeout of an insight call
    pub timeout: Duration,
    pub max_concurrent: usize,
    pub queue_capacity: usize,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_concurrent: 2,
            queue_capacity: 64,
        }
    }
}

/// One alert waiting for enrichment.
#[derive(Debug, Clone)]
pub struct EscalationJob {
    pub alert: Alert,
    pub window: Vec<EmotionSnapshot>,
    pub table_sentiment: Option<SentimentSummary>,
}

/// Counts of how each alert was published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscalationReport {
    pub enriched: u64,
    pub degraded: u64,
    pub unenriched: u64,
    pub cancelled: u64,
}

impl EscalationReport {
    pub fn total(&self) -> u64 {
        self.enriched + self.degraded + self.unenriched + self.cancelled
    }

    fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Enriched => self.enriched += 1,
            Outcome::Degraded => self.degraded += 1,
            Outcome::Unenriched => self.unenriched += 1,
            Outcome::Cancelled => self.cancelled += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Enriched,
    Degraded,
    Unenriched,
    Cancelled,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Enriched => "enriched",
            Outcome::Degraded => "degraded",
            Outcome::Unenriched => "unenriched",
            Outcome::Cancelled => "cancelled",
        }
    }
}

/// Handle to the escalation task.
pub struct Escalator {
    tx: mpsc::Sender<EscalationJob>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<EscalationReport>,
    publisher: PublisherHandle,
}

impl Escalator {
    pub fn spawn(
        analyzer: Option<Arc<dyn InsightAnalyzer>>,
        publisher: PublisherHandle,
        config: EscalationConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (cancel, cancel_rx) = watch::channel(false);
        match &analyzer {
            Some(a) => info!(analyzer = a.name(), max_concurrent = config.max_concurrent, "Escalator started"),
            None => info!("Escalator started without insight service, alerts publish unenriched"),
        }
        let task = tokio::spawn(run(analyzer, publisher.clone(), config, rx, cancel_rx));
        Self {
            tx,
            cancel,
            task,
            publisher,
        }
    }

    /// Queue an alert. Waits while the queue is full.
    pub async fn submit(&self, job: EscalationJob) {
        if let Err(mpsc::error::SendError(mut job)) = self.tx.send(job).await {
            warn!(alert_id = %job.alert.id, "Escalator stopped, publishing alert degraded");
            job.alert.degrade();
            record_escalation(Outcome::Cancelled.as_str());
            self.publisher.publish(Record::Alert(job.alert)).await;
        }
    }

    /// Cancel in-flight and queued escalations. Their alerts publish degraded.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Stop accepting alerts and wait up to `grace` for outstanding ones,
    /// then cancel whatever is left.
    pub async fn finish(self, grace: Duration) -> EscalationReport {
        let Self {
            tx,
            cancel,
            mut task,
            publisher,
        } = self;
        drop(tx);
        drop(publisher);

        let joined = match tokio::time::timeout(grace, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(grace_secs = grace.as_secs_f64(), "Escalations outstanding, cancelling");
                let _ = cancel.send(true);
                task.await
            }
        };
        let report = joined.unwrap_or_else(|e| {
            error!(error = %e, "Escalator task failed");
            EscalationReport::default()
        });
        info!(
            enriched = report.enriched,
            degraded = report.degraded,
            unenriched = report.unenriched,
            cancelled = report.cancelled,
            "Escalator finished"
        );
        report
    }
}

async fn run(
    analyzer: Option<Arc<dyn InsightAnalyzer>>,
    publisher: PublisherHandle,
    config: EscalationConfig,
    mut rx: mpsc::Receiver<EscalationJob>,
    mut cancel: watch::Receiver<bool>,
) -> EscalationReport {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
    let mut tasks: JoinSet<Outcome> = JoinSet::new();
    let mut report = EscalationReport::default();
    let mut cancelled_early = false;

    loop {
        tokio::select! {
            biased;
            _ = signalled(&mut cancel) => {
                cancelled_early = true;
                break;
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                record_joined(&mut report, joined);
            }
            job = rx.recv() => {
                let Some(job) = job else { break };
                match &analyzer {
                    Some(analyzer) => {
                        tasks.spawn(escalate(
                            job,
                            analyzer.clone(),
                            semaphore.clone(),
                            publisher.clone(),
                            config.timeout,
                            cancel.clone(),
                        ));
                    }
                    None => {
                        record_escalation(Outcome::Unenriched.as_str());
                        publisher.publish(Record::Alert(job.alert)).await;
                        report.add(Outcome::Unenriched);
                    }
                }
            }
        }
    }

    if cancelled_early {
        rx.close();
        while let Ok(mut job) = rx.try_recv() {
            job.alert.degrade();
            record_escalation(Outcome::Cancelled.as_str());
            publisher.publish(Record::Alert(job.alert)).await;
            report.add(Outcome::Cancelled);
        }
    }

    while let Some(joined) = tasks.join_next().await {
        record_joined(&mut report, joined);
    }
    report
}

fn record_joined(report: &mut EscalationReport, joined: Result<Outcome, tokio::task::JoinError>) {
    match joined {
        Ok(outcome) => report.add(outcome),
        Err(e) => error!(error = %e, "Escalation task panicked"),
    }
}

/// Resolves once the flag is set.
pub(crate) async fn signalled(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|c| *c).await.is_err();
    if closed {
        // Sender gone without setting the flag.
        std::future::pending::<()>().await;
    }
}

async fn escalate(
    job: EscalationJob,
    analyzer: Arc<dyn InsightAnalyzer>,
    semaphore: Arc<Semaphore>,
    publisher: PublisherHandle,
    timeout: Duration,
    mut cancel: watch::Receiver<bool>,
) -> Outcome {
    let mut alert = job.alert;
    let request = InsightRequest {
        alert: alert.clone(),
        window: job.window,
        table_sentiment: job.table_sentiment,
    };

    let work = async {
        let _permit = semaphore.acquire_owned().await;
        analyze_with_retry(analyzer.as_ref(), &request, timeout).await
    };
    let result = tokio::select! {
        biased;
        _ = signalled(&mut cancel) => None,
        result = work => Some(result),
    };

    let outcome = match result {
        Some(Ok(insight)) => {
            alert.enrich(insight.root_cause, insight.recommendation, i64::from(insight.urgency));
            Outcome::Enriched
        }
        Some(Err(reason)) => {
            warn!(alert_id = %alert.id, alert_type = alert.alert_type.as_str(), reason = %reason, "Insight unavailable, publishing degraded alert");
            alert.degrade();
            Outcome::Degraded
        }
        None => {
            debug!(alert_id = %alert.id, "Escalation cancelled");
            alert.degrade();
            Outcome::Cancelled
        }
    };

    record_escalation(outcome.as_str());
    publisher.publish(Record::Alert(alert)).await;
    outcome
}

/// One attempt plus one retry for retryable failures and timeouts.
async fn analyze_with_retry(
    analyzer: &dyn InsightAnalyzer,
    request: &InsightRequest,
    timeout: Duration,
) -> Result<Insight, String> {
    let mut last_error = String::new();
    for attempt in 1..=2u32 {
        match tokio::time::timeout(timeout, analyzer.analyze(request)).await {
            Ok(Ok(insight)) => return Ok(insight),
            Ok(Err(e)) => {
                last_error = e.to_string();
                if !e.is_retryable() {
                    break;
                }
            }
            Err(_) => {
                last_error = format!("timed out after {:?}", timeout);
            }
        }
        debug!(attempt, analyzer = analyzer.name(), error = %last_error, "Insight attempt failed");
    }
    Err(last_error)
}
