//! Background publisher, the only writer to the sink.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::metrics::{record_dropped, record_published};
use crate::retry::{Attempted, Backoff, LogThrottle};
use crate::sink::{Record, RecordSink};

/// Publisher settings.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Retries of a transient write failure before the record is dropped
    pub max_retries: u32,
    pub base_delay: Duration,
    pub queue_capacity: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            queue_capacity: 1024,
        }
    }
}

/// Outcome of a publisher run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub written: u64,
    pub dropped_invalid: u64,
    pub dropped_failed: u64,
}

/// Cloneable entry point for queuing records.
#[derive(Clone)]
pub struct PublisherHandle {
    tx: mpsc::Sender<Record>,
}

impl PublisherHandle {
    /// Queue a record. Waits while the queue is full.
    pub async fn publish(&self, record: Record) {
        if let Err(mpsc::error::SendError(record)) = self.tx.send(record).await {
            warn!(kind = record.kind(), "Publisher stopped, record dropped");
            record_dropped(record.kind(), "closed");
        }
    }
}

/// Background task draining the record queue into a sink.
pub struct Publisher {
    handle: PublisherHandle,
    task: JoinHandle<PublishReport>,
}

impl Publisher {
    pub fn spawn(sink: Arc<dyn RecordSink>, config: PublisherConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let task = tokio::spawn(run(sink, config, rx));
        Self {
            handle: PublisherHandle { tx },
            task,
        }
    }

    pub fn handle(&self) -> PublisherHandle {
        self.handle.clone()
    }

    /// Wait for every queued record to be handled.
    ///
    /// Returns once all handles are dropped and the queue is empty.
    pub async fn finish(self) -> PublishReport {
        drop(self.handle);
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Publisher task failed");
                PublishReport::default()
            }
        }
    }
}

async fn run(
    sink: Arc<dyn RecordSink>,
    config: PublisherConfig,
    mut rx: mpsc::Receiver<Record>,
) -> PublishReport {
    let backoff = Backoff::new(format!("{}_write", sink.name()), config.max_retries, config.base_delay);
    let mut throttle = LogThrottle::new(5);
    let mut report = PublishReport::default();

    while let Some(record) = rx.recv().await {
        let kind = record.kind();
        if let Err(e) = record.validate() {
            warn!(kind, error = %e, "Dropping invalid record");
            record_dropped(kind, "invalid");
            report.dropped_invalid += 1;
            continue;
        }

        match backoff.run(|| sink.write(&record), EngineError::is_retryable).await {
            Attempted::Done(()) => {
                report.written += 1;
                record_published(kind);
                throttle.success();
            }
            Attempted::GaveUp { error, tries } => {
                report.dropped_failed += 1;
                record_dropped(kind, "write_failed");
                if throttle.failure() {
                    error!(
                        kind,
                        sink = sink.name(),
                        tries,
                        error = %error,
                        "Dropping record after failed writes"
                    );
                }
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(sink = sink.name(), error = %e, "Sink flush failed");
    }
    info!(
        sink = sink.name(),
        written = report.written,
        dropped_invalid = report.dropped_invalid,
        dropped_failed = report.dropped_failed,
        "Publisher drained"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineResult;
    use crate::sink::MemorySink;
    use async_trait::async_trait;
    use chrono::Utc;
    use resto_models::RealtimeMetrics;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` writes.
    struct FlakySink {
        failures: u32,
        calls: AtomicU32,
        retryable: bool,
    }

    #[async_trait]
    impl RecordSink for FlakySink {
        async fn write(&self, _record: &Record) -> EngineResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.retryable {
                    Err(EngineError::sink_failed("503"))
                } else {
                    Err(EngineError::invalid_record("rejected"))
                }
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn fast() -> PublisherConfig {
        PublisherConfig {
            base_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn realtime() -> Record {
        Record::Realtime(RealtimeMetrics::empty(Utc::now()))
    }

    #[tokio::test]
    async fn test_invalid_records_are_dropped() {
        let sink = Arc::new(MemorySink::new());
        let publisher = Publisher::spawn(sink.clone(), fast());

        let mut bad = RealtimeMetrics::empty(Utc::now());
        bad.angry_pct = -1.0;
        publisher.handle().publish(Record::Realtime(bad)).await;
        publisher.handle().publish(realtime()).await;

        let report = publisher.finish().await;
        assert_eq!(report.written, 1);
        assert_eq!(report.dropped_invalid, 1);
        assert_eq!(sink.count("realtime"), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let sink = Arc::new(FlakySink {
            failures: 2,
            calls: AtomicU32::new(0),
            retryable: true,
        });
        let publisher = Publisher::spawn(sink.clone(), fast());
        publisher.handle().publish(realtime()).await;

        let report = publisher.finish().await;
        assert_eq!(report.written, 1);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let sink = Arc::new(FlakySink {
            failures: 10,
            calls: AtomicU32::new(0),
            retryable: true,
        });
        let publisher = Publisher::spawn(sink.clone(), fast());
        publisher.handle().publish(realtime()).await;

        let report = publisher.finish().await;
        assert_eq!(report.dropped_failed, 1);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let sink = Arc::new(FlakySink {
            failures: 1,
            calls: AtomicU32::new(0),
            retryable: false,
        });
        let publisher = Publisher::spawn(sink.clone(), fast());
        publisher.handle().publish(realtime()).await;

        let report = publisher.finish().await;
        assert_eq!(report.dropped_failed, 1);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }
}
