use std::sync::Mutex;

use async_trait::async_trait;

use resto_models::{Alert, StaffDailyScore, TableSummary};

use super::{Record, RecordSink};
use crate::error::{EngineError, EngineResult};

/// Keeps records in memory, in write order.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::Alert(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn staff_scores(&self) -> Vec<StaffDailyScore> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::StaffScore(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn tables(&self) -> Vec<TableSummary> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::Table(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.records().iter().filter(|r| r.kind() == kind).count()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn write(&self, record: &Record) -> EngineResult<()> {
        self.records
            .lock()
            .map_err(|_| EngineError::sink_failed("memory sink poisoned"))?
            .push(record.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use resto_models::{AlertType, RealtimeMetrics, Severity};
    use tokio_test::{assert_ok, block_on};

    #[test]
    fn test_records_keep_write_order() {
        let sink = MemorySink::new();
        let alert = Alert::new(2, AlertType::GuestAngry, Severity::Warning, "Guest 1 angry", Utc::now());

        assert_ok!(block_on(sink.write(&Record::Realtime(RealtimeMetrics::empty(Utc::now())))));
        assert_ok!(block_on(sink.write(&Record::Alert(alert.clone()))));

        assert_eq!(sink.records().len(), 2);
        assert_eq!(sink.records()[0].kind(), "realtime");
        assert_eq!(sink.alerts(), vec![alert]);
        assert_eq!(sink.count("alert"), 1);
        assert!(sink.tables().is_empty());
    }
}
