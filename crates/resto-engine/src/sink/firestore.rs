use async_trait::async_trait;

use resto_firestore::InsightRepository;

use super::{Record, RecordSink};
use crate::error::EngineResult;

/// Writes records to the dashboard collections.
///
/// Each write is a single attempt; retries belong to the publisher.
pub struct FirestoreSink {
    repo: InsightRepository,
}

impl FirestoreSink {
    pub fn new(repo: InsightRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl RecordSink for FirestoreSink {
    async fn write(&self, record: &Record) -> EngineResult<()> {
        match record {
            Record::Snapshot(s) => self.repo.put_snapshot(s).await?,
            Record::Sentiment(s) => self.repo.put_sentiment(s).await?,
            Record::Alert(a) => self.repo.create_alert(a).await?,
            Record::StaffScore(s) => self.repo.put_staff_score(s).await?,
            Record::Table(t) => self.repo.put_table(t).await?,
            Record::Realtime(m) => self.repo.put_realtime(m).await?,
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "firestore"
    }
}
