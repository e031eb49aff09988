//! Append-only JSON-lines sink.
//!
//! Each record becomes one line tagged with its kind, so a run can be
//! replayed or inspected with `jq` without a database.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::info;

use super::{Record, RecordSink};
use crate::error::EngineResult;

/// Appends one JSON object per record to a local file.
pub struct JsonlSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    pub async fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        info!(path = %path.display(), "Opened JSONL sink");
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for JsonlSink {
    async fn write(&self, record: &Record) -> EngineResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.writer.lock().await.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&self) -> EngineResult<()> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use resto_models::RealtimeMetrics;

    #[tokio::test]
    async fn test_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("records.jsonl");

        let sink = JsonlSink::open(&path).await.unwrap();
        sink.write(&Record::Realtime(RealtimeMetrics::empty(Utc::now()))).await.unwrap();
        sink.write(&Record::Realtime(RealtimeMetrics::empty(Utc::now()))).await.unwrap();
        sink.flush().await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: Record = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.kind(), "realtime");
    }
}
