//! In-memory sink
//!
//! Records every call it receives. Used when embedding the pipeline and by
//! tests that need to observe write order.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use parade_common::{Column, OutputWriter, RunInfo, SinkError};

#[derive(Debug, Clone, PartialEq)]
pub enum SinkRecord {
    Header(Vec<String>),
    RunInfo(RunInfo),
    Entry { url: String, values: Vec<String> },
    Complete,
}

/// Cloning shares the underlying record list.
#[derive(Debug, Clone)]
pub struct MemorySink {
    name: String,
    delay: Duration,
    failing: bool,
    records: Arc<Mutex<Vec<SinkRecord>>>,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay: Duration::ZERO,
            failing: false,
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep before recording each call.
    #[inline]
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Reject every call with an I/O error. Nothing is recorded.
    #[inline]
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    #[must_use]
    pub fn records(&self) -> Vec<SinkRecord> {
        self.records.lock().clone()
    }

    /// URLs of recorded entries, in write order.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                SinkRecord::Entry { url, .. } => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, record: SinkRecord) -> Result<(), SinkError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing {
            return Err(SinkError::Io {
                sink: self.name.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "sink unavailable"),
            });
        }
        self.records.lock().push(record);
        Ok(())
    }
}

#[async_trait]
impl OutputWriter for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_header(&self, columns: &[Column]) -> Result<(), SinkError> {
        self.record(SinkRecord::Header(columns.iter().map(Column::label).collect()))
            .await
    }

    async fn write_run_info(&self, info: &RunInfo) -> Result<(), SinkError> {
        self.record(SinkRecord::RunInfo(info.clone())).await
    }

    async fn add_entry(&self, url: &str, values: &[String]) -> Result<(), SinkError> {
        self.record(SinkRecord::Entry {
            url: url.to_string(),
            values: values.to_vec(),
        })
        .await
    }

    async fn complete(&self) -> Result<(), SinkError> {
        self.record(SinkRecord::Complete).await
    }
}
