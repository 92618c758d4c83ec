//! Fan-out writer over several sinks
//!
//! Calls are serialized: each one holds a fair mutex while it is forwarded to
//! every sink concurrently, so call k+1 reaches no sink before call k has
//! settled on all of them. Each sink therefore sees the calls in issue order.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use parade_common::{Column, OutputWriter, RunInfo, SinkError, SinkFailurePolicy};

pub struct CombinedWriter {
    sinks: Vec<Arc<dyn OutputWriter>>,
    policy: SinkFailurePolicy,
    /// Per-sink "has failed" flags; the lock doubles as the call chain.
    failed: Mutex<Vec<bool>>,
}

impl CombinedWriter {
    pub fn new(sinks: Vec<Arc<dyn OutputWriter>>, policy: SinkFailurePolicy) -> Self {
        let failed = Mutex::new(vec![false; sinks.len()]);
        Self {
            sinks,
            policy,
            failed,
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Names of sinks that have failed at least once.
    pub async fn failed_sinks(&self) -> Vec<String> {
        let failed = self.failed.lock().await;
        self.sinks
            .iter()
            .zip(failed.iter())
            .filter(|(_, failed)| **failed)
            .map(|(sink, _)| sink.name().to_string())
            .collect()
    }

    fn active(&self, failed: &[bool]) -> Vec<usize> {
        (0..self.sinks.len())
            .filter(|&i| !(failed[i] && self.policy == SinkFailurePolicy::ExcludeFailed))
            .collect()
    }

    fn settle(
        &self,
        op: &str,
        failed: &mut [bool],
        active: &[usize],
        results: Vec<Result<(), SinkError>>,
    ) -> Result<(), SinkError> {
        let mut errors = Vec::new();
        for (&i, result) in active.iter().zip(results) {
            if let Err(e) = result {
                let sink = self.sinks[i].name();
                if !failed[i] && self.policy == SinkFailurePolicy::ExcludeFailed {
                    warn!(sink, "{op} failed, excluding sink from further writes: {e}");
                } else {
                    warn!(sink, "{op} failed: {e}");
                }
                failed[i] = true;
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SinkError::Partial(errors))
        }
    }
}

#[async_trait]
impl OutputWriter for CombinedWriter {
    fn name(&self) -> &str {
        "combined"
    }

    async fn write_header(&self, columns: &[Column]) -> Result<(), SinkError> {
        let mut failed = self.failed.lock().await;
        let active = self.active(&failed);
        let results = join_all(active.iter().map(|&i| self.sinks[i].write_header(columns))).await;
        self.settle("write_header", &mut failed, &active, results)
    }

    async fn write_run_info(&self, info: &RunInfo) -> Result<(), SinkError> {
        let mut failed = self.failed.lock().await;
        let active = self.active(&failed);
        let results = join_all(active.iter().map(|&i| self.sinks[i].write_run_info(info))).await;
        self.settle("write_run_info", &mut failed, &active, results)
    }

    async fn add_entry(&self, url: &str, values: &[String]) -> Result<(), SinkError> {
        let mut failed = self.failed.lock().await;
        let active = self.active(&failed);
        let results =
            join_all(active.iter().map(|&i| self.sinks[i].add_entry(url, values))).await;
        self.settle("add_entry", &mut failed, &active, results)
    }

    async fn complete(&self) -> Result<(), SinkError> {
        let mut failed = self.failed.lock().await;
        let active = self.active(&failed);
        let results = join_all(active.iter().map(|&i| self.sinks[i].complete())).await;
        self.settle("complete", &mut failed, &active, results)
    }
}
