// crates/orchestrator/src/orchestrator.rs
//! Orchestrator - drives discovery, the runner pool and the output writer

use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use parade_common::{Discovery, ParadeResult, RunError, RunInfo, RunOptions, RunSummary};
use parade_output::ReportWriter;

use crate::queue::queue;
use crate::runner_pool::{Runner, RunnerPool};
use crate::state::StateTracker;

/// Runs one audit per discovered URL with at most `max_concurrency` in flight.
pub struct Orchestrator {
    options: RunOptions,
    pool: Arc<RunnerPool>,
    writer: Arc<ReportWriter>,
    tracker: Arc<StateTracker>,
    run_info: Option<RunInfo>,
}

impl Orchestrator {
    pub fn new(options: RunOptions, pool: Arc<RunnerPool>, writer: Arc<ReportWriter>) -> Self {
        Self {
            options,
            pool,
            writer,
            tracker: Arc::new(StateTracker::new()),
            run_info: None,
        }
    }

    /// Metadata written to the sinks before any result.
    #[must_use]
    pub fn with_run_info(mut self, info: RunInfo) -> Self {
        self.run_info = Some(info);
        self
    }

    #[must_use]
    pub fn tracker(&self) -> Arc<StateTracker> {
        Arc::clone(&self.tracker)
    }

    #[must_use]
    pub fn pool(&self) -> Arc<RunnerPool> {
        Arc::clone(&self.pool)
    }

    /// Audit every URL `discovery` produces and write the results.
    ///
    /// Individual audit failures are recorded in the tracker and never abort
    /// the run. A discovery failure does: in-flight audits are cancelled and
    /// the error is returned.
    #[instrument(skip_all, fields(entry = %self.options.entry))]
    pub async fn run(&self, discovery: Arc<dyn Discovery>) -> ParadeResult<RunSummary> {
        let started = Instant::now();
        info!(
            source = discovery.name(),
            max_concurrency = self.pool.max_concurrency(),
            "starting run"
        );

        if let Some(info) = &self.run_info {
            if let Err(e) = self.writer.write_run_info(info).await {
                warn!("failed to write run info: {e}");
            }
        }

        let (mut producer, mut consumer) = queue::<String>();
        let tracker = Arc::clone(&self.tracker);
        producer.on_item_added(move |url| {
            tracker.mark_pending(url);
        });

        let discovering = tokio::spawn(async move {
            let result = discovery
                .discover(&mut |url: String| producer.push([url]))
                .await;
            producer.finish();
            result
        });

        let mut units = JoinSet::new();
        while let Some(url) = consumer.next().await {
            let runner = match self.pool.get_next_available().await {
                Ok(runner) => runner,
                Err(e) => {
                    warn!(%url, "no runner available: {e}");
                    self.tracker.mark_failure(&url, e);
                    continue;
                }
            };
            self.tracker.mark_in_progress(&url);
            units.spawn(audit_unit(
                runner,
                url,
                Arc::clone(&self.tracker),
                Arc::clone(&self.writer),
            ));
        }

        let discovered = match discovering.await {
            Ok(result) => result.map_err(RunError::from),
            Err(e) => Err(RunError::Join(e.to_string())),
        };
        if let Err(e) = discovered {
            error!("{e}, cancelling in-flight audits");
            units.abort_all();
            while units.join_next().await.is_some() {}
            if let Err(e) = self.writer.complete().await {
                warn!("failed to complete output: {e}");
            }
            self.pool.close().await;
            return Err(e);
        }

        while let Some(joined) = units.join_next().await {
            if let Err(e) = joined {
                error!("audit task failed: {e}");
            }
        }

        if let Err(e) = self.writer.complete().await {
            error!("failed to complete output: {e}");
        }
        self.pool.close().await;

        let summary = self.tracker.summary();
        if summary.is_empty() {
            warn!("no pages were found");
        } else {
            self.tracker.log_summary();
        }
        info!(
            elapsed = ?started.elapsed(),
            rows = self.writer.rows_written(),
            engines = self.pool.created(),
            "run finished"
        );
        Ok(summary)
    }
}

/// Audit one URL on `runner` and record the outcome.
async fn audit_unit(
    runner: Runner,
    url: String,
    tracker: Arc<StateTracker>,
    writer: Arc<ReportWriter>,
) {
    // `run` hands the runner back before returning, so the next URL can start
    // while this one is being written.
    match runner.run(&url).await {
        Ok(report) => {
            if let Err(e) = writer.add_report(&url, &report).await {
                warn!(%url, "failed to write results: {e}");
            }
            tracker.mark_success(&url);
        }
        Err(e) => {
            warn!(%url, "audit failed: {e}");
            tracker.mark_failure(&url, e);
        }
    }
}
