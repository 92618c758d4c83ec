//! Parade Orchestrator - Discovery-to-output pipeline with bounded concurrency
//!
//! URLs flow from a [`Discovery`](parade_common::Discovery) source through a
//! backpressure [`queue`], are audited on runners leased from the
//! [`RunnerPool`], and land in a [`ReportWriter`](parade_output::ReportWriter).
//! The [`StateTracker`] records every URL's lifecycle.

mod orchestrator;
pub mod queue;
pub mod runner_pool;
mod state;

pub use orchestrator::Orchestrator;
pub use queue::{queue, QueueConsumer, QueueProducer};
pub use runner_pool::{Runner, RunnerPool};
pub use state::StateTracker;
