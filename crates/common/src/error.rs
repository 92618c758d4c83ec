//! Error types for Parade
//!
//! Per-URL audit failures are recoverable and carried as data; discovery and
//! configuration failures abort a run.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single audit. Never aborts the run.
///
/// `Clone` so the same error can be stored in the state tracker and logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit engine reported an error: {0}")]
    Engine(String),

    #[error("audit engine (runner {runner}) exited before producing a report")]
    EngineExited { runner: usize },

    #[error("audit timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to start audit engine: {0}")]
    Spawn(String),

    #[error("malformed response from audit engine: {0}")]
    MalformedResponse(String),

    #[error("runner pool is closed")]
    PoolClosed,
}

impl AuditError {
    /// Whether the engine instance that produced this error can still be trusted
    /// with another audit.
    #[must_use]
    pub const fn is_engine_fatal(&self) -> bool {
        matches!(
            self,
            AuditError::EngineExited { .. }
                | AuditError::Timeout(_)
                | AuditError::MalformedResponse(_)
        )
    }
}

/// Failure reported by an output sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error in sink '{sink}': {source}")]
    Io {
        sink: String,
        #[source]
        source: io::Error,
    },

    #[error("serialization error in sink '{sink}': {source}")]
    Serialize {
        sink: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("sink '{0}' was already completed")]
    Completed(String),

    #[error("{} sink(s) failed: {}", .0.len(), join_messages(.0))]
    Partial(Vec<SinkError>),
}

fn join_messages(errors: &[SinkError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fatal failure of the discovery collaborator.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("I/O error while reading URLs: {0}")]
    Io(#[from] io::Error),

    #[error("invalid entry URL '{url}': {reason}")]
    InvalidEntry { url: String, reason: String },

    #[error("invalid path glob '{glob}': {reason}")]
    InvalidGlob { glob: String, reason: String },

    #[error("discovery task failed: {0}")]
    Task(String),
}

/// Invalid run configuration, surfaced before any work starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("maximum concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("invalid output '{0}': expected <file>.csv, <file>.jsonl or <file>.ndjson")]
    InvalidOutput(String),

    #[error("no outputs configured")]
    NoOutputs,
}

/// Top-level failure of an orchestrated run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("output error: {0}")]
    Sink(#[from] SinkError),

    #[error("discovery task did not finish: {0}")]
    Join(String),
}

/// Result type alias for run-level operations
pub type ParadeResult<T> = Result<T, RunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_fatal_classification() {
        assert!(AuditError::EngineExited { runner: 0 }.is_engine_fatal());
        assert!(AuditError::Timeout(Duration::from_secs(1)).is_engine_fatal());
        assert!(!AuditError::Engine("bad url".into()).is_engine_fatal());
        assert!(!AuditError::PoolClosed.is_engine_fatal());
    }

    #[test]
    fn partial_sink_error_lists_every_failure() {
        let err = SinkError::Partial(vec![
            SinkError::Completed("a.csv".into()),
            SinkError::Completed("b.jsonl".into()),
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 sink(s) failed"));
        assert!(msg.contains("a.csv"));
        assert!(msg.contains("b.jsonl"));
    }
}
