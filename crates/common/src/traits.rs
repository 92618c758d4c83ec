//! Collaborator traits for the Parade pipeline
//!
//! Discovery sources push URLs, output sinks receive ordered writes.

use async_trait::async_trait;

use crate::error::{DiscoveryError, SinkError};
use crate::report::Column;
use crate::types::RunInfo;

/// External source of URLs to audit.
///
/// `discover` calls `emit` zero or more times and returns once no further
/// URLs will be produced. An `Err` is fatal to the run.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn discover(&self, emit: &mut (dyn FnMut(String) + Send)) -> Result<(), DiscoveryError>;

    /// Short identifier used in logs.
    fn name(&self) -> &str;
}

/// A single stateful, append-only output destination.
///
/// Callers guarantee `write_header` happens before any `add_entry`, and that
/// calls are not issued concurrently on the same sink.
#[async_trait]
pub trait OutputWriter: Send + Sync {
    /// Sink name used in logs and error messages
    fn name(&self) -> &str;

    async fn write_header(&self, columns: &[Column]) -> Result<(), SinkError>;

    /// Sinks without a place for run metadata ignore it.
    async fn write_run_info(&self, _info: &RunInfo) -> Result<(), SinkError> {
        Ok(())
    }

    async fn add_entry(&self, url: &str, values: &[String]) -> Result<(), SinkError>;

    /// Flush and release the underlying resource.
    async fn complete(&self) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ListDiscovery(Vec<&'static str>);

    #[async_trait]
    impl Discovery for ListDiscovery {
        async fn discover(
            &self,
            emit: &mut (dyn FnMut(String) + Send),
        ) -> Result<(), DiscoveryError> {
            for url in &self.0 {
                emit((*url).to_string());
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "list"
        }
    }

    #[tokio::test]
    async fn test_discovery_trait() {
        let discovery = ListDiscovery(vec!["https://a.example/", "https://b.example/"]);
        let mut seen: Vec<String> = Vec::new();
        discovery
            .discover(&mut |url: String| seen.push(url))
            .await
            .unwrap();
        assert_eq!(seen, ["https://a.example/", "https://b.example/"]);
    }
}
