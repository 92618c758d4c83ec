//! Parade Output - Sinks and ordered multi-sink composition
//!
//! Every sink implements [`OutputWriter`]. [`CombinedWriter`] fans calls out
//! to several sinks while keeping one total order of calls per sink, and
//! [`ReportWriter`] turns audit reports into header and row writes.

mod combine;
mod csv;
mod jsonl;
mod memory;
mod report_writer;

use std::sync::Arc;
use tracing::info;

pub use combine::CombinedWriter;
pub use csv::{make_row, CsvSink};
pub use jsonl::JsonLinesSink;
pub use memory::{MemorySink, SinkRecord};
pub use report_writer::ReportWriter;

use parade_common::{OutputTarget, OutputWriter, SinkError};

/// Open a sink for every target, in order.
pub async fn build_sinks(targets: &[OutputTarget]) -> Result<Vec<Arc<dyn OutputWriter>>, SinkError> {
    let mut sinks: Vec<Arc<dyn OutputWriter>> = Vec::with_capacity(targets.len());
    for target in targets {
        info!(%target, "opening output");
        let sink: Arc<dyn OutputWriter> = match target {
            OutputTarget::Csv(path) => Arc::new(CsvSink::create(path).await?),
            OutputTarget::JsonLines(path) => Arc::new(JsonLinesSink::create(path).await?),
        };
        sinks.push(sink);
    }
    Ok(sinks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_one_sink_per_target() {
        let dir = tempfile::tempdir().unwrap();
        let targets = [
            OutputTarget::from_path(dir.path().join("a.csv")).unwrap(),
            OutputTarget::from_path(dir.path().join("out/b.jsonl")).unwrap(),
        ];
        let sinks = build_sinks(&targets).await.unwrap();
        assert_eq!(sinks.len(), 2);
        assert!(sinks[0].name().ends_with("a.csv"));
        assert!(dir.path().join("out/b.jsonl").exists());
    }
}
