//! Adapter from audit reports to column-oriented writes

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use parade_common::{
    derive_columns, row_values, AuditReport, Column, OutputWriter, RunInfo, SinkError,
};

/// Derives the column set from the first report it sees, writes the header
/// once, and turns every report into one row.
pub struct ReportWriter {
    writer: Arc<dyn OutputWriter>,
    columns: Mutex<Option<Vec<Column>>>,
    rows: AtomicUsize,
}

impl ReportWriter {
    pub fn new(writer: Arc<dyn OutputWriter>) -> Self {
        Self {
            writer,
            columns: Mutex::new(None),
            rows: AtomicUsize::new(0),
        }
    }

    /// Write one report as a row, writing the header first if this is the
    /// first report.
    ///
    /// The column set is fixed even when the header write fails, and the row
    /// is still attempted; both errors are returned together.
    pub async fn add_report(&self, url: &str, report: &AuditReport) -> Result<(), SinkError> {
        let (values, header_error) = {
            let mut latch = self.columns.lock().await;
            let mut header_error = None;
            if latch.is_none() {
                let columns = derive_columns(report);
                info!(columns = columns.len(), "writing report header");
                if let Err(e) = self.writer.write_header(&columns).await {
                    header_error = Some(e);
                }
                *latch = Some(columns);
            }
            let columns = latch.as_deref().unwrap_or_default();
            (row_values(columns, report), header_error)
        };

        let row = self.writer.add_entry(url, &values).await;
        if row.is_ok() {
            self.rows.fetch_add(1, Ordering::Relaxed);
            debug!(url, "row written");
        }
        match (header_error, row) {
            (None, row) => row,
            (Some(e), Ok(())) => Err(e),
            (Some(header), Err(row)) => Err(SinkError::Partial(vec![header, row])),
        }
    }

    pub async fn write_run_info(&self, info: &RunInfo) -> Result<(), SinkError> {
        self.writer.write_run_info(info).await
    }

    pub async fn complete(&self) -> Result<(), SinkError> {
        self.writer.complete().await
    }

    /// Columns fixed by the first report, if any report has arrived.
    pub async fn columns(&self) -> Option<Vec<Column>> {
        self.columns.lock().await.clone()
    }

    pub async fn header_written(&self) -> bool {
        self.columns.lock().await.is_some()
    }

    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows.load(Ordering::Relaxed)
    }
}
