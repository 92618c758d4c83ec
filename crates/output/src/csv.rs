//! Delimited-file sink
//!
//! Layout: a category row, a column-name row, then one row per URL.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use parade_common::{Column, OutputWriter, SinkError};

pub struct CsvSink {
    name: String,
    path: PathBuf,
    file: Mutex<Option<BufWriter<File>>>,
}

impl CsvSink {
    /// Create (or truncate) the file, creating parent directories as needed.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let name = path.display().to_string();
        let io = |source| SinkError::Io {
            sink: name.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io)?;
        }
        let file = File::create(&path).await.map_err(io)?;
        Ok(Self {
            name,
            path,
            file: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_rows(&self, rows: &[Vec<String>]) -> Result<(), SinkError> {
        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| SinkError::Completed(self.name.clone()))?;
        let mut buf = String::new();
        for row in rows {
            buf.push_str(&make_row(row));
        }
        let io = |source| SinkError::Io {
            sink: self.name.clone(),
            source,
        };
        // A call is only acknowledged once its line reached the file.
        file.write_all(buf.as_bytes()).await.map_err(io)?;
        file.flush().await.map_err(io)
    }
}

#[async_trait]
impl OutputWriter for CsvSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_header(&self, columns: &[Column]) -> Result<(), SinkError> {
        let categories: Vec<String> = std::iter::once(String::new())
            .chain(columns.iter().map(|c| c.category.clone()))
            .collect();
        let names: Vec<String> = std::iter::once("URL".to_string())
            .chain(columns.iter().map(Column::label))
            .collect();
        self.write_rows(&[categories, names]).await
    }

    async fn add_entry(&self, url: &str, values: &[String]) -> Result<(), SinkError> {
        let row: Vec<String> = std::iter::once(url.to_string())
            .chain(values.iter().cloned())
            .collect();
        self.write_rows(&[row]).await
    }

    async fn complete(&self) -> Result<(), SinkError> {
        let Some(mut file) = self.file.lock().await.take() else {
            return Ok(());
        };
        let io = |source| SinkError::Io {
            sink: self.name.clone(),
            source,
        };
        file.flush().await.map_err(io)?;
        file.shutdown().await.map_err(io)
    }
}

/// Join cells into one line, quoting cells that need it.
pub fn make_row(cells: &[String]) -> String {
    let mut line = cells
        .iter()
        .map(|c| escape(c))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parade_common::ColumnField;

    fn column(name: &str, detail: Option<&str>, category: &str) -> Column {
        Column {
            name: name.into(),
            detail: detail.map(Into::into),
            category: category.into(),
            field: ColumnField::CategoryScore {
                category: category.to_lowercase(),
            },
        }
    }

    #[test]
    fn escapes_cells() {
        let cells = ["plain", "a,b", "say \"hi\"", "two\nlines"].map(String::from);
        let row = make_row(&cells);
        assert_eq!(row, "plain,\"a,b\",\"say \"\"hi\"\"\",\"two\nlines\"\n");
    }

    #[tokio::test]
    async fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.csv");
        let sink = CsvSink::create(&path).await.unwrap();

        let columns = [
            column("Performance", Some("overall score"), "Performance"),
            column("Speed Index", Some("millisecond"), "Performance"),
        ];
        sink.write_header(&columns).await.unwrap();
        sink.add_entry("https://a.example/", &["0.9".to_string(), "1200".to_string()])
            .await
            .unwrap();
        sink.add_entry("https://b.example/?q=1,2", &[String::new(), String::new()])
            .await
            .unwrap();
        sink.complete().await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            ",Performance,Performance\n\
             URL,Performance (overall score),Speed Index (millisecond)\n\
             https://a.example/,0.9,1200\n\
             \"https://b.example/?q=1,2\",,\n"
        );
    }

    #[tokio::test]
    async fn acknowledged_rows_survive_without_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let sink = CsvSink::create(&path).await.unwrap();

        sink.write_header(&[column("Performance", Some("overall score"), "Performance")])
            .await
            .unwrap();
        for i in 0..5 {
            sink.add_entry(&format!("https://a.example/{i}"), &["0.5".to_string()])
                .await
                .unwrap();
        }
        drop(sink);

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 7);
        assert!(written.ends_with("https://a.example/4,0.5\n"));
    }

    #[tokio::test]
    async fn rejects_writes_after_complete() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::create(dir.path().join("r.csv")).await.unwrap();
        sink.complete().await.unwrap();
        sink.complete().await.unwrap();
        assert!(matches!(
            sink.add_entry("https://a.example/", &[]).await,
            Err(SinkError::Completed(_))
        ));
    }
}
