//! JSON-lines sink
//!
//! One object per call, tagged by `kind`: `header`, `runInfo` or `entry`.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use parade_common::{Column, OutputWriter, RunInfo, SinkError};

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum Line<'a> {
    Header { columns: &'a [Column] },
    RunInfo { run: &'a RunInfo },
    Entry { url: &'a str, values: &'a [String] },
}

pub struct JsonLinesSink {
    name: String,
    path: PathBuf,
    file: Mutex<Option<BufWriter<File>>>,
}

impl JsonLinesSink {
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

    async fn write_line(&self, line: &Line<'_>) -> Result<(), SinkError> {
        let mut encoded = serde_json::to_string(line).map_err(|source| SinkError::Serialize {
            sink: self.name.clone(),
            source,
        })?;
        encoded.push('\n');

        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| SinkError::Completed(self.name.clone()))?;
        let io = |source| SinkError::Io {
            sink: self.name.clone(),
            source,
        };
        file.write_all(encoded.as_bytes()).await.map_err(io)?;
        file.flush().await.map_err(io)
    }
}

#[async_trait]
impl OutputWriter for JsonLinesSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_header(&self, columns: &[Column]) -> Result<(), SinkError> {
        self.write_line(&Line::Header { columns }).await
    }

    async fn write_run_info(&self, info: &RunInfo) -> Result<(), SinkError> {
        self.write_line(&Line::RunInfo { run: info }).await
    }

    async fn add_entry(&self, url: &str, values: &[String]) -> Result<(), SinkError> {
        self.write_line(&Line::Entry { url, values }).await
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
