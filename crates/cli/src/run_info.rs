//! Run metadata written alongside the results

use chrono::Local;
use uuid::Uuid;

use parade_common::{RunInfo, RunVersions, SystemInfo};
use parade_engine::engine_version;

/// Collect metadata for the current run. Never fails: unknown values are `?`.
pub async fn gather(engine: &str) -> RunInfo {
    let command = std::env::args().collect::<Vec<_>>().join(" ");
    RunInfo {
        id: Uuid::new_v4(),
        command,
        time: Local::now().to_rfc2822(),
        versions: RunVersions {
            parade: parade_common::VERSION.to_string(),
            engine: engine_version(engine).await,
        },
        system: SystemInfo {
            operating_system: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: std::thread::available_parallelism().map_or(1, |n| n.get()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gather_with_missing_engine() {
        let info = gather("/nonexistent/lighthouse").await;
        assert_eq!(info.versions.engine, "?");
        assert_eq!(info.versions.parade, parade_common::VERSION);
        assert!(info.system.cpus >= 1);
        assert!(!info.time.is_empty());
    }

    #[tokio::test]
    async fn test_rows_label_every_field() {
        let info = gather("/nonexistent/lighthouse").await;
        let rows = info.rows();
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0], ("Run ID", info.id.to_string()));
        assert!(rows.contains(&("engine version", "?".to_string())));
        assert!(rows.contains(&("CPUs", info.system.cpus.to_string())));
    }
}
