//! Lighthouse CLI backend used inside worker processes

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

use parade_common::{AuditReport, AuditSettings, FormFactor};

/// Something that can audit one URL inside the worker.
#[async_trait]
pub trait AuditBackend: Send + Sync {
    async fn audit(&self, url: &str, settings: &AuditSettings) -> Result<AuditReport, String>;
}

/// Runs `<engine> <url> --output=json --output-path=stdout ...` per audit.
#[derive(Debug, Clone, Default)]
pub struct LighthouseCli;

impl LighthouseCli {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Arguments passed to the engine for one audit.
    #[must_use]
    pub fn args(url: &str, settings: &AuditSettings) -> Vec<String> {
        let mut args = vec![
            url.to_string(),
            "--output=json".to_string(),
            "--output-path=stdout".to_string(),
            "--quiet".to_string(),
        ];
        match settings.form_factor {
            FormFactor::Desktop => args.push("--preset=desktop".to_string()),
            FormFactor::Mobile => args.push("--form-factor=mobile".to_string()),
        }
        if !settings.chrome_flags.is_empty() {
            args.push(format!("--chrome-flags={}", settings.chrome_flags.join(" ")));
        }
        if !settings.only_categories.is_empty() {
            args.push(format!(
                "--only-categories={}",
                settings.only_categories.join(",")
            ));
        }
        args.extend(settings.extra_args.iter().cloned());
        args
    }
}

#[async_trait]
impl AuditBackend for LighthouseCli {
    #[instrument(skip(self, settings))]
    async fn audit(&self, url: &str, settings: &AuditSettings) -> Result<AuditReport, String> {
        let output = Command::new(&settings.engine)
            .args(Self::args(url, settings))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {e}", settings.engine))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no error output");
            return Err(format!("{} exited with {}: {reason}", settings.engine, output.status));
        }

        debug!(bytes = output.stdout.len(), "engine produced report");
        let report: AuditReport = serde_json::from_slice(&output.stdout)
            .map_err(|e| format!("engine output is not a report: {e}"))?;
        if !report.is_well_formed() {
            return Err("engine produced a report without categories".to_string());
        }
        Ok(report)
    }
}

/// `<engine> --version`, or `?` if it cannot be determined within two seconds.
pub async fn engine_version(engine: &str) -> String {
    let run = Command::new(engine)
        .arg("--version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();
    match tokio::time::timeout(Duration::from_secs(2), run).await {
        Ok(Ok(output)) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if version.is_empty() {
                "?".to_string()
            } else {
                version
            }
        }
        _ => "?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_mobile_args() {
        let args = LighthouseCli::args("https://a.example/", &AuditSettings::default());
        assert_eq!(
            args,
            [
                "https://a.example/",
                "--output=json",
                "--output-path=stdout",
                "--quiet",
                "--form-factor=mobile",
                "--chrome-flags=--headless --no-first-run",
            ]
        );
    }

    #[test]
    fn builds_desktop_args_with_categories() {
        let settings = AuditSettings {
            form_factor: FormFactor::Desktop,
            only_categories: vec!["performance".into(), "seo".into()],
            chrome_flags: Vec::new(),
            extra_args: vec!["--throttling-method=provided".into()],
            ..AuditSettings::default()
        };
        let args = LighthouseCli::args("https://a.example/", &settings);
        assert!(args.contains(&"--preset=desktop".to_string()));
        assert!(args.contains(&"--only-categories=performance,seo".to_string()));
        assert_eq!(args.last().unwrap(), "--throttling-method=provided");
        assert!(!args.iter().any(|a| a.starts_with("--chrome-flags")));
    }

    #[tokio::test]
    async fn unknown_engine_version_is_placeholder() {
        assert_eq!(engine_version("/nonexistent/lighthouse").await, "?");
    }

    #[tokio::test]
    async fn missing_engine_fails_audit() {
        let settings = AuditSettings {
            engine: "/nonexistent/lighthouse".into(),
            ..AuditSettings::default()
        };
        let err = LighthouseCli::new()
            .audit("https://a.example/", &settings)
            .await
            .unwrap_err();
        assert!(err.contains("failed to run"));
    }
}
