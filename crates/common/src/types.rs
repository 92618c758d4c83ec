//! Core data types for the Parade audit pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{AuditError, ConfigError};

/// Lifecycle of one URL inside a run.
///
/// Transitions only move forward: `Pending -> InProgress -> Success | Failure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlState {
    Pending,
    InProgress,
    Success,
    Failure(AuditError),
}

impl UrlState {
    #[inline]
    const fn rank(&self) -> u8 {
        match self {
            UrlState::Pending => 0,
            UrlState::InProgress => 1,
            UrlState::Success | UrlState::Failure(_) => 2,
        }
    }

    /// Whether moving from `self` to `next` is a forward transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: &UrlState) -> bool {
        next.rank() > self.rank()
    }

    #[inline]
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, UrlState::Success | UrlState::Failure(_))
    }
}

impl fmt::Display for UrlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlState::Pending => f.write_str("pending"),
            UrlState::InProgress => f.write_str("in progress"),
            UrlState::Success => f.write_str("success"),
            UrlState::Failure(e) => write!(f, "failure ({e})"),
        }
    }
}

/// Device emulation passed through to the audit engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFactor {
    #[default]
    Mobile,
    Desktop,
}

impl FormFactor {
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            FormFactor::Mobile => "mobile",
            FormFactor::Desktop => "desktop",
        }
    }
}

/// Fixed settings sent with every audit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSettings {
    /// Engine executable invoked by the worker (e.g. `lighthouse`).
    pub engine: String,
    pub form_factor: FormFactor,
    /// Restrict the audit to these categories; empty means all.
    #[serde(default)]
    pub only_categories: Vec<String>,
    #[serde(default)]
    pub chrome_flags: Vec<String>,
    /// Extra arguments forwarded verbatim to the engine.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            engine: "lighthouse".to_string(),
            form_factor: FormFactor::Mobile,
            only_categories: Vec::new(),
            chrome_flags: vec!["--headless".to_string(), "--no-first-run".to_string()],
            extra_args: Vec::new(),
        }
    }
}

/// Single output destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Csv(PathBuf),
    JsonLines(PathBuf),
}

impl OutputTarget {
    /// Pick a sink type from the file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(OutputTarget::Csv(path.to_path_buf())),
            Some("jsonl" | "ndjson") => Ok(OutputTarget::JsonLines(path.to_path_buf())),
            _ => Err(ConfigError::InvalidOutput(path.display().to_string())),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            OutputTarget::Csv(p) | OutputTarget::JsonLines(p) => p,
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path().display())
    }
}

/// What the composed writer does with a sink after it fails a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SinkFailurePolicy {
    /// Keep forwarding every call to every sink.
    #[default]
    KeepAttempting,
    /// Stop forwarding calls to a sink once it has failed.
    ExcludeFailed,
}

/// Immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub entry: String,
    pub max_concurrency: usize,
    pub outputs: Vec<OutputTarget>,
    pub audit: AuditSettings,
    pub audit_timeout: Duration,
    pub sink_failure_policy: SinkFailurePolicy,
}

impl RunOptions {
    #[must_use]
    pub fn new<S: Into<String>>(entry: S) -> Self {
        Self {
            entry: entry.into(),
            max_concurrency: default_concurrency(),
            outputs: Vec::new(),
            audit: AuditSettings::default(),
            audit_timeout: Duration::from_secs(120),
            sink_failure_policy: SinkFailurePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: OutputTarget) -> Self {
        self.outputs.push(output);
        self
    }

    #[must_use]
    pub fn with_audit_settings(mut self, audit: AuditSettings) -> Self {
        self.audit = audit;
        self
    }

    #[must_use]
    pub fn with_audit_timeout(mut self, timeout: Duration) -> Self {
        self.audit_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_sink_failure_policy(mut self, policy: SinkFailurePolicy) -> Self {
        self.sink_failure_policy = policy;
        self
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.outputs.is_empty() {
            return Err(ConfigError::NoOutputs);
        }
        Ok(())
    }
}

/// One audit per spare core, leaving one for the orchestrator and browser overhead.
#[must_use]
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Descriptive metadata about a run, written once to sinks that support it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInfo {
    pub id: Uuid,
    pub command: String,
    pub time: String,
    pub versions: RunVersions,
    pub system: SystemInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunVersions {
    pub parade: String,
    pub engine: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub operating_system: String,
    pub arch: String,
    pub cpus: usize,
}

impl RunInfo {
    /// Flatten into label/value pairs for tabular sinks.
    #[must_use]
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Run ID", self.id.to_string()),
            ("Command", self.command.clone()),
            ("Time", self.time.clone()),
            ("parade version", self.versions.parade.clone()),
            ("engine version", self.versions.engine.clone()),
            ("OS", self.system.operating_system.clone()),
            ("Arch", self.system.arch.clone()),
            ("CPUs", self.system.cpus.to_string()),
        ]
    }
}

/// Counts of URL states at the end of (or during) a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Share of settled URLs that succeeded, in [0.0, 100.0].
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let settled = self.succeeded + self.failed;
        if settled == 0 {
            0.0
        } else {
            (self.succeeded as f64 / settled as f64) * 100.0
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions_only_move_forward() {
        let failure = UrlState::Failure(AuditError::PoolClosed);
        assert!(UrlState::Pending.can_transition_to(&UrlState::InProgress));
        assert!(UrlState::InProgress.can_transition_to(&UrlState::Success));
        assert!(UrlState::InProgress.can_transition_to(&failure));
        assert!(UrlState::Pending.can_transition_to(&UrlState::Success));
        assert!(!UrlState::InProgress.can_transition_to(&UrlState::Pending));
        assert!(!UrlState::Success.can_transition_to(&failure));
        assert!(!failure.can_transition_to(&UrlState::Success));
    }

    #[test]
    fn output_target_from_extension() {
        assert_eq!(
            OutputTarget::from_path("out/report.CSV").unwrap(),
            OutputTarget::Csv(PathBuf::from("out/report.CSV"))
        );
        assert!(matches!(
            OutputTarget::from_path("report.ndjson").unwrap(),
            OutputTarget::JsonLines(_)
        ));
        assert_eq!(
            OutputTarget::from_path("report.xlsx"),
            Err(ConfigError::InvalidOutput("report.xlsx".into()))
        );
        assert!(OutputTarget::from_path("report").is_err());
    }

    #[test]
    fn run_options_validation() {
        let opts = RunOptions::new("https://a.example/");
        assert_eq!(opts.validate(), Err(ConfigError::NoOutputs));

        let opts = opts.with_output(OutputTarget::Csv("r.csv".into()));
        assert!(opts.validate().is_ok());
        assert_eq!(
            opts.with_max_concurrency(0).validate(),
            Err(ConfigError::ZeroConcurrency)
        );
    }

    #[test]
    fn default_concurrency_is_at_least_one() {
        assert!(default_concurrency() >= 1);
    }

    #[test]
    fn summary_success_rate() {
        let s = RunSummary {
            total: 4,
            succeeded: 3,
            failed: 1,
            ..Default::default()
        };
        assert!((s.success_rate() - 75.0).abs() < f64::EPSILON);
        assert_eq!(RunSummary::default().success_rate(), 0.0);
        assert!(RunSummary::default().is_empty());
    }
}
