// runner.rs
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::BufReader;
use tracing::{info, warn};

use parade_common::{
    default_concurrency, AuditSettings, FormFactor, OutputTarget, RunOptions, SinkFailurePolicy,
};
use parade_discovery::{Entry, PathFilter};
use parade_engine::{run_worker, LighthouseCli, ProcessSpawner};
use parade_orchestrator::{Orchestrator, RunnerPool};
use parade_output::{build_sinks, CombinedWriter, ReportWriter};

use crate::args::RunArgs;
use crate::output::print_summary;
use crate::run_info;

/// Exit status after an interrupt, as shells report SIGINT.
pub const INTERRUPTED: i32 = 130;

/// How long engines get to exit after an interrupt.
const INTERRUPT_GRACE: Duration = Duration::from_millis(200);

/// Run the audit pipeline. Returns the process exit status.
pub async fn run_audit(args: RunArgs) -> Result<i32> {
    let options = build_options(&args)?;
    options.validate().context("invalid run configuration")?;

    let entry = Entry::parse(&args.entry)?;
    let filter = PathFilter::new(&args.include, &args.exclude)?;
    info!("Entry: {}", entry);
    info!("Concurrency: {}", options.max_concurrency);
    info!("Timeout: {}s per page", options.audit_timeout.as_secs());
    for output in &options.outputs {
        info!("Output: {}", output);
    }
    let discovery = entry.into_discovery(filter);

    let sinks = build_sinks(&options.outputs)
        .await
        .context("failed to open outputs")?;
    let writer = Arc::new(ReportWriter::new(Arc::new(CombinedWriter::new(
        sinks,
        options.sink_failure_policy,
    ))));

    let spawner = ProcessSpawner::current_exe(["worker"])
        .context("failed to locate the parade executable")?;
    let pool = Arc::new(RunnerPool::new(
        Arc::new(spawner),
        options.audit.clone(),
        options.max_concurrency,
        options.audit_timeout,
    ));

    let info = run_info::gather(&options.audit.engine).await;
    for (label, value) in info.rows() {
        info!("{label}: {value}");
    }

    let outputs = options.outputs.clone();
    let orchestrator = Orchestrator::new(options, Arc::clone(&pool), Arc::clone(&writer))
        .with_run_info(info);
    let tracker = orchestrator.tracker();

    let started = Instant::now();
    let summary = tokio::select! {
        result = orchestrator.run(discovery) => result?,
        () = interrupted() => {
            warn!("interrupted, stopping engines");
            pool.terminate_all();
            if !pool.wait_for_exit(INTERRUPT_GRACE).await {
                warn!("some engines did not exit in time");
            }
            match tokio::time::timeout(INTERRUPT_GRACE, writer.complete()).await {
                Ok(Err(e)) => warn!("failed to complete output: {e}"),
                Err(_) => warn!("output did not complete in time"),
                Ok(Ok(())) => {}
            }
            return Ok(INTERRUPTED);
        }
    };

    print_summary(&summary, &tracker.snapshot(), &outputs, started.elapsed());
    Ok(0)
}

/// Serve audit requests from the parent process until it closes stdin.
pub async fn run_worker_process() -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    run_worker(stdin, tokio::io::stdout(), &LighthouseCli::new())
        .await
        .context("worker I/O failed")
}

fn build_options(args: &RunArgs) -> Result<RunOptions> {
    let preset = Preset::from_name(&args.preset);
    let concurrency = args.concurrency.unwrap_or_else(|| preset.concurrency());
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| preset.timeout());

    let outputs = if args.outputs.is_empty() {
        vec![default_output_path()]
    } else {
        args.outputs.clone()
    };

    let mut audit = AuditSettings {
        engine: args.engine.clone(),
        form_factor: match args.form_factor.as_str() {
            "desktop" => FormFactor::Desktop,
            _ => FormFactor::Mobile,
        },
        only_categories: args.only_categories.clone(),
        extra_args: args.engine_args.clone(),
        ..AuditSettings::default()
    };
    if !args.chrome_flags.is_empty() {
        audit.chrome_flags = args.chrome_flags.clone();
    }

    let mut options = RunOptions::new(args.entry.clone())
        .with_max_concurrency(concurrency)
        .with_audit_settings(audit)
        .with_audit_timeout(timeout)
        .with_sink_failure_policy(if args.exclude_failed_outputs {
            SinkFailurePolicy::ExcludeFailed
        } else {
            SinkFailurePolicy::KeepAttempting
        });
    for path in outputs {
        let target = OutputTarget::from_path(&path)
            .with_context(|| format!("unsupported output {}", path.display()))?;
        options = options.with_output(target);
    }
    Ok(options)
}

/// `parade-data/<UTC timestamp>/report.csv`
fn default_output_path() -> PathBuf {
    let stamp = Utc::now().format("%Y-%m-%dT%H_%M_%S").to_string();
    PathBuf::from("parade-data").join(stamp).join("report.csv")
}

/// Speed versus patience trade-offs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Preset {
    Fast,
    Balanced,
    Thorough,
}

impl Preset {
    fn from_name(name: &str) -> Self {
        match name {
            "fast" => Preset::Fast,
            "thorough" => Preset::Thorough,
            _ => Preset::Balanced,
        }
    }

    fn concurrency(self) -> usize {
        match self {
            Preset::Fast => default_concurrency() + 1,
            Preset::Balanced => default_concurrency(),
            // Fewer parallel browsers keep timings less noisy.
            Preset::Thorough => (default_concurrency() / 2).max(1),
        }
    }

    fn timeout(self) -> Duration {
        match self {
            Preset::Fast => Duration::from_secs(60),
            Preset::Balanced => Duration::from_secs(120),
            Preset::Thorough => Duration::from_secs(300),
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn interrupted() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("cannot listen for SIGTERM: {e}"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}
