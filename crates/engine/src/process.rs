// crates/engine/src/process.rs
//! Child-process engine instances
//!
//! Each runner gets its own OS process speaking the JSON-lines protocol on
//! stdin/stdout. stderr is inherited so the engine's own logs reach the user.
//!
//! On unix every engine leads its own process group, so terminating it also
//! takes down the audit tool and browser it launched.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parade_common::AuditError;

use crate::connection::{EngineConnection, EngineEvent, EngineSpawner};
use crate::protocol::{decode_response, encode_line, EngineRequest};
use crate::shutdown::EngineContext;

/// How long an engine may take to exit after a `close` request.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Time between SIGTERM and SIGKILL for an engine's process group.
#[cfg(unix)]
const TERM_GRACE: Duration = Duration::from_millis(100);

/// Spawns one child process per engine instance.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<OsString>,
    label: String,
}

impl ProcessSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let label = program.display().to_string();
        Self {
            program,
            args: Vec::new(),
            label,
        }
    }

    /// Re-launch the current executable with the given worker arguments.
    pub fn current_exe<I, S>(args: I) -> std::io::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Ok(Self::new(std::env::current_exe()?).with_args(args))
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl EngineSpawner for ProcessSpawner {
    fn spawn(&self, ctx: EngineContext) -> Result<EngineConnection, AuditError> {
        let id = ctx.id();
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command
            .spawn()
            .map_err(|e| AuditError::Spawn(format!("{}: {e}", self.label)))?;
        let group = child.id();

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AuditError::Spawn("engine stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AuditError::Spawn("engine stdout was not captured".to_string()))?;

        info!(runner = id, pid = group, "started audit engine");

        let (request_tx, request_rx) = mpsc::channel(4);
        let (event_tx, event_rx) = mpsc::channel(16);
        tokio::spawn(drive(child, group, stdin, stdout, request_rx, event_tx, ctx));

        Ok(EngineConnection::new(id, request_tx, event_rx))
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Pump requests to the child and responses back until either side goes away.
async fn drive(
    mut child: Child,
    group: Option<u32>,
    mut stdin: ChildStdin,
    stdout: ChildStdout,
    mut requests: mpsc::Receiver<EngineRequest>,
    events: mpsc::Sender<EngineEvent>,
    mut ctx: EngineContext,
) {
    let id = ctx.id();
    let mut lines = BufReader::new(stdout).lines();
    let mut exited = false;

    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(request) = request else {
                    debug!(runner = id, "connection dropped, terminating engine");
                    break;
                };
                let closing = matches!(request, EngineRequest::Close);
                if let Err(e) = write_request(&mut stdin, &request).await {
                    warn!(runner = id, "failed to write to engine: {e}");
                    break;
                }
                if closing {
                    match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
                        Ok(Ok(status)) => {
                            debug!(runner = id, %status, "engine exited");
                            exited = true;
                        }
                        Ok(Err(e)) => warn!(runner = id, "failed to wait for engine: {e}"),
                        Err(_) => warn!(runner = id, "engine ignored close request, killing"),
                    }
                    break;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if events.send(decode_response(&line)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!(runner = id, "engine closed its output");
                    break;
                }
                Err(e) => {
                    warn!(runner = id, "failed to read from engine: {e}");
                    break;
                }
            },
            _ = ctx.shutdown_requested() => {
                debug!(runner = id, "shutdown requested, terminating engine");
                break;
            }
        }
    }

    if !exited {
        terminate(&mut child, group).await;
    }
    drop(events);
    drop(ctx);
}

/// Stop the engine and everything it started, then reap it.
async fn terminate(child: &mut Child, group: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = group {
        // The leader stays unreaped until after the SIGKILL sweep, so `pgid`
        // cannot have been reused by then.
        signal_group(pgid, libc::SIGTERM);
        tokio::time::sleep(TERM_GRACE).await;
        signal_group(pgid, libc::SIGKILL);
    }
    #[cfg(not(unix))]
    let _ = group;

    // No-op if the child already exited.
    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg takes plain integers; ESRCH for an empty group is ignored.
    unsafe {
        libc::killpg(pgid, signal);
    }
}

async fn write_request(stdin: &mut ChildStdin, request: &EngineRequest) -> std::io::Result<()> {
    let line = encode_line(request)?;
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownController;
    use parade_common::AuditSettings;

    const REPORT_LINE: &str = r#"{"type":"report","report":{"lighthouseVersion":"12.0.0","categories":{"performance":{"id":"performance","title":"Performance","score":0.5,"auditRefs":[]}},"audits":{}}}"#;

    fn shell(script: &str) -> ProcessSpawner {
        ProcessSpawner::new("sh").with_args(["-c", script])
    }

    #[tokio::test]
    async fn round_trip_through_child_process() {
        let controller = ShutdownController::new();
        let script = format!("read req; printf '%s\\n' '{REPORT_LINE}'; read req; exit 0");
        let mut conn = shell(&script).spawn(controller.context(0).unwrap()).unwrap();

        let report = conn
            .audit("https://a.example/", &AuditSettings::default(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(report.categories[0].score, Some(0.5));
        assert!(conn.close(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn engine_exit_fails_the_audit() {
        let controller = ShutdownController::new();
        let mut conn = shell("exit 3").spawn(controller.context(1).unwrap()).unwrap();

        let err = conn
            .audit("https://a.example/", &AuditSettings::default(), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err, AuditError::EngineExited { runner: 1 });
    }

    #[tokio::test]
    async fn garbled_output_is_malformed() {
        let controller = ShutdownController::new();
        let mut conn = shell("read req; echo 'not json'; read req")
            .spawn(controller.context(2).unwrap())
            .unwrap();

        let err = conn
            .audit("https://a.example/", &AuditSettings::default(), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn shutdown_kills_hung_engine() {
        let controller = ShutdownController::new();
        let _conn = shell("sleep 30").spawn(controller.context(3).unwrap()).unwrap();

        controller.trigger();
        assert!(controller.wait(Duration::from_secs(5)).await);
    }

    fn is_running(pid: libc::pid_t) -> bool {
        // SAFETY: signal 0 only checks that the process exists.
        if unsafe { libc::kill(pid, 0) } != 0 {
            return false;
        }
        // Zombies still answer signal 0.
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn discarded_engine_takes_its_children_down() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("child.pid");
        let script = format!(
            "sleep 300 & echo $! > '{}'; read req; sleep 300",
            pid_file.display()
        );
        let controller = ShutdownController::new();
        let mut conn = shell(&script).spawn(controller.context(5).unwrap()).unwrap();

        let err = conn
            .audit("https://a.example/", &AuditSettings::default(), Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Timeout(_)));

        let pid: libc::pid_t = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(is_running(pid));

        drop(conn);
        controller.trigger();
        assert!(controller.wait(Duration::from_secs(5)).await);

        let mut running = true;
        for _ in 0..50 {
            running = is_running(pid);
            if !running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(!running, "background process {pid} outlived its engine");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let controller = ShutdownController::new();
        let err = ProcessSpawner::new("/nonexistent/parade-engine")
            .spawn(controller.context(4).unwrap())
            .unwrap_err();
        assert!(matches!(err, AuditError::Spawn(_)));
    }
}
