//! Trial execution: one external tool invocation per trial.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use sb_types::{truncate_chars, DeviceSlot, TrialFailure, TrialOutcome, TrialSpec};

use crate::config::RunnerConfig;
use crate::console::Console;

/// How long to keep draining pipes after the child exits (grandchildren may
/// hold them open).
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Characters of stderr echoed to the console on failure.
const CONSOLE_ERROR_CHARS: usize = 200;

const RULE: &str = "============================================================";

/// Runs one trial to completion. Implementations never fail: every error is
/// recorded in the returned outcome.
#[async_trait]
pub trait TrialExecutor: Send + Sync {
    async fn execute(&self, spec: &TrialSpec, slot: DeviceSlot) -> TrialOutcome;
}

/// Fully resolved command line for one trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    /// `-o <artifact> [--flag value]* <dataset>`
    pub args: Vec<String>,
    /// Device restriction set on the child only.
    pub env: (String, String),
    pub artifact_path: PathBuf,
}

impl Invocation {
    pub fn build(config: &RunnerConfig, spec: &TrialSpec, slot: DeviceSlot) -> Self {
        let artifact_path = config.artifact_path(spec.name());
        let mut args = vec!["-o".to_string(), artifact_path.display().to_string()];
        args.extend(spec.parameters().to_args());
        args.push(config.dataset_path.display().to_string());

        Self {
            program: config.tool_path.clone(),
            args,
            env: (config.device_env_var.clone(), slot.to_string()),
            artifact_path,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(&self.env.0, &self.env.1)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} {}", self.env.0, self.env.1, self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Executor that spawns the reconstruction tool as a subprocess.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    config: RunnerConfig,
    console: Console,
}

impl ProcessExecutor {
    pub fn new(config: RunnerConfig, console: Console) -> Self {
        Self { config, console }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    async fn run(&self, invocation: &Invocation) -> Result<(), TrialFailure> {
        if let Err(e) = tokio::fs::metadata(&self.config.dataset_path).await {
            return Err(TrialFailure::Launch(format!(
                "dataset {} unusable: {e}",
                self.config.dataset_path.display()
            )));
        }

        let mut child = invocation.command().spawn().map_err(|e| {
            TrialFailure::Launch(format!(
                "failed to launch {}: {e}",
                invocation.program.display()
            ))
        })?;

        let cap = self.config.max_error_bytes;
        let stdout_task = tokio::spawn(read_capped(child.stdout.take(), cap));
        let stderr_task = tokio::spawn(read_capped(child.stderr.take(), cap));

        let waited = tokio::time::timeout(self.config.trial_timeout(), child.wait()).await;

        let status: ExitStatus = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                stdout_task.abort();
                stderr_task.abort();
                return Err(TrialFailure::Launch(format!("failed waiting on child: {e}")));
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed out trial");
                }
                stdout_task.abort();
                stderr_task.abort();
                return Err(TrialFailure::Timeout);
            }
        };

        let stdout = collect(stdout_task).await;
        let stderr = collect(stderr_task).await;
        if !stdout.is_empty() {
            debug!(bytes = stdout.len(), "captured tool stdout");
        }

        if status.success() {
            Ok(())
        } else {
            Err(TrialFailure::Process {
                code: status.code(),
                stderr,
            })
        }
    }
}

#[async_trait]
impl TrialExecutor for ProcessExecutor {
    async fn execute(&self, spec: &TrialSpec, slot: DeviceSlot) -> TrialOutcome {
        let invocation = Invocation::build(&self.config, spec, slot);

        self.console.block(&[
            RULE.to_string(),
            format!("[GPU {slot}] start: {}", spec.name()),
            format!("description: {}", spec.description()),
            format!("command: {invocation}"),
            RULE.to_string(),
        ]);
        info!(trial = %spec.name(), slot = %slot, "starting trial");

        let started = Instant::now();
        let result = self.run(&invocation).await;
        let duration = started.elapsed().as_secs_f64();

        match result {
            Ok(()) => {
                let size_mb = tokio::fs::metadata(&invocation.artifact_path)
                    .await
                    .map(|m| m.len() as f64 / (1024.0 * 1024.0))
                    .unwrap_or(0.0);
                self.console.line(format!(
                    "[GPU {slot}] {} succeeded in {duration:.1}s, artifact {size_mb:.2} MB",
                    spec.name()
                ));
                info!(trial = %spec.name(), duration, "trial succeeded");
                TrialOutcome::success(spec.clone(), slot, duration, invocation.artifact_path)
            }
            Err(failure) => {
                let line = match &failure {
                    TrialFailure::Timeout => format!(
                        "[GPU {slot}] {} timed out after {}s",
                        spec.name(),
                        self.config.trial_timeout_secs
                    ),
                    TrialFailure::Launch(msg) => {
                        format!("[GPU {slot}] {} could not start: {msg}", spec.name())
                    }
                    other => format!(
                        "[GPU {slot}] {} failed: {}",
                        spec.name(),
                        truncate_chars(&other.to_string(), CONSOLE_ERROR_CHARS)
                    ),
                };
                self.console.line(line);
                warn!(trial = %spec.name(), error = %failure, duration, "trial failed");
                TrialOutcome::failure(
                    spec.clone(),
                    slot,
                    duration,
                    invocation.artifact_path,
                    failure,
                )
            }
        }
    }
}

/// Read a stream to EOF, keeping at most `cap` bytes.
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    String::from_utf8_lossy(&kept).into_owned()
}

async fn collect(task: tokio::task::JoinHandle<String>) -> String {
    let abort = task.abort_handle();
    match tokio::time::timeout(DRAIN_GRACE, task).await {
        Ok(Ok(text)) => text,
        Ok(Err(_)) => String::new(),
        Err(_) => {
            abort.abort();
            String::new()
        }
    }
}
