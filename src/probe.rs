use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::process::Command;
use tokio::time;
use tracing::{debug, warn};

/// A resolved external command: program plus arguments, no shell involved.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn display_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ProbeStatus {
    Success,
    Failure,
    TimedOut,
    Skipped,
}

impl ProbeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ProbeStatus::Success => "success",
            ProbeStatus::Failure => "failure",
            ProbeStatus::TimedOut => "timed out",
            ProbeStatus::Skipped => "skipped",
        }
    }
}

/// Outcome of one probe invocation. Failures are data, never errors:
/// a failing diagnostic must not stop the rest of the snapshot.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub probe_name: String,
    pub command_line: String,
    pub started_at_unix: i64,
    pub finished_at_unix: i64,
    pub status: ProbeStatus,
    pub output: String,
}

impl ProbeResult {
    pub fn skipped(probe_name: &str, command_line: String, reason: &str) -> Self {
        let now = now_unix();
        Self {
            probe_name: probe_name.to_string(),
            command_line,
            started_at_unix: now,
            finished_at_unix: now,
            status: ProbeStatus::Skipped,
            output: format!("skipped: {reason}\n"),
        }
    }
}

pub struct CommandRunner;

impl CommandRunner {
    /// Runs the command once, capturing combined stdout and stderr.
    /// Nonzero exit is recorded as `Failure` with output kept; a spawn
    /// error (missing executable) is `Failure` with the OS error text;
    /// exceeding `timeout` kills the child and records `TimedOut`.
    pub async fn execute(probe_name: &str, spec: &CommandSpec, timeout: Duration) -> ProbeResult {
        let started_at_unix = now_unix();
        debug!(probe = %probe_name, command = %spec.display_line(), "running probe");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(probe = %probe_name, error = %err, "failed to spawn probe command");
                return ProbeResult {
                    probe_name: probe_name.to_string(),
                    command_line: spec.display_line(),
                    started_at_unix,
                    finished_at_unix: now_unix(),
                    status: ProbeStatus::Failure,
                    output: format!("failed to start '{}': {err}\n", spec.program),
                };
            }
        };

        let (status, output) = match time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(out)) => {
                let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
                if !out.stderr.is_empty() {
                    text.push_str(&String::from_utf8_lossy(&out.stderr));
                }
                if out.status.success() {
                    (ProbeStatus::Success, text)
                } else {
                    warn!(probe = %probe_name, code = ?out.status.code(), "probe exited nonzero");
                    (ProbeStatus::Failure, text)
                }
            }
            Ok(Err(err)) => {
                warn!(probe = %probe_name, error = %err, "probe wait failed");
                (ProbeStatus::Failure, format!("wait failed: {err}\n"))
            }
            // Dropping the wait future drops the child; kill_on_drop
            // guarantees the process does not outlive us.
            Err(_elapsed) => {
                warn!(probe = %probe_name, timeout_secs = timeout.as_secs_f64(), "probe timed out");
                (ProbeStatus::TimedOut, String::new())
            }
        };

        ProbeResult {
            probe_name: probe_name.to_string(),
            command_line: spec.display_line(),
            started_at_unix,
            finished_at_unix: now_unix(),
            status,
            output,
        }
    }
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
