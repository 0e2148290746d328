//! Out-of-process driver invocation.
//!
//! One fresh interpreter per call, started in isolated mode inside a scratch
//! directory with a cleared environment and its own process group. The request
//! goes in on stdin as one JSON document; the report comes back as one
//! marker-prefixed JSON line. The driver moves that channel off fd 1 before the
//! candidate loads, and the marker is a random nonce, so candidate output cannot
//! pass for a report.

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

use super::HarnessConfig;

const DRIVER: &str = include_str!("driver.py");

/// Bytes of child stderr kept in error messages.
const STDERR_EXCERPT_BYTES: usize = 512;

/// Internal harness failures. These never leave the harness: they are mapped to
/// an unsuccessful `BenchmarkResult`.
#[derive(Error, Debug)]
pub(crate) enum HarnessError {
    #[error("could not prepare scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("could not launch interpreter '{bin}': {source}")]
    Launch {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error talking to interpreter: {0}")]
    Io(#[source] std::io::Error),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("process exited ({status}) without a result{}", stderr_suffix(.stderr))]
    NoReport { status: String, stderr: String },

    #[error("malformed result from driver: {0}")]
    MalformedReport(#[from] serde_json::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct DriverRequest<'a> {
    pub source: &'a str,
    pub entry: &'a str,
    pub input: &'a Value,
    pub expected: Option<&'a Value>,
    pub has_expected: bool,
    pub repetitions: u32,
    pub memory_limit_mb: u64,
    pub cpu_limit_secs: u64,
    pub marker: String,
}

/// What the driver observed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum DriverReport {
    Success {
        elapsed: f64,
    },
    SyntaxError {
        detail: String,
    },
    NoFunction,
    RuntimeError {
        detail: String,
    },
    WrongAnswer {
        elapsed: f64,
        got: String,
        expected: String,
    },
}

/// Run the driver once for `request` under the configured wall-clock limit.
pub(crate) async fn run_driver(
    config: &HarnessConfig,
    mut request: DriverRequest<'_>,
) -> Result<DriverReport, HarnessError> {
    let scratch = tempfile::Builder::new()
        .prefix("arena-bench-")
        .tempdir()
        .map_err(HarnessError::Scratch)?;
    request.marker = result_marker();
    let payload = serde_json::to_vec(&request)?;

    let mut cmd = tokio::process::Command::new(&config.python_bin);
    cmd.args(["-I", "-X", "utf8", "-c", DRIVER])
        .current_dir(scratch.path())
        .env_clear()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(path) = std::env::var_os("PATH") {
        cmd.env("PATH", path);
    }

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| HarnessError::Launch {
        bin: config.python_bin.clone(),
        source,
    })?;
    // Declared after `child`, so it drops first: the group dies on every exit path.
    let group = ProcessGroup::of(child.id());
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let timeout_secs = config.wall_timeout_secs();
    let exchange = async {
        if let Some(mut stdin) = child.stdin.take() {
            // A child that dies before reading still produces useful stderr.
            if let Err(e) = stdin.write_all(&payload).await {
                debug!(error = %e, "driver closed stdin early");
            }
        }
        // Descendants may still hold the pipes open once the driver exits.
        let (status, out, err) = tokio::join!(
            async {
                let status = child.wait().await;
                group.kill();
                status
            },
            read_all(stdout),
            read_all(stderr),
        );
        Ok::<_, HarnessError>((
            status.map_err(HarnessError::Io)?,
            out.map_err(HarnessError::Io)?,
            err.map_err(HarnessError::Io)?,
        ))
    };

    let (status, stdout, stderr) =
        match tokio::time::timeout(Duration::from_secs(timeout_secs), exchange).await {
            Ok(result) => result?,
            Err(_) => return Err(HarnessError::Timeout(timeout_secs)),
        };

    let stdout = String::from_utf8_lossy(&stdout);
    match find_report(&stdout, &request.marker) {
        Some(line) => Ok(serde_json::from_str(line)?),
        None => Err(HarnessError::NoReport {
            status: status.to_string(),
            stderr: excerpt(&String::from_utf8_lossy(&stderr)),
        }),
    }
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// The process group led by the driver. `kill_on_drop` only reaches the leader,
/// so anything the candidate forks is killed through the group.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn of(leader: Option<u32>) -> Self {
        Self {
            pgid: leader.filter(|&id| id > 0),
        }
    }

    fn kill(&self) {
        if let Some(pgid) = self.pgid {
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg only sends a signal. pgid is the positive id of a group
    // created for this child; ESRCH once it is gone is harmless.
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Fresh per-invocation marker with no link to anything the candidate can see.
fn result_marker() -> String {
    format!("@@ARENA_RESULT:{}@@", Uuid::new_v4().simple())
}

/// The last marker-prefixed line wins; candidate output cannot follow it.
fn find_report<'a>(stdout: &'a str, marker: &str) -> Option<&'a str> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(marker))
}

fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let last_line = trimmed.lines().last().unwrap_or_default();
    if last_line.len() <= STDERR_EXCERPT_BYTES {
        return last_line.to_string();
    }
    let mut end = STDERR_EXCERPT_BYTES;
    while !last_line.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &last_line[..end])
}
