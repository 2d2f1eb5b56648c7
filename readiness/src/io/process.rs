//! Runs the external verification client that lists an endpoint's modules.
//!
//! The client is short-lived: it connects, prints one module name per line,
//! and exits. A hung client must not hang the harness, and a chatty one must
//! not grow memory without bound.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// What the verification client printed, and how it ended.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Stderr as lossy UTF-8 with a trailing note when bytes were dropped.
    pub fn stderr_lossy(&self, label: &str) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).trim().to_string();
        if self.stderr_truncated > 0 {
            text.push_str(&format!(
                "\n[{label} stderr truncated {} bytes]",
                self.stderr_truncated
            ));
        }
        text
    }
}

/// Run the verification client, killing it once `timeout` elapses.
///
/// Both pipes are drained on reader threads while the client runs so a full
/// pipe never blocks it. At most `output_limit_bytes` per stream are kept.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_verify_command(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(program = ?cmd.get_program(), "spawning verify command");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn verify command");
            return Err(e).context("spawn verify command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || drain_bounded(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || drain_bounded(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for verify command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "verify command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill verify command")?;
            child.wait().context("reap verify command")?
        }
    };

    let (stdout, stdout_truncated) = collect_stream(stdout_handle).context("collect stdout")?;
    let (stderr, stderr_truncated) = collect_stream(stderr_handle).context("collect stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "verify command output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "verify command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

type Drained = Result<(Vec<u8>, usize)>;

fn collect_stream(handle: thread::JoinHandle<Drained>) -> Drained {
    handle
        .join()
        .unwrap_or_else(|_| Err(anyhow!("output reader thread panicked")))
}

/// Read `reader` to EOF, keeping the first `limit` bytes and counting the rest.
fn drain_bounded<R: Read>(mut reader: R, limit: usize) -> Drained {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_and_truncates_past_limit() {
        let output = run_verify_command(sh("printf 'abcdefgh'"), Duration::from_secs(5), 4)
            .expect("run");
        assert!(output.status.success());
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 4);
        assert!(!output.timed_out);
    }

    #[test]
    fn kills_command_after_timeout() {
        let output = run_verify_command(sh("exec sleep 5"), Duration::from_millis(100), 1024)
            .expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[test]
    fn stderr_notice_mentions_truncation() {
        let output = run_verify_command(sh("printf 'boom-boom' >&2"), Duration::from_secs(5), 4)
            .expect("run");
        let text = output.stderr_lossy("verify");
        assert!(text.starts_with("boom"));
        assert!(text.contains("[verify stderr truncated 5 bytes]"));
    }
}
