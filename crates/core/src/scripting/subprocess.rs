//! Launching the shell and driving it to completion.
//!
//! [`run`] spawns the configured command, drains stdout and stderr
//! alongside the wait for the child to exit, and always kills the child's
//! process group and reaps the child before returning. Draining both pipes concurrently with
//! the wait is what keeps a chatty script from blocking on a full pipe
//! buffer.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use crate::error::ExecutionError;

use super::config::ExecutionConfig;
use super::executor::{ExecutionResult, StreamKind, FAILURE_EXIT_CODE};
use super::platform::HostOs;

/// How long the drains may keep reading once the process group was killed
/// after a failed wait or a timeout.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Bytes read from one stream so far.
///
/// Lives outside the drain future, so a drain cancelled by the timeout
/// leaves everything it already read in place.
#[derive(Debug, Default)]
struct Capture {
    buf: Vec<u8>,
    limit: Option<usize>,
    truncated: bool,
    done: bool,
    error: Option<std::io::Error>,
}

impl Capture {
    fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        let room = self.limit.map_or(bytes.len(), |max| {
            max.saturating_sub(self.buf.len()).min(bytes.len())
        });
        self.buf.extend_from_slice(&bytes[..room]);
        if room < bytes.len() {
            self.truncated = true;
        }
    }

    fn text(&self) -> String {
        let kept = if self.truncated {
            trim_partial_char(&self.buf)
        } else {
            &self.buf
        };
        join_lines(&String::from_utf8_lossy(kept))
    }
}

enum WaitFailure {
    Io(std::io::Error),
    TimedOut,
}

/// Run the script described by `config` on `host` and collect its output.
///
/// The run is over when the shell has exited and both pipes reached EOF, so
/// background jobs started by the script are waited for. The optional
/// timeout covers all of it.
pub async fn run(
    config: &ExecutionConfig,
    host: HostOs,
) -> Result<ExecutionResult, ExecutionError> {
    let command = config.command(host).ok_or(ExecutionError::NoScript)?;

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // The shell leads its own group so cleanup reaches background jobs.
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    for name in config.removed_env() {
        cmd.env_remove(name);
    }
    for (key, value) in config.env() {
        cmd.env(key, value);
    }

    if let Some(dir) = config.working_dir() {
        cmd.current_dir(dir);
    }

    let started_at = Utc::now();
    let start = Instant::now();

    let mut child = cmd.spawn().map_err(|source| ExecutionError::Spawn {
        program: command.program.clone(),
        source,
    })?;
    let pid = child.id();
    tracing::debug!(?pid, program = %command.program, "Spawned script process");

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let mut stdout = Capture::new(config.max_output_bytes());
    let mut stderr = Capture::new(config.max_output_bytes());

    let waited = {
        let finished = async {
            let (status, (), ()) = tokio::join!(
                child.wait(),
                drain(stdout_pipe.as_mut(), &mut stdout),
                drain(stderr_pipe.as_mut(), &mut stderr),
            );
            status
        };
        match config.timeout() {
            Some(limit) => match tokio::time::timeout(limit, finished).await {
                Ok(status) => status.map_err(WaitFailure::Io),
                Err(_elapsed) => Err(WaitFailure::TimedOut),
            },
            None => finished.await.map_err(WaitFailure::Io),
        }
    };

    terminate(&mut child, pid).await;

    if waited.is_err() {
        let leftovers = async {
            tokio::join!(
                drain(stdout_pipe.as_mut(), &mut stdout),
                drain(stderr_pipe.as_mut(), &mut stderr),
            )
        };
        if tokio::time::timeout(DRAIN_GRACE, leftovers).await.is_err() {
            tracing::debug!(?pid, "Stopped draining after grace period");
        }
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    let stdout_text = stdout.text();
    let stderr_text = stderr.text();
    let output = format!("{stdout_text}{stderr_text}");

    let status = match waited {
        Ok(status) => status,
        Err(WaitFailure::Io(source)) => {
            return Err(ExecutionError::Wait {
                source,
                partial_output: output,
            });
        }
        Err(WaitFailure::TimedOut) => {
            tracing::warn!(?pid, elapsed_ms = duration_ms, "Script timed out and was killed");
            return Err(ExecutionError::Timeout {
                elapsed_ms: duration_ms,
                partial_output: output,
            });
        }
    };

    let capture_error = stdout
        .error
        .take()
        .map(|err| (StreamKind::Stdout, err))
        .or_else(|| stderr.error.take().map(|err| (StreamKind::Stderr, err)));
    if let Some((stream, source)) = capture_error {
        return Err(ExecutionError::Capture {
            stream,
            source,
            partial_output: output,
        });
    }

    let exit_code = exit_code_of(status);
    tracing::debug!(?pid, exit_code, duration_ms, "Script process exited");

    Ok(ExecutionResult {
        exit_code,
        truncated: stdout.truncated || stderr.truncated,
        output,
        stdout: stdout_text,
        stderr: stderr_text,
        pid,
        started_at,
        duration_ms,
    })
}

/// Kill the shell's process group and the shell itself, then reap the shell.
/// Never fails.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pgid) = pid {
            kill_process_group(pgid);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }

    // Killing an already-reaped child is rejected by tokio; that is the
    // normal case after a successful wait.
    if let Err(err) = child.start_kill() {
        tracing::trace!(error = %err, "Kill skipped");
    }
    if let Err(err) = child.wait().await {
        tracing::warn!(error = %err, "Failed to reap script process");
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    // SAFETY: killpg only sends a signal; an empty group yields ESRCH.
    let result = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            tracing::trace!(pgid, "Process group already empty");
        } else {
            tracing::warn!(pgid, error = %err, "Failed to kill process group");
        }
    }
}

/// Read `stream` into `capture` until EOF or a read error.
///
/// Bytes past the capture limit are read and discarded rather than left in
/// the pipe, so the child never blocks on a stream the runner stopped
/// keeping. Safe to call again after being cancelled.
async fn drain<R: AsyncRead + Unpin>(stream: Option<&mut R>, capture: &mut Capture) {
    let Some(stream) = stream else {
        return;
    };

    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    while !capture.done {
        match stream.read(&mut chunk).await {
            Ok(0) => capture.done = true,
            Ok(n) => capture.push(&chunk[..n]),
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                capture.error = Some(err);
                capture.done = true;
            }
        }
    }
}

/// Drop a multi-byte UTF-8 sequence cut short at the end of `bytes`.
fn trim_partial_char(bytes: &[u8]) -> &[u8] {
    let Some(back) = bytes.iter().rev().take(4).position(|b| b & 0xC0 != 0x80) else {
        return bytes;
    };
    let lead = bytes.len() - 1 - back;
    let width = match bytes[lead] {
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        b if b >= 0xC0 => 2,
        _ => 1,
    };
    if lead + width > bytes.len() {
        &bytes[..lead]
    } else {
        bytes
    }
}

/// Split on line endings and re-join with a single `\n` (no trailing newline).
fn join_lines(text: &str) -> String {
    text.lines().collect::<Vec<_>>().join("\n")
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(FAILURE_EXIT_CODE)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(FAILURE_EXIT_CODE)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::scripting::platform::TargetPlatform;
    use crate::scripting::test_helpers::unix_config;

    #[test]
    fn join_lines_normalizes_endings() {
        assert_eq!(join_lines("a\nb\n"), "a\nb");
        assert_eq!(join_lines("a\r\nb\r\n"), "a\nb");
        assert_eq!(join_lines(""), "");
    }

    #[tokio::test]
    async fn drain_without_stream_is_empty() {
        let mut capture = Capture::new(None);
        drain(None::<&mut &[u8]>, &mut capture).await;
        assert!(capture.text().is_empty());
        assert!(!capture.truncated);
        assert!(capture.error.is_none());
    }

    #[tokio::test]
    async fn drain_reads_everything_without_limit() {
        let mut data: &[u8] = b"one\ntwo\nthree\n";
        let mut capture = Capture::new(None);
        drain(Some(&mut data), &mut capture).await;
        assert_eq!(capture.text(), "one\ntwo\nthree");
        assert!(capture.done);
        assert!(!capture.truncated);
    }

    #[tokio::test]
    async fn drain_discards_past_limit() {
        let data = vec![b'x'; 3 * READ_CHUNK_BYTES];
        let mut stream = data.as_slice();
        let mut capture = Capture::new(Some(10));
        drain(Some(&mut stream), &mut capture).await;
        assert_eq!(capture.text(), "x".repeat(10));
        assert!(capture.truncated);
        assert!(stream.is_empty(), "excess must still be read");
    }

    #[tokio::test]
    async fn drain_replaces_invalid_utf8() {
        let mut data: &[u8] = b"ok \xff\xfe end";
        let mut capture = Capture::new(None);
        drain(Some(&mut data), &mut capture).await;
        let text = capture.text();
        assert!(text.starts_with("ok "));
        assert!(text.ends_with(" end"));
        assert!(capture.error.is_none());
    }

    #[test]
    fn limit_never_splits_a_character() {
        // "abc" then a two-byte 'é': a limit of 4 keeps half of it.
        let mut capture = Capture::new(Some(4));
        capture.push("abcé".as_bytes());
        assert!(capture.truncated);
        assert_eq!(capture.text(), "abc");

        let mut capture = Capture::new(Some(6));
        capture.push("ab€€".as_bytes());
        assert_eq!(capture.text(), "ab€");

        let mut capture = Capture::new(Some(5));
        capture.push("abcé".as_bytes());
        assert!(!capture.truncated);
        assert_eq!(capture.text(), "abcé");
    }

    #[test]
    fn trim_partial_char_keeps_complete_input() {
        assert_eq!(trim_partial_char(b""), b"");
        assert_eq!(trim_partial_char("a€".as_bytes()), "a€".as_bytes());
        assert_eq!(trim_partial_char(&"a€".as_bytes()[..3]), b"a");
        assert_eq!(trim_partial_char(&"😀".as_bytes()[..3]), b"");
    }

    #[tokio::test]
    async fn run_without_script_fails_cleanly() {
        let config = ExecutionConfig::new();
        let result = run(&config, HostOs::detect()).await;
        assert_matches!(result, Err(ExecutionError::NoScript));
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        // Force the Windows shell on a Unix host so the program is missing.
        if cfg!(windows) {
            return;
        }
        let mut config = ExecutionConfig::new();
        config
            .set_script("echo hi", TargetPlatform::All, HostOs::Windows)
            .expect("compatible");
        let result = run(&config, HostOs::Windows).await;
        assert_matches!(
            result,
            Err(ExecutionError::Spawn { ref program, .. }) if program == "cmd.exe"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdout_precedes_stderr() {
        let config = unix_config("echo out; echo err 1>&2");
        let result = run(&config, HostOs::Unix).await.expect("run");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "out");
        assert_eq!(result.stderr, "err");
        assert_eq!(result.output, "outerr");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_code_is_returned() {
        let config = unix_config("exit 42");
        let result = run(&config, HostOs::Unix).await.expect("run");
        assert_eq!(result.exit_code, 42);
        assert!(!result.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signal_exit_maps_above_128() {
        let config = unix_config("kill -9 $$");
        let result = run(&config, HostOs::Unix).await.expect("run");
        assert_eq!(result.exit_code, 128 + 9);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_and_reports() {
        let config = unix_config("echo started; exec sleep 30")
            .with_timeout(Duration::from_millis(300));
        let start = Instant::now();
        let result = run(&config, HostOs::Unix).await;
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_matches!(result, Err(ExecutionError::Timeout { .. }));
        let err = result.unwrap_err();
        assert_eq!(err.partial_output(), "started");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_keeps_output_held_by_background_jobs() {
        // `echo started` runs in the background and `sleep` inherits the
        // pipes, so they stay open until the group is killed.
        let config = unix_config("echo started\nsleep 5")
            .with_timeout(Duration::from_millis(300));
        let start = Instant::now();
        let err = run(&config, HostOs::Unix).await.unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(4));
        assert_matches!(err, ExecutionError::Timeout { .. });
        assert_eq!(err.partial_output(), "started");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_covers_background_lines() {
        let config = unix_config("sleep 6\necho hi").with_timeout(Duration::from_secs(1));
        let start = Instant::now();
        let err = run(&config, HostOs::Unix).await.unwrap_err();
        assert!(
            start.elapsed() < Duration::from_secs(4),
            "took {:?}",
            start.elapsed()
        );
        assert_matches!(err, ExecutionError::Timeout { .. });
        assert_eq!(err.partial_output(), "hi");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn background_output_is_collected() {
        let config = unix_config("(sleep 0.2; echo late)\necho early");
        let result = run(&config, HostOs::Unix).await.expect("run");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "early\nlate");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn removed_variables_are_not_inherited() {
        std::env::set_var("SHELLEXEC_INHERITED_REMOVED", "still_here");
        let mut config = unix_config("echo \"[${SHELLEXEC_INHERITED_REMOVED-unset}]\"");
        config.remove_env("SHELLEXEC_INHERITED_REMOVED");
        let result = run(&config, HostOs::Unix).await.expect("run");
        assert_eq!(result.stdout, "[unset]");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdin_is_closed() {
        let config = unix_config("cat; echo done");
        let result = run(&config, HostOs::Unix).await.expect("run");
        assert_eq!(result.output, "done");
    }
}
