//! Result types shared by the subprocess driver and the runner.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exit code reported when the runner itself failed (launch, capture, wait
/// or timeout), as opposed to any code produced by the script.
pub const FAILURE_EXIT_CODE: i32 = -1;

/// Captured outcome of one script execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Process exit code. On Unix a signal-terminated child reports
    /// `128 + signal`, mirroring shell convention.
    pub exit_code: i32,
    /// Captured stdout followed by captured stderr.
    pub output: String,
    /// Complete stdout, lines joined with `\n`.
    pub stdout: String,
    /// Complete stderr, lines joined with `\n`.
    pub stderr: String,
    /// OS process id of the shell, if it was still known after spawn.
    pub pid: Option<u32>,
    /// When the process was spawned.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Whether either stream exceeded the configured capture limit.
    pub truncated: bool,
}

impl ExecutionResult {
    /// True when the script exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One of the child's two output streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
