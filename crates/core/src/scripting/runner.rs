//! [`ProcessRunner`]: configure once, execute any number of times.
//!
//! The boolean/integer methods (`set_execution_script`, `execute`, ...) are
//! a convenience facade that logs the rejection through `tracing` and
//! reports success as a flag or the reserved exit code `-1`. Callers that
//! want the reason use the `try_*` counterparts, which return the
//! structured [`ConfigError`] / [`ExecutionError`].

use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ExecutionError};

use super::config::ExecutionConfig;
use super::executor::{ExecutionResult, FAILURE_EXIT_CODE};
use super::platform::{HostOs, ShellCommand, TargetPlatform};
use super::subprocess;

/// Runs shell scripts with a configured directory and environment.
///
/// ```no_run
/// # async fn demo() {
/// use shellexec_core::{ProcessRunner, TargetPlatform};
///
/// let mut runner = ProcessRunner::new();
/// runner.set_environment_variable("KEY", "VALUE");
/// runner.set_execution_script("echo hello\necho world", TargetPlatform::All);
///
/// let exit_code = runner.execute().await;
/// println!("{exit_code}: {}", runner.output());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    config: ExecutionConfig,
    host: HostOs,
    last_result: Option<ExecutionResult>,
    output: String,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    /// A runner for the detected host OS.
    pub fn new() -> Self {
        Self::with_host(HostOs::detect())
    }

    /// A runner that treats `host` as the host OS for compatibility checks
    /// and `TargetPlatform::All` dispatch.
    pub fn with_host(host: HostOs) -> Self {
        Self {
            config: ExecutionConfig::new(),
            host,
            last_result: None,
            output: String::new(),
        }
    }

    pub fn host(&self) -> HostOs {
        self.host
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// The command `execute` would launch, if a script is configured.
    pub fn command(&self) -> Option<ShellCommand> {
        self.config.command(self.host)
    }

    // -----------------------------------------------------------------------
    // Working directory
    // -----------------------------------------------------------------------

    pub fn try_set_working_directory(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<(), ConfigError> {
        self.config.set_working_dir(path)
    }

    /// Returns `false` (and leaves the previous directory) if `path` is
    /// rejected.
    pub fn set_working_directory(&mut self, path: impl AsRef<Path>) -> bool {
        report(self.try_set_working_directory(path))
    }

    // -----------------------------------------------------------------------
    // Environment overlay
    // -----------------------------------------------------------------------

    pub fn set_environment_variable(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.config.set_env(name, value);
    }

    /// Unset `name` for the child, whether it came from the overlay or was
    /// inherited from this process.
    pub fn remove_environment_variable(&mut self, name: &str) {
        self.config.remove_env(name);
    }

    /// The overlay value for `name`; inherited variables are not reported.
    pub fn get_environment_variable(&self, name: &str) -> Option<&str> {
        self.config.get_env(name)
    }

    // -----------------------------------------------------------------------
    // Script
    // -----------------------------------------------------------------------

    pub fn try_set_execution_script(
        &mut self,
        script: impl Into<String>,
        platform: TargetPlatform,
    ) -> Result<(), ConfigError> {
        self.config.set_script(script, platform, self.host)
    }

    /// Returns `false` without touching the current script if `platform`
    /// cannot run on the host.
    pub fn set_execution_script(
        &mut self,
        script: impl Into<String>,
        platform: TargetPlatform,
    ) -> bool {
        report(self.try_set_execution_script(script, platform))
    }

    pub fn try_read_execution_script(
        &mut self,
        path: impl AsRef<Path>,
        platform: TargetPlatform,
    ) -> Result<(), ConfigError> {
        self.config.load_script(path, platform, self.host)
    }

    /// Returns `false` without touching the current script if the file is
    /// missing or unreadable, or `platform` cannot run on the host.
    pub fn read_execution_script(
        &mut self,
        path: impl AsRef<Path>,
        platform: TargetPlatform,
    ) -> bool {
        report(self.try_read_execution_script(path, platform))
    }

    // -----------------------------------------------------------------------
    // Limits
    // -----------------------------------------------------------------------

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.config.set_timeout(timeout);
    }

    pub fn set_max_output_bytes(&mut self, limit: Option<usize>) {
        self.config.set_max_output_bytes(limit);
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run the configured script and return its result.
    ///
    /// The previous run's output is discarded first. On failure the output
    /// holds whatever was captured before the error.
    pub async fn try_execute(&mut self) -> Result<&ExecutionResult, ExecutionError> {
        self.output.clear();
        self.last_result = None;

        match subprocess::run(&self.config, self.host).await {
            Ok(result) => {
                self.output.clone_from(&result.output);
                Ok(self.last_result.insert(result))
            }
            Err(err) => {
                self.output = err.partial_output().to_string();
                Err(err)
            }
        }
    }

    /// Run the configured script and return its exit code, or `-1` if the
    /// runner failed to launch, capture or wait for it.
    pub async fn execute(&mut self) -> i32 {
        match self.try_execute().await {
            Ok(result) => result.exit_code,
            Err(err) => {
                tracing::warn!(error = %err, "Script execution failed");
                FAILURE_EXIT_CODE
            }
        }
    }

    /// Output of the most recent `execute`: stdout followed by stderr.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Full result of the most recent successful `execute`.
    pub fn last_result(&self) -> Option<&ExecutionResult> {
        self.last_result.as_ref()
    }
}

fn report(result: Result<(), ConfigError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "Rejected runner configuration");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
