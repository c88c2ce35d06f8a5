use std::path::PathBuf;
use std::time::Duration;

use shellexec_core::scripting::platform::ParsePlatformError;
use shellexec_core::{ConfigError, ProcessRunner, TargetPlatform};

/// Script file used when neither variable names a script.
pub const DEFAULT_SCRIPT_FILE: &str = "demo.sh";

/// Overlay used when `SHELLEXEC_ENV` is unset; `demo.sh` echoes `$KEY`.
pub const DEFAULT_ENV: &str = "KEY=VALUE";

/// Where the script comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    Inline(String),
    File(PathBuf),
}

/// How the run is reported on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum DemoConfigError {
    #[error(transparent)]
    Platform(#[from] ParsePlatformError),

    #[error("SHELLEXEC_TIMEOUT_SECS must be a positive integer, got '{0}'")]
    Timeout(String),

    #[error("SHELLEXEC_ENV entries must look like KEY=VALUE, got '{0}'")]
    EnvEntry(String),

    #[error("SHELLEXEC_OUTPUT must be 'text' or 'json', got '{0}'")]
    OutputFormat(String),
}

/// Demo configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    pub script: ScriptSource,
    pub platform: TargetPlatform,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub output: OutputFormat,
}

impl DemoConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default     |
    /// |--------------------------|-------------|
    /// | `SHELLEXEC_SCRIPT`       | --          |
    /// | `SHELLEXEC_SCRIPT_FILE`  | `demo.sh`   |
    /// | `SHELLEXEC_PLATFORM`     | `all`       |
    /// | `SHELLEXEC_WORKDIR`      | --          |
    /// | `SHELLEXEC_ENV`          | `KEY=VALUE` |
    /// | `SHELLEXEC_TIMEOUT_SECS` | --          |
    /// | `SHELLEXEC_OUTPUT`       | `text`      |
    pub fn from_env() -> Result<Self, DemoConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DemoConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let script = match non_empty("SHELLEXEC_SCRIPT") {
            Some(inline) => ScriptSource::Inline(inline),
            None => ScriptSource::File(PathBuf::from(
                non_empty("SHELLEXEC_SCRIPT_FILE").unwrap_or_else(|| DEFAULT_SCRIPT_FILE.into()),
            )),
        };

        let platform = non_empty("SHELLEXEC_PLATFORM")
            .map(|v| v.parse::<TargetPlatform>())
            .transpose()?
            .unwrap_or(TargetPlatform::All);

        let working_dir = non_empty("SHELLEXEC_WORKDIR").map(PathBuf::from);

        let env = parse_env_entries(
            &non_empty("SHELLEXEC_ENV").unwrap_or_else(|| DEFAULT_ENV.into()),
        )?;

        let timeout = non_empty("SHELLEXEC_TIMEOUT_SECS")
            .map(|raw| match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
                _ => Err(DemoConfigError::Timeout(raw)),
            })
            .transpose()?;

        let output = match non_empty("SHELLEXEC_OUTPUT") {
            None => OutputFormat::Text,
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "text" => OutputFormat::Text,
                "json" => OutputFormat::Json,
                _ => return Err(DemoConfigError::OutputFormat(raw)),
            },
        };

        Ok(Self {
            script,
            platform,
            working_dir,
            env,
            timeout,
            output,
        })
    }

    /// Push this configuration into `runner`.
    pub fn apply(&self, runner: &mut ProcessRunner) -> Result<(), ConfigError> {
        if let Some(dir) = &self.working_dir {
            runner.try_set_working_directory(dir)?;
        }
        for (key, value) in &self.env {
            runner.set_environment_variable(key, value);
        }
        runner.set_timeout(self.timeout);
        match &self.script {
            ScriptSource::Inline(text) => runner.try_set_execution_script(text, self.platform),
            ScriptSource::File(path) => runner.try_read_execution_script(path, self.platform),
        }
    }
}

/// Parse comma-separated `KEY=VALUE` pairs.
fn parse_env_entries(raw: &str) -> Result<Vec<(String, String)>, DemoConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(DemoConfigError::EnvEntry(entry.to_string())),
        })
        .collect()
}
