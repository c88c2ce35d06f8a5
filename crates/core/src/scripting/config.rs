//! Execution configuration: working directory, environment overlay, script.
//!
//! Every mutator validates first and only then writes, so a rejected call
//! never leaves the configuration half-updated.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

use super::platform::{build_command, HostOs, ShellCommand, TargetPlatform};

/// Script text tagged with the platform it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub text: String,
    pub platform: TargetPlatform,
}

/// Everything needed to launch one script run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionConfig {
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    removed_env: BTreeSet<String>,
    script: Option<Script>,
    timeout: Option<Duration>,
    max_output_bytes: Option<usize>,
}

impl ExecutionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Working directory for the child (`None` inherits the caller's).
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Variables set on top of the inherited environment.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Names stripped from the child's environment, inherited ones included.
    pub fn removed_env(&self) -> &BTreeSet<String> {
        &self.removed_env
    }

    pub fn script(&self) -> Option<&Script> {
        self.script.as_ref()
    }

    /// Wall-clock limit for one run (`None` waits indefinitely).
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Per-stream capture limit in bytes (`None` keeps everything).
    pub fn max_output_bytes(&self) -> Option<usize> {
        self.max_output_bytes
    }

    /// Set the working directory.
    ///
    /// Rejects an empty path and a path that exists but is not a directory.
    /// A path that does not exist yet is accepted; launching will fail.
    pub fn set_working_dir(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidWorkingDirectory {
                path: String::new(),
                reason: "path is empty",
            });
        }
        if let Ok(metadata) = std::fs::metadata(path) {
            if !metadata.is_dir() {
                return Err(ConfigError::InvalidWorkingDirectory {
                    path: path.display().to_string(),
                    reason: "not a directory",
                });
            }
        }
        self.working_dir = Some(path.to_path_buf());
        Ok(())
    }

    pub fn clear_working_dir(&mut self) {
        self.working_dir = None;
    }

    pub fn set_env(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.removed_env.remove(&name);
        self.env.insert(name, value.into());
    }

    /// Drop `name` from the overlay and keep the child from inheriting it.
    pub fn remove_env(&mut self, name: &str) {
        self.env.remove(name);
        self.removed_env.insert(name.to_string());
    }

    pub fn get_env(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    /// Store `text` as the script, replacing any previous one.
    pub fn set_script(
        &mut self,
        text: impl Into<String>,
        platform: TargetPlatform,
        host: HostOs,
    ) -> Result<(), ConfigError> {
        ensure_compatible(platform, host)?;
        self.script = Some(Script {
            text: text.into(),
            platform,
        });
        Ok(())
    }

    /// Read the script from a plain-text file.
    ///
    /// Lines are re-joined with `\n`, so a trailing newline in the file does
    /// not turn into a dangling separator.
    pub fn load_script(
        &mut self,
        path: impl AsRef<Path>,
        platform: TargetPlatform,
        host: HostOs,
    ) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::ScriptNotFound(path.display().to_string()));
        }
        ensure_compatible(platform, host)?;

        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigError::ScriptRead {
                path: path.display().to_string(),
                source,
            })?;
        let text = contents.lines().collect::<Vec<_>>().join("\n");

        self.script = Some(Script { text, platform });
        Ok(())
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn set_max_output_bytes(&mut self, limit: Option<usize>) {
        self.max_output_bytes = limit;
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = Some(limit);
        self
    }

    /// The shell invocation for the configured script, if any.
    pub fn command(&self, host: HostOs) -> Option<ShellCommand> {
        self.script
            .as_ref()
            .map(|script| build_command(&script.text, script.platform, host))
    }
}

fn ensure_compatible(platform: TargetPlatform, host: HostOs) -> Result<(), ConfigError> {
    if platform.is_compatible_with(host) {
        Ok(())
    } else {
        Err(ConfigError::IncompatiblePlatform { platform, host })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
