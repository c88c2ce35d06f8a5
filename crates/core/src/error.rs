use crate::scripting::executor::StreamKind;
use crate::scripting::platform::{HostOs, TargetPlatform};

/// Rejected configuration. The runner's state is left unchanged.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid working directory '{path}': {reason}")]
    InvalidWorkingDirectory { path: String, reason: &'static str },

    #[error("Script file not found at path: {0}")]
    ScriptNotFound(String),

    #[error("Failed to read script file '{path}': {source}")]
    ScriptRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Target platform '{platform}' does not match the host OS '{host}'")]
    IncompatiblePlatform {
        platform: TargetPlatform,
        host: HostOs,
    },
}

/// Failure of a single `execute` call.
///
/// Every variant maps to the reserved exit code `-1`. Variants raised after
/// the child was spawned carry whatever output had been captured.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("No script has been configured")]
    NoScript,

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to capture {stream}: {source}")]
    Capture {
        stream: StreamKind,
        #[source]
        source: std::io::Error,
        partial_output: String,
    },

    #[error("Failed waiting for the script process: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
        partial_output: String,
    },

    #[error("Script timed out after {elapsed_ms}ms")]
    Timeout {
        elapsed_ms: u64,
        partial_output: String,
    },
}

impl ExecutionError {
    /// Output captured before the failure (empty if nothing was launched).
    pub fn partial_output(&self) -> &str {
        match self {
            Self::NoScript | Self::Spawn { .. } => "",
            Self::Capture { partial_output, .. }
            | Self::Wait { partial_output, .. }
            | Self::Timeout { partial_output, .. } => partial_output,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_incompatible_platform() {
        let err = ConfigError::IncompatiblePlatform {
            platform: TargetPlatform::Windows,
            host: HostOs::Unix,
        };
        assert_eq!(
            err.to_string(),
            "Target platform 'windows' does not match the host OS 'unix'"
        );
    }

    #[test]
    fn display_script_not_found() {
        let err = ConfigError::ScriptNotFound("/tmp/missing.sh".to_string());
        assert_eq!(err.to_string(), "Script file not found at path: /tmp/missing.sh");
    }

    #[test]
    fn display_timeout() {
        let err = ExecutionError::Timeout {
            elapsed_ms: 5000,
            partial_output: String::new(),
        };
        assert_eq!(err.to_string(), "Script timed out after 5000ms");
    }

    #[test]
    fn spawn_error_exposes_io_source() {
        let err = ExecutionError::Spawn {
            program: "bash".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.to_string().starts_with("Failed to spawn 'bash':"));
        assert!(
            std::error::Error::source(&err).is_some(),
            "Spawn variant should have a source"
        );
    }

    #[test]
    fn partial_output_is_kept_on_capture_failure() {
        let err = ExecutionError::Capture {
            stream: StreamKind::Stderr,
            source: std::io::Error::other("broken pipe"),
            partial_output: "half".to_string(),
        };
        assert_eq!(err.partial_output(), "half");
        assert_eq!(ExecutionError::NoScript.partial_output(), "");
    }
}
