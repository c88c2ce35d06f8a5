//! `shellexec-core` -- cross-platform shell script execution.
//!
//! Configure a working directory, an environment overlay and a script,
//! then run it through `cmd.exe` or `bash` and collect the exit code and
//! captured output. See [`scripting::runner::ProcessRunner`].

pub mod error;
pub mod scripting;

pub use error::{ConfigError, ExecutionError};
pub use scripting::executor::{ExecutionResult, FAILURE_EXIT_CODE};
pub use scripting::platform::{HostOs, ShellCommand, TargetPlatform};
pub use scripting::runner::ProcessRunner;
