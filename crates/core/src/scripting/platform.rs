//! Host OS detection, platform compatibility and shell command construction.
//!
//! A [`TargetPlatform`] is both a filter (may this script run on the host?)
//! and a selector (which shell runs it?). [`build_command`] is the pure
//! mapping from `(script, platform, host)` to the argument vector.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Joiner substituted for every run of line breaks in a script.
pub const STATEMENT_SEPARATOR: &str = " & ";

static LINE_BREAKS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n]+").expect("valid regex"));

/// Logical OS class a script declares itself compatible with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPlatform {
    Windows,
    Unix,
    Mac,
    /// Any host; the shell is picked from the detected host OS.
    All,
}

/// The operating system the runner is actually executing on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostOs {
    Windows,
    Unix,
    Mac,
}

impl HostOs {
    /// Classify an OS name, case-insensitively.
    ///
    /// `"win"` means Windows; `"nix"`, `"nux"` or `"aix"` mean Unix; anything
    /// else falls back to Mac.
    pub fn from_os_name(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.contains("win") {
            Self::Windows
        } else if ["nix", "nux", "aix"].iter().any(|marker| name.contains(marker)) {
            Self::Unix
        } else {
            Self::Mac
        }
    }

    /// Classify the OS this binary was built for.
    pub fn detect() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }
}

impl fmt::Display for HostOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Windows => "windows",
            Self::Unix => "unix",
            Self::Mac => "mac",
        };
        f.write_str(name)
    }
}

impl TargetPlatform {
    /// Whether a script tagged with this platform may run on `host`.
    pub fn is_compatible_with(self, host: HostOs) -> bool {
        match self {
            Self::Windows => host == HostOs::Windows,
            Self::Unix => host == HostOs::Unix,
            Self::Mac => host == HostOs::Mac,
            Self::All => true,
        }
    }

    /// The OS class whose shell runs the script. `All` defers to `host`.
    pub fn resolve(self, host: HostOs) -> HostOs {
        match self {
            Self::Windows => HostOs::Windows,
            Self::Unix => HostOs::Unix,
            Self::Mac => HostOs::Mac,
            Self::All => host,
        }
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Windows => "windows",
            Self::Unix => "unix",
            Self::Mac => "mac",
            Self::All => "all",
        };
        f.write_str(name)
    }
}

/// Unrecognised platform name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown target platform: {0} (expected windows, unix, mac or all)")]
pub struct ParsePlatformError(pub String);

impl FromStr for TargetPlatform {
    type Err = ParsePlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "windows" => Ok(Self::Windows),
            "unix" => Ok(Self::Unix),
            "mac" => Ok(Self::Mac),
            "all" => Ok(Self::All),
            _ => Err(ParsePlatformError(s.to_string())),
        }
    }
}

/// A shell invocation: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ShellCommand {
    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

/// Flatten a multi-line script into one line, replacing each run of
/// `\r`/`\n` characters with [`STATEMENT_SEPARATOR`].
///
/// This is a plain textual join, not a script interpreter: constructs that
/// span lines (quotes, `if` blocks, heredocs) do not survive it, and on
/// bash `&` backgrounds the preceding command.
pub fn join_script(script: &str) -> String {
    LINE_BREAKS_RE
        .replace_all(script, STATEMENT_SEPARATOR)
        .into_owned()
}

/// Build the shell invocation for `script` tagged with `platform` on `host`.
///
/// - Windows: `cmd.exe /c <joined>`
/// - Unix / Mac: `bash -c <joined>`
pub fn build_command(script: &str, platform: TargetPlatform, host: HostOs) -> ShellCommand {
    let joined = join_script(script);
    let (program, flag) = match platform.resolve(host) {
        HostOs::Windows => ("cmd.exe", "/c"),
        HostOs::Unix | HostOs::Mac => ("bash", "-c"),
    };
    ShellCommand {
        program: program.to_string(),
        args: vec![flag.to_string(), joined],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
