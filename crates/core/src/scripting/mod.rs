//! Shell script execution.
//!
//! [`platform`] maps a script and its target platform to a shell
//! invocation, [`config`] holds what a run needs, [`subprocess`] launches
//! and drains the child, and [`runner`] ties them together behind
//! [`runner::ProcessRunner`].

pub mod config;
pub mod executor;
pub mod platform;
pub mod runner;
pub mod subprocess;
