//! `shellexec-demo` library crate.
//!
//! Re-exports the environment-driven configuration for testing. The binary
//! entrypoint lives in `main.rs`.

pub mod config;
