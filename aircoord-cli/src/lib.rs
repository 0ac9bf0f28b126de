//! CLI interface for aircoord
//!
//! This crate provides the `aircoord` binary: argument parsing and the
//! subcommands that run each coordination process.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
pub use commands::{run_command, shutdown_signal, StatusReport};
