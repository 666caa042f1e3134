//! Command-line interface for styling-jobs.
//!
//! Provides the worker entry point and the operator commands for queueing
//! jobs, inspecting their status and migrating the database.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, StoreArgs};
