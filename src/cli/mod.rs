//! Command-line interface for flake-forge.
//!
//! Provides the `triage` and `reproduce` commands that drive the agents
//! over JSON issue files.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
