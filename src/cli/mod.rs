//! Command-line interface for scan-forge.
//!
//! Provides the batch `run` command and the `aggregate` recovery command.

mod commands;

pub use commands::{parse_cli, run_with_cli};
