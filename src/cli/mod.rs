//! Command-line interface for golden-forge.
//!
//! Provides the full `run` pipeline plus one command per stage, `lock` and
//! `verify`.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
