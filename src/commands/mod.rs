//! # CLI Command Implementations
//!
//! One module per `insertion-tool` subcommand. Each module defines an
//! `Args` struct derived with `clap` and an `execute` function that loads
//! the options, calls into the `insertion_tool` library and prints the
//! result.
//!
//! Commands return `anyhow::Result`; any error becomes exit code 1.

pub mod insert;
pub mod plan;
pub mod validate;
