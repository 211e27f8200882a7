//! # Insertion Tool CLI
//!
//! Binary entry point for the `insertion-tool` command-line tool.
//!
//! It parses arguments with `clap`, runs the selected command and turns a
//! failed command into exit code 1. Usage errors exit with 2 from `clap`.
//!
//! Everything beyond argument handling and printing lives in the
//! `insertion_tool` library.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
