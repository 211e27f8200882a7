//! # Insert Command Implementation
//!
//! Runs a complete insertion against the configured Azure DevOps project:
//! resolve the build, reconcile the target repository, push the insertion
//! branch and open or update the pull request.
//!
//! The access token comes from `--token` or `INSERTION_TOKEN` and is never
//! read from the options file. A run that ends as a no-op is a success.

use anyhow::{Context, Result};
use clap::Args;
use log::info;
use std::path::PathBuf;

use insertion_tool::azdo::AzureDevOpsClient;
use insertion_tool::config;
use insertion_tool::output::{emoji, outcome_lines, OutputConfig};
use insertion_tool::phases::Insertion;
use insertion_tool::services::BuildService;

/// Insert a build and open or update the insertion pull request
#[derive(Args, Debug)]
pub struct InsertArgs {
    /// Path to the options file.
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = config::DEFAULT_OPTIONS_FILE,
        env = "INSERTION_CONFIG"
    )]
    pub config: PathBuf,

    /// Personal access token for the service.
    #[arg(long, env = "INSERTION_TOKEN", hide_env_values = true)]
    pub token: String,
}

/// Execute the `insert` command.
pub fn execute(args: InsertArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);

    let options = config::load_validated(&args.config)
        .with_context(|| format!("Failed to load options from {}", args.config.display()))?;
    let service = options.service.clone().ok_or_else(|| {
        anyhow::anyhow!("insert requires service-url, project and repository in the options file")
    })?;

    println!(
        "{} Inserting {} ({}) into {}",
        emoji(&out, "🚀", "[RUN]"),
        options.component_name,
        options.component_branch,
        options.target_branch
    );

    let client = AzureDevOpsClient::new(&service, args.token)?;
    info!("Using {} ({}/{})", service.url, service.project, service.repository);

    let builds: &dyn BuildService = &client;
    let outcome = Insertion::new(&options, &client, Some(builds)).run();

    for line in outcome_lines(&out, &outcome) {
        println!("{}", line);
    }

    if outcome.success {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Insertion failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        ))
    }
}
