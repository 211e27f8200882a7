//! # Validate Command Implementation
//!
//! This module implements the `validate` subcommand, which checks an
//! `.insertion.yaml` options file without contacting any service.
//!
//! ## Functionality
//!
//! - **Parsing**: the file must be valid YAML with only known keys.
//! - **Validation**: every problem [`config::InsertionOptions::validate`]
//!   finds is listed, not just the first one.
//! - **Summary**: for a valid file, prints where the build comes from,
//!   where it is inserted and which optional phases will run.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use insertion_tool::config::{self, BuildSource, ValidatedOptions};
use insertion_tool::output::{emoji, OutputConfig};

/// Validate an .insertion.yaml options file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the options file.
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = config::DEFAULT_OPTIONS_FILE,
        env = "INSERTION_CONFIG"
    )]
    pub config: PathBuf,
}

/// Execute the `validate` command.
pub fn execute(args: ValidateArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    println!(
        "{} Validating options: {}",
        emoji(&out, "🔍", "[SCAN]"),
        args.config.display()
    );

    let options = match config::from_file(&args.config) {
        Ok(options) => {
            println!("{} Options file parsed successfully", emoji(&out, "✅", "[OK]"));
            options
        }
        Err(e) => {
            println!("{} Options parsing failed: {}", emoji(&out, "❌", "[ERR]"), e);
            return Err(anyhow::anyhow!("Options parsing failed: {}", e));
        }
    };

    match options.validate() {
        Ok(validated) => {
            print_summary(&out, &validated);
            println!("\n{} Options are valid", emoji(&out, "✅", "[OK]"));
            Ok(())
        }
        Err(issues) => {
            println!(
                "\n{} Found {} problem(s):",
                emoji(&out, "❌", "[ERR]"),
                issues.len()
            );
            for issue in &issues {
                println!("   {}", issue);
            }
            Err(anyhow::anyhow!(
                "Options validation failed with {} problem(s)",
                issues.len()
            ))
        }
    }
}

fn print_summary(out: &OutputConfig, options: &ValidatedOptions) {
    println!("\n{} Insertion Summary:", emoji(out, "📊", "[INFO]"));
    println!(
        "   Component: {} ({})",
        options.component_name, options.component_branch
    );
    match &options.source {
        BuildSource::Service {
            definition,
            build_number,
            artifact_names,
        } => {
            println!("   Build definition: {}", definition);
            println!(
                "   Build: {}",
                build_number.as_deref().unwrap_or("latest succeeded")
            );
            println!("   Artifacts: {}", artifact_names.join(", "));
        }
        BuildSource::Local {
            artifacts_dir,
            build_number,
        } => {
            println!("   Local artifacts: {}", artifacts_dir.display());
            println!("   Build: {}", build_number);
        }
    }
    println!("   Target branch: {}", options.target_branch);
    match &options.service {
        Some(service) => println!(
            "   Repository: {} ({}/{})",
            service.url, service.project, service.repository
        ),
        None => println!(
            "{} No service configured; only `plan` can use these options",
            emoji(out, "⚠️", "[WARN]")
        ),
    }

    let mut steps = Vec::new();
    if options.insert_packages {
        steps.push("packages");
    }
    if options.insert_toolset {
        steps.push("toolset");
    }
    if options.insert_components {
        steps.push("components");
    }
    if !options.publish.cherry_pick.is_empty() {
        steps.push("cherry-pick");
    }
    if options.publish.validation_build_definition.is_some()
        || !options.publish.validation_policies.is_empty()
    {
        steps.push("validation");
    }
    if options.publish.auto_complete {
        steps.push("auto-complete");
    }
    if options.publish.retain_build {
        steps.push("retain-build");
    }
    println!("   Steps: {}", steps.join(", "));
}
