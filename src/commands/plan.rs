//! # Plan Command Implementation
//!
//! Dry run of an insertion. The target repository is read from a local git
//! checkout, either at a commit or straight from the working tree, and the
//! build from a local artifacts directory. Nothing is pushed; `--apply`
//! writes the computed changes into the checkout instead.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use insertion_tool::config::{self, BuildSource};
use insertion_tool::filesystem::MemoryFS;
use insertion_tool::git::GitCheckout;
use insertion_tool::output::{emoji, OutputConfig};
use insertion_tool::phases::{self, resolve, write, PlanOutcome};
use insertion_tool::reconcile::PackageReport;

/// Compute the changes an insertion would make, without any service
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the options file.
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = config::DEFAULT_OPTIONS_FILE,
        env = "INSERTION_CONFIG"
    )]
    pub config: PathBuf,

    /// Local checkout of the target repository.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub repo: PathBuf,

    /// Commit to read the target repository at.
    #[arg(long, value_name = "REV", default_value = "HEAD", conflicts_with = "working_tree")]
    pub commit: String,

    /// Read the target repository from the working tree instead of a commit.
    #[arg(long)]
    pub working_tree: bool,

    /// Artifacts directory; defaults to `artifacts-dir` from the options.
    #[arg(long, value_name = "DIR")]
    pub artifacts: Option<PathBuf>,

    /// Build number used in the branch name and title.
    #[arg(long, value_name = "NUMBER")]
    pub build_number: Option<String>,

    /// Write the changes into the checkout.
    #[arg(long)]
    pub apply: bool,
}

/// Execute the `plan` command.
pub fn execute(args: PlanArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let options = config::load_validated(&args.config)
        .with_context(|| format!("Failed to load options from {}", args.config.display()))?;

    let (configured_dir, configured_number) = match &options.source {
        BuildSource::Local {
            artifacts_dir,
            build_number,
        } => (Some(artifacts_dir.clone()), Some(build_number.clone())),
        BuildSource::Service { build_number, .. } => (None, build_number.clone()),
    };
    let artifacts = args.artifacts.or(configured_dir).ok_or_else(|| {
        anyhow::anyhow!("plan needs --artifacts or artifacts-dir in the options file")
    })?;
    let build_number = args
        .build_number
        .or(configured_number)
        .unwrap_or_else(|| "local".to_string());

    let resolved = resolve::local(&artifacts, &build_number)?;

    println!(
        "{} Planning insertion of {} from {}",
        emoji(&out, "🔍", "[SCAN]"),
        build_number,
        artifacts.display()
    );

    let plan = if args.working_tree {
        let tree = MemoryFS::load_dir(&args.repo)
            .with_context(|| format!("Failed to read {}", args.repo.display()))?;
        phases::plan(&options, &tree, "working-tree", &resolved)?
    } else {
        let checkout = GitCheckout::open(&args.repo)?;
        let commit = checkout.rev_parse(&args.commit)?;
        phases::plan(&options, &checkout, &commit, &resolved)?
    };

    print_plan(&out, &plan);

    if args.apply && !plan.reconciliation.changes.is_empty() {
        write::execute(&plan.reconciliation.changes, &args.repo)?;
        println!(
            "\n{} Wrote {} file(s) into {}",
            emoji(&out, "✅", "[OK]"),
            plan.reconciliation.changes.len(),
            args.repo.display()
        );
    }
    Ok(())
}

fn print_packages(label: &str, report: &PackageReport) {
    for update in &report.updated {
        println!(
            "   {} {}: {} -> {}",
            label, update.package, update.previous, update.new
        );
    }
    for package in &report.downgrades_ignored {
        println!("   {} {}: older than the pin, kept", label, package);
    }
}

fn print_plan(out: &OutputConfig, plan: &PlanOutcome) {
    let result = &plan.reconciliation;
    println!("\n{} Insertion Plan:", emoji(out, "📊", "[INFO]"));
    println!("   Branch: {}", plan.branch);
    println!("   Title: {}", plan.title);

    print_packages("package", &result.packages);
    print_packages("toolset", &result.toolset);
    for name in &result.components.updated {
        println!("   component {}", name);
    }
    if result.components.skipped_urls > 0 {
        println!(
            "{} {} manifest payload URL(s) skipped",
            emoji(out, "⚠️", "[WARN]"),
            result.components.skipped_urls
        );
    }

    if result.changes.is_empty() {
        println!(
            "\n{} Nothing to insert; the target already matches this build",
            emoji(out, "✅", "[OK]")
        );
        return;
    }
    println!("\n   {} file(s) would change:", result.changes.len());
    for change in &result.changes {
        println!("     {} {}", change.change_type, change.path);
    }
}
