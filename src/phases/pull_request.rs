//! Pull request phase
//!
//! Creates the insertion PR, or refreshes the title and description of the
//! one named by `existing-pr`.

use std::fmt::Write as _;

use log::info;

use crate::config::ValidatedOptions;
use crate::error::Result;
use crate::services::{PullRequest, PullRequestDraft, VersionControl};

use super::reconciliation::Reconciliation;
use super::resolve::ResolvedBuild;

/// Markdown description listing what the insertion changed.
pub fn describe(
    options: &ValidatedOptions,
    build: &ResolvedBuild,
    reconciliation: &Reconciliation,
    cherry_picks: &[String],
) -> String {
    let mut text = String::new();

    let build_ref = match build.build.as_ref().and_then(|b| b.url.as_deref()) {
        Some(url) => format!("[{}]({})", build.build_number, url),
        None => build.build_number.clone(),
    };
    let _ = writeln!(
        text,
        "Insertion of {} build {} from `{}` into `{}`.",
        options.component_name, build_ref, options.component_branch, options.target_branch
    );

    let updates = reconciliation
        .packages
        .updated
        .iter()
        .chain(&reconciliation.toolset.updated);
    let mut wrote_header = false;
    for update in updates {
        if !wrote_header {
            let _ = writeln!(text, "\n### Updated packages\n");
            wrote_header = true;
        }
        let _ = writeln!(text, "- {}: {} -> {}", update.package, update.previous, update.new);
    }

    if !reconciliation.components.updated.is_empty() {
        let _ = writeln!(text, "\n### Updated components\n");
        for name in &reconciliation.components.updated {
            let _ = writeln!(text, "- {}", name);
        }
    }

    if !reconciliation.changes.is_empty() {
        let _ = writeln!(text, "\n### Changed files\n");
        for change in &reconciliation.changes {
            let _ = writeln!(text, "- `{}`", change.path);
        }
    }

    if !cherry_picks.is_empty() {
        let _ = writeln!(text, "\n### Cherry-picked commits\n");
        for commit in cherry_picks {
            let _ = writeln!(text, "- {}", commit);
        }
    }

    text
}

/// Create or update the pull request for `branch`.
pub fn execute(
    vcs: &dyn VersionControl,
    options: &ValidatedOptions,
    existing: Option<&PullRequest>,
    branch: &str,
    title: &str,
    description: &str,
) -> Result<PullRequest> {
    let draft = PullRequestDraft {
        source_branch: branch.to_string(),
        target_branch: options.target_branch.clone(),
        title: title.to_string(),
        description: description.to_string(),
        reviewers: options.publish.reviewers.clone(),
        is_draft: options.publish.draft,
    };

    let pr = match existing {
        Some(pr) => {
            let updated = vcs.update_pull_request(pr.id, &draft)?;
            info!("Updated pull request {}", updated.id);
            updated
        }
        None => {
            let created = vcs.create_pull_request(&draft)?;
            info!("Created pull request {}", created.id);
            created
        }
    };
    if let Some(url) = &pr.url {
        info!("Pull request: {}", url);
    }
    Ok(pr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactLayout;
    use crate::changeset::build_change;
    use crate::config;
    use crate::reconcile::PackageUpdate;
    use crate::services::Build;
    use std::path::PathBuf;

    #[test]
    fn test_description_lists_changes() {
        let options = config::parse(
            "insertion-name: R\ncomponent-name: Roslyn\ncomponent-branch: main\n\
             target-branch: dev\nbuild-definition: ci\n",
        )
        .unwrap()
        .validate()
        .unwrap();
        let build = ResolvedBuild {
            build: Some(Build {
                id: 1,
                build_number: "20160314.1".to_string(),
                definition_id: 1,
                source_branch: "main".to_string(),
                url: Some("https://builds/1".to_string()),
            }),
            build_number: "20160314.1".to_string(),
            layout: ArtifactLayout::Arcade {
                root: PathBuf::from("VSSetup"),
            },
        };
        let mut reconciliation = Reconciliation::default();
        reconciliation.packages.updated.push(PackageUpdate {
            package: "Foo".to_string(),
            previous: "1.0.0".to_string(),
            new: "1.1.0".to_string(),
        });
        reconciliation
            .changes
            .extend(build_change("default.config", Some("a"), Some("b")));

        let text = describe(&options, &build, &reconciliation, &[]);
        assert!(text.starts_with(
            "Insertion of Roslyn build [20160314.1](https://builds/1) from `main` into `dev`."
        ));
        assert!(text.contains("- Foo: 1.0.0 -> 1.1.0"));
        assert!(text.contains("- `default.config`"));
        assert!(!text.contains("Updated components"));
        assert!(!text.contains("Cherry-picked"));
    }
}
