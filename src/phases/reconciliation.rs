//! Reconciliation phases
//!
//! Loads the Config Store at the base commit, runs the package and
//! component reconcilers over the resolved artifacts and flushes the store
//! into a changeset. The orchestrator calls the steps one by one so it can
//! record a state after each; [`execute`] runs them all for `plan`.

use log::info;

use crate::artifacts::ArtifactLayout;
use crate::changeset::GitChange;
use crate::config::ValidatedOptions;
use crate::error::Result;
use crate::reconcile::{self, ComponentReport, PackageReport};
use crate::services::FileSource;
use crate::store::ConfigStore;

/// Everything reconciliation decided.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub packages: PackageReport,
    pub toolset: PackageReport,
    pub components: ComponentReport,
    pub changes: Vec<GitChange>,
}

pub fn load_store(
    options: &ValidatedOptions,
    source: &dyn FileSource,
    commit: &str,
) -> Result<ConfigStore> {
    info!("Loading dependency files at {}", commit);
    ConfigStore::load(source, commit, &options.store_paths)
}

/// Run the package reconciler and, when enabled, the toolset pass.
pub fn packages(
    options: &ValidatedOptions,
    layout: &ArtifactLayout,
    store: &mut ConfigStore,
    result: &mut Reconciliation,
) -> Result<()> {
    if !options.insert_packages && !options.insert_toolset {
        info!("Package insertion disabled");
        return Ok(());
    }

    let files = layout.package_files()?;
    if options.insert_packages {
        result.packages =
            reconcile::reconcile_package_files(&files, store, &options.package_rules)?;
    }
    if options.insert_toolset {
        result.toolset = reconcile::reconcile_toolset(&files, store, &options.package_rules)?;
    }
    Ok(())
}

pub fn components(
    options: &ValidatedOptions,
    layout: &ArtifactLayout,
    store: &mut ConfigStore,
    result: &mut Reconciliation,
) -> Result<()> {
    if !options.insert_components {
        info!("Component insertion disabled");
        return Ok(());
    }
    let manifests = layout.manifest_files()?;
    result.components = reconcile::reconcile_manifest_files(&manifests, store)?;
    Ok(())
}

/// Flush the store into the changeset, pin files first.
pub fn changeset(store: &ConfigStore, result: &mut Reconciliation) -> Result<()> {
    let mut changes = store.save_config()?;
    changes.extend(store.save_components()?);
    info!("Changeset has {} file change(s)", changes.len());
    result.changes = changes;
    Ok(())
}

/// All reconciliation steps in order.
pub fn execute(
    options: &ValidatedOptions,
    source: &dyn FileSource,
    commit: &str,
    layout: &ArtifactLayout,
) -> Result<Reconciliation> {
    let mut store = load_store(options, source, commit)?;
    let mut result = Reconciliation::default();
    packages(options, layout, &mut store, &mut result)?;
    components(options, layout, &mut store, &mut result)?;
    changeset(&store, &mut result)?;
    Ok(result)
}
