//! # Reconcilers
//!
//! Reconciliation is where a build's artifacts meet the target repository's
//! [`ConfigStore`](crate::store::ConfigStore). Both reconcilers only write
//! through the store, so deciding which files end up in the changeset stays
//! the store's job.
//!
//! - [`packages`]: moves package pins forward, never backward.
//! - [`components`]: points declared components at the new drop.

pub mod components;
pub mod packages;

pub use components::{reconcile_manifest_files, ComponentReport};
pub use packages::{
    decide, reconcile_package_files, reconcile_packages, reconcile_toolset, PackageReport,
    PackageRules, PackageUpdate, PinDecision,
};
