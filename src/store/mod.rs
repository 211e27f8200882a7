//! # Config Store
//!
//! The in-memory view of a target repository's dependency declarations at a
//! single commit. A store is created fresh for every insertion run, mutated
//! by the reconcilers, flushed to a list of [`GitChange`]s and dropped. No
//! state survives between runs.
//!
//! ## Files
//!
//! - **Package pins** (`config_path`): required; `<packages>` XML.
//! - **Legacy props** (`legacy_props_path`): optional; a missing file is
//!   logged and ignored, a malformed one aborts the load.
//! - **Components** (`components_paths`): the first candidate that exists is
//!   the root of the components graph and all of its imports are loaded.
//!   When no candidate exists the store simply has no components.
//!
//! ## Dirty tracking
//!
//! A file is only serialized on save once something has written to it.
//! The pin documents additionally ignore writes that leave a value unchanged,
//! so loading and saving without mutations always yields no changes.

mod components;
mod packages;

pub use components::{Component, ComponentsGraph};
pub use packages::{PinDocument, PinFormat};

use log::{info, warn};

use crate::changeset::{build_change, GitChange};
use crate::error::{Error, Result};
use crate::path::normalize_repo_path;
use crate::services::FileSource;
use crate::version::PackageInfo;

/// The file a package pin lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinSource {
    /// The package-pin file (`config_path`).
    Config,
    /// The legacy props file (`legacy_props_path`).
    Legacy,
}

impl std::fmt::Display for PinSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PinSource::Config => write!(f, "package pins"),
            PinSource::Legacy => write!(f, "legacy props"),
        }
    }
}

/// Where the store's files live in the target repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub config_path: String,
    pub legacy_props_path: Option<String>,
    /// Candidates for the root components file, tried in order.
    pub components_paths: Vec<String>,
}

/// Dependency declarations of the target repository at one commit.
pub struct ConfigStore {
    commit: String,
    config: PinDocument,
    legacy: Option<PinDocument>,
    components: Option<ComponentsGraph>,
}

impl ConfigStore {
    /// Load every dependency file at `commit`.
    pub fn load(source: &dyn FileSource, commit: &str, paths: &StorePaths) -> Result<Self> {
        let config_path = normalize_repo_path(&paths.config_path);
        let config_text = read(source, &config_path, commit)?.ok_or_else(|| Error::FileLoad {
            path: config_path.clone(),
            commit: commit.to_string(),
            message: "file does not exist".to_string(),
        })?;
        let config = PinDocument::parse(&config_path, &config_text, PinFormat::Packages)?;

        let legacy = match &paths.legacy_props_path {
            Some(legacy_path) => {
                let legacy_path = normalize_repo_path(legacy_path);
                match read(source, &legacy_path, commit)? {
                    Some(text) => Some(PinDocument::parse(
                        &legacy_path,
                        &text,
                        PinFormat::PackageReferences,
                    )?),
                    None => {
                        warn!(
                            "Legacy props file {} does not exist at {}; only {} will be updated",
                            legacy_path, commit, config_path
                        );
                        None
                    }
                }
            }
            None => None,
        };

        let mut components = None;
        for candidate in &paths.components_paths {
            let candidate = normalize_repo_path(candidate);
            if let Some(text) = read(source, &candidate, commit)? {
                components = Some(ComponentsGraph::load(source, commit, &candidate, text)?);
                break;
            }
        }
        match &components {
            Some(graph) => info!("Loaded {} components file(s)", graph.paths().len()),
            None => warn!(
                "None of the components files {:?} exist at {}",
                paths.components_paths, commit
            ),
        }

        Ok(Self {
            commit: commit.to_string(),
            config,
            legacy,
            components,
        })
    }

    /// The commit this store was loaded from.
    pub fn commit(&self) -> &str {
        &self.commit
    }

    pub fn has_components(&self) -> bool {
        self.components.is_some()
    }

    pub fn components(&self) -> Option<&ComponentsGraph> {
        self.components.as_ref()
    }

    /// Version pinned for `package` in the package-pin file.
    pub fn get_version_attribute(&self, package: &str) -> Option<&str> {
        self.config.version_attribute(package)
    }

    /// Version pinned for `package` in the legacy props file.
    pub fn get_legacy_version_attribute(&self, package: &str) -> Option<&str> {
        self.legacy
            .as_ref()
            .and_then(|legacy| legacy.version_attribute(package))
    }

    /// The version pinned for `package`: the package-pin file first, the
    /// legacy props file otherwise.
    pub fn pinned_version(&self, package: &str) -> Option<&str> {
        self.get_version_attribute(package)
            .or_else(|| self.get_legacy_version_attribute(package))
    }

    /// Every pin recorded for `package`, package-pin file first.
    ///
    /// The two files are versioned independently and may disagree.
    pub fn pins(&self, package: &str) -> Vec<(PinSource, String)> {
        let config = self
            .get_version_attribute(package)
            .map(|v| (PinSource::Config, v.to_string()));
        let legacy = self
            .get_legacy_version_attribute(package)
            .map(|v| (PinSource::Legacy, v.to_string()));
        config.into_iter().chain(legacy).collect()
    }

    /// Write `version` into one pin file only.
    ///
    /// Returns `false` when that file has no pin for `package`.
    pub fn set_pin_version(&mut self, source: PinSource, package: &str, version: &str) -> bool {
        match source {
            PinSource::Config => self.config.set_version(package, version),
            PinSource::Legacy => self
                .legacy
                .as_mut()
                .is_some_and(|legacy| legacy.set_version(package, version)),
        }
    }

    /// Write `package`'s version into every pin that exists for it, without
    /// comparing against what is pinned.
    ///
    /// Returns `true` if at least one pin was found.
    pub fn update_package_version(&mut self, package: &PackageInfo) -> bool {
        let version = package.version.to_string();
        let mut found = self.config.set_version(&package.library_name, &version);
        if let Some(legacy) = self.legacy.as_mut() {
            found |= legacy.set_version(&package.library_name, &version);
        }
        found
    }

    pub fn try_get_component_by_name(&self, name: &str) -> Option<Component> {
        self.components
            .as_ref()
            .and_then(|graph| graph.try_get_component_by_name(name))
    }

    /// Returns `false` when the component is not declared anywhere.
    pub fn update_component(&mut self, component: &Component) -> bool {
        self.components
            .as_mut()
            .is_some_and(|graph| graph.update_component(component))
    }

    /// Changes to the package-pin and legacy props files.
    pub fn save_config(&self) -> Result<Vec<GitChange>> {
        let mut changes = Vec::new();
        for document in std::iter::once(&self.config).chain(self.legacy.as_ref()) {
            if !document.is_dirty() {
                continue;
            }
            let text = document.serialize()?;
            if let Some(change) = build_change(document.path(), Some(document.original()), Some(&text))
            {
                changes.push(change);
            }
        }
        Ok(changes)
    }

    /// Changes to the components files.
    pub fn save_components(&self) -> Result<Vec<GitChange>> {
        match &self.components {
            Some(graph) => graph.save(),
            None => Ok(Vec::new()),
        }
    }
}

fn read(source: &dyn FileSource, path: &str, commit: &str) -> Result<Option<String>> {
    source.read_file(path, commit).map_err(|e| Error::FileLoad {
        path: path.to_string(),
        commit: commit.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::MemoryFS;
    use crate::version::PackageInfo;

    const CONFIG: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\r\n<packages>\r\n  <package id=\"Foo\" version=\"1.0.0\" />\r\n  <package id=\"Bar\" version=\"3.0.0\" />\r\n</packages>\r\n";

    const PROPS: &str = "<Project>\n  <ItemGroup>\n    <PackageReference Update=\"Foo\" Version=\"1.0.0\" />\n    <PackageReference Update=\"OnlyLegacy\" Version=\"0.5.0\" />\n  </ItemGroup>\n</Project>\n";

    const COMPONENTS: &str = "{\n  \"Components\": {\n    \"C\": {\n      \"fileName\": \"C.vsman\",\n      \"url\": \"https://drop/1;C.vsman\"\n    }\n  }\n}\n";

    fn paths() -> StorePaths {
        StorePaths {
            config_path: "default.config".to_string(),
            legacy_props_path: Some("build/Packages.props".to_string()),
            components_paths: vec![
                "missing-components.json".to_string(),
                "components.json".to_string(),
            ],
        }
    }

    fn repo() -> MemoryFS {
        let mut fs = MemoryFS::new();
        fs.add_file_string("default.config", CONFIG).unwrap();
        fs.add_file_string("build/Packages.props", PROPS).unwrap();
        fs.add_file_string("components.json", COMPONENTS).unwrap();
        fs
    }

    #[test]
    fn test_load_without_mutation_saves_nothing() {
        let store = ConfigStore::load(&repo(), "c1", &paths()).unwrap();
        assert_eq!(store.commit(), "c1");
        assert!(store.save_config().unwrap().is_empty());
        assert!(store.save_components().unwrap().is_empty());
    }

    #[test]
    fn test_lookup_prefers_config_then_legacy() {
        let store = ConfigStore::load(&repo(), "c1", &paths()).unwrap();
        assert_eq!(store.get_version_attribute("Foo"), Some("1.0.0"));
        assert_eq!(store.get_legacy_version_attribute("Foo"), Some("1.0.0"));
        assert_eq!(store.pinned_version("OnlyLegacy"), Some("0.5.0"));
        assert_eq!(store.pinned_version("Nope"), None);
    }

    #[test]
    fn test_update_writes_both_pin_files() {
        let mut store = ConfigStore::load(&repo(), "c1", &paths()).unwrap();
        let info = PackageInfo::parse("Foo.1.1.0.nupkg").unwrap();
        assert!(store.update_package_version(&info));

        let changes = store.save_config().unwrap();
        let paths: Vec<_> = changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["default.config", "build/Packages.props"]);
        assert!(changes[0].new_content.contains("version=\"1.1.0\""));
        assert!(changes[1].new_content.contains("Version=\"1.1.0\""));
        assert!(changes.iter().all(|c| !c.new_content.contains('\r')));
    }

    #[test]
    fn test_missing_legacy_props_is_soft() {
        let mut fs = MemoryFS::new();
        fs.add_file_string("default.config", CONFIG).unwrap();
        let store = ConfigStore::load(&fs, "c1", &paths()).unwrap();
        assert_eq!(store.get_legacy_version_attribute("Foo"), None);
        assert!(!store.has_components());
    }

    #[test]
    fn test_missing_root_config_is_fatal() {
        let err = ConfigStore::load(&MemoryFS::new(), "c1", &paths()).err().unwrap();
        assert!(matches!(err, Error::FileLoad { .. }));
    }

    #[test]
    fn test_malformed_config_is_fatal() {
        let mut fs = repo();
        fs.add_file_string("default.config", "<packages>").unwrap();
        let err = ConfigStore::load(&fs, "c1", &paths()).err().unwrap();
        assert!(matches!(err, Error::Xml { .. }));
    }

    #[test]
    fn test_components_resolved_from_second_candidate() {
        let mut store = ConfigStore::load(&repo(), "c1", &paths()).unwrap();
        let c = store.try_get_component_by_name("C").unwrap();
        assert!(store.update_component(&c.with_uri("https://drop/2;C.vsman")));
        let changes = store.save_components().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "components.json");
    }
}
