//! Components JSON graph
//!
//! A root components file maps component names to the manifest that ships
//! them and may pull in further files through its `Imports` array:
//!
//! ```json
//! {
//!   "Imports": ["sub/a.json", "sub/b.json"],
//!   "Components": {
//!     "Microsoft.CodeAnalysis.Compilers": {
//!       "fileName": "Microsoft.CodeAnalysis.Compilers.vsman",
//!       "url": "https://drop/Products/roslyn/main/20160314.1;Microsoft.CodeAnalysis.Compilers.vsman",
//!       "version": "20160314.1"
//!     }
//!   }
//! }
//! ```
//!
//! Imports are resolved relative to the importing file and loaded depth
//! first, so documents end up in declaration order: the root, then each
//! import followed by its own imports. The first document to declare a name
//! owns it; later declarations of the same name are never read or written.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use serde_json::{Map, Value as JsonValue};

use crate::changeset::{build_change, GitChange};
use crate::error::{Error, Result};
use crate::path::resolve_relative;
use crate::services::FileSource;

const IMPORTS_KEY: &str = "Imports";
const COMPONENTS_KEY: &str = "Components";
const FILE_NAME_KEY: &str = "fileName";
const URL_KEY: &str = "url";
const VERSION_KEY: &str = "version";

/// A component entry: which manifest ships it and where it lives.
///
/// Components are immutable values; use [`Component::with_uri`] to derive a
/// copy pointing somewhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub name: String,
    pub filename: String,
    pub uri: String,
    pub version: Option<String>,
}

impl Component {
    pub fn new(
        name: impl Into<String>,
        filename: impl Into<String>,
        uri: impl Into<String>,
        version: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            uri: uri.into(),
            version,
        }
    }

    /// Copy of this component with a different URI.
    pub fn with_uri(&self, uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..self.clone()
        }
    }
}

struct ComponentsDocument {
    path: String,
    original: String,
    value: JsonValue,
    dirty: bool,
}

/// The root components file plus everything it imports.
pub struct ComponentsGraph {
    documents: Vec<ComponentsDocument>,
    /// Component name -> index into `documents`. Built once by `load`.
    component_to_file: HashMap<String, usize>,
}

impl ComponentsGraph {
    /// Load `root_path` and, recursively, every file it imports.
    ///
    /// A missing or malformed import fails the whole load.
    pub fn load(
        source: &dyn FileSource,
        commit: &str,
        root_path: &str,
        root_text: String,
    ) -> Result<Self> {
        let mut documents = Vec::new();
        let mut visited = HashSet::new();
        load_document(source, commit, root_path, root_text, &mut documents, &mut visited)?;

        let mut component_to_file: HashMap<String, usize> = HashMap::new();
        for (index, document) in documents.iter().enumerate() {
            for name in component_names(&document.value) {
                if let Some(&owner) = component_to_file.get(name) {
                    debug!(
                        "Component '{}' in {} is shadowed by {}",
                        name, document.path, documents[owner].path
                    );
                    continue;
                }
                component_to_file.insert(name.to_string(), index);
            }
        }

        Ok(Self {
            documents,
            component_to_file,
        })
    }

    /// Paths of every loaded document, root first.
    pub fn paths(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.path.as_str()).collect()
    }

    /// Path of the document that owns `name`.
    pub fn owner_of(&self, name: &str) -> Option<&str> {
        self.component_to_file
            .get(name)
            .map(|&index| self.documents[index].path.as_str())
    }

    /// Read the entry for `name` from its owning document.
    pub fn try_get_component_by_name(&self, name: &str) -> Option<Component> {
        let &index = self.component_to_file.get(name)?;
        let entry = self.documents[index]
            .value
            .get(COMPONENTS_KEY)?
            .get(name)?
            .as_object()?;

        let text = |key: &str| {
            entry
                .get(key)
                .and_then(JsonValue::as_str)
                .map(str::to_string)
        };

        Some(Component {
            name: name.to_string(),
            filename: text(FILE_NAME_KEY).unwrap_or_default(),
            uri: text(URL_KEY).unwrap_or_default(),
            version: text(VERSION_KEY),
        })
    }

    /// Write `component` into its owning document and mark that document
    /// dirty. Returns `false` if no document declares the component.
    ///
    /// A component without a version has its `version` property removed.
    pub fn update_component(&mut self, component: &Component) -> bool {
        let Some(&index) = self.component_to_file.get(&component.name) else {
            return false;
        };
        let document = &mut self.documents[index];
        let Some(entry) = document
            .value
            .get_mut(COMPONENTS_KEY)
            .and_then(|c| c.get_mut(&component.name))
        else {
            return false;
        };

        if !entry.is_object() {
            *entry = JsonValue::Object(Map::new());
        }
        let Some(entry) = entry.as_object_mut() else {
            return false;
        };

        entry.insert(
            FILE_NAME_KEY.to_string(),
            JsonValue::String(component.filename.clone()),
        );
        entry.insert(URL_KEY.to_string(), JsonValue::String(component.uri.clone()));
        match &component.version {
            Some(version) => {
                entry.insert(VERSION_KEY.to_string(), JsonValue::String(version.clone()));
            }
            None => {
                entry.shift_remove(VERSION_KEY);
            }
        }

        document.dirty = true;
        true
    }

    /// Changes for every dirty document that differs from its original.
    pub fn save(&self) -> Result<Vec<GitChange>> {
        let mut changes = Vec::new();
        for document in self.documents.iter().filter(|d| d.dirty) {
            let mut text = serde_json::to_string_pretty(&document.value)?;
            if document.original.ends_with('\n') {
                text.push('\n');
            }
            if let Some(change) = build_change(&document.path, Some(&document.original), Some(&text))
            {
                changes.push(change);
            }
        }
        Ok(changes)
    }
}

fn load_document(
    source: &dyn FileSource,
    commit: &str,
    path: &str,
    text: String,
    documents: &mut Vec<ComponentsDocument>,
    visited: &mut HashSet<String>,
) -> Result<()> {
    if !visited.insert(path.to_string()) {
        warn!("Components file {} is imported more than once; skipping", path);
        return Ok(());
    }

    let value: JsonValue = serde_json::from_str(text.trim_start_matches('\u{feff}'))
        .map_err(|e| Error::ComponentsJson {
            path: path.to_string(),
            message: e.to_string(),
        })?;

    let imports = import_paths(path, &value)?;
    documents.push(ComponentsDocument {
        path: path.to_string(),
        original: text,
        value,
        dirty: false,
    });

    for import in imports {
        let import_text = source
            .read_file(&import, commit)
            .map_err(|e| Error::FileLoad {
                path: import.clone(),
                commit: commit.to_string(),
                message: e.to_string(),
            })?
            .ok_or_else(|| Error::FileLoad {
                path: import.clone(),
                commit: commit.to_string(),
                message: format!("imported by {} but does not exist", path),
            })?;

        load_document(source, commit, &import, import_text, documents, visited).map_err(
            |e| match e {
                Error::FileLoad { .. } => e,
                other => Error::FileLoad {
                    path: import.clone(),
                    commit: commit.to_string(),
                    message: other.to_string(),
                },
            },
        )?;
    }

    Ok(())
}

fn import_paths(path: &str, value: &JsonValue) -> Result<Vec<String>> {
    let Some(imports) = value.get(IMPORTS_KEY) else {
        return Ok(Vec::new());
    };
    let imports = imports.as_array().ok_or_else(|| Error::ComponentsJson {
        path: path.to_string(),
        message: format!("'{}' must be an array", IMPORTS_KEY),
    })?;

    imports
        .iter()
        .map(|import| {
            import
                .as_str()
                .map(|relative| resolve_relative(path, relative))
                .ok_or_else(|| Error::ComponentsJson {
                    path: path.to_string(),
                    message: format!("'{}' entries must be strings", IMPORTS_KEY),
                })
        })
        .collect()
}

fn component_names(value: &JsonValue) -> impl Iterator<Item = &str> {
    value
        .get(COMPONENTS_KEY)
        .and_then(JsonValue::as_object)
        .into_iter()
        .flat_map(|components| components.keys().map(String::as_str))
}
