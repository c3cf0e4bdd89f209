//! # Adapter Registry
//!
//! Maps (category, technology) to the technology's full footprint inside a
//! generated project: the files it owns (with their rendered templates), the
//! npm dependencies it brings, the environment variables it reads, and any
//! transform hooks to run on arrival.
//!
//! Entries are data, not code paths. Adding a technology pair means adding
//! an entry — either to the built-in catalog or via a JSON overlay file —
//! and the analyzer/planner/merger operate generically over any two entries
//! of the same category.

mod catalog;

use common::error::MigrationError;
use common::Category;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown technology `{name}` in category `{category}`")]
    UnknownTechnology { category: Category, name: String },
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("overlay parse error: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl From<RegistryError> for MigrationError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownTechnology { category, name } => {
                MigrationError::UnknownTechnology {
                    category: category.to_string(),
                    name,
                }
            }
            RegistryError::IoError(e) => MigrationError::Io(e),
            RegistryError::ParseError(e) => MigrationError::Json(e),
        }
    }
}

/// A file owned by an adapter, with the content its template renders to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnedFile {
    /// Project-relative path, `/`-separated.
    pub path: String,
    /// Exact content the generator writes for this technology.
    pub template: String,
}

/// Storage model family of a database technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseFamily {
    Relational,
    Document,
}

/// Structural traits of a database adapter, used for compatibility checks
/// and for the planner's database-change synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseProfile {
    pub family: DatabaseFamily,
    /// Whether the technology supports row-level security policies.
    pub row_level_security: bool,
    /// Declared by the adapter: importing data INTO this technology drops
    /// schema features (e.g. foreign-key constraints). Drives the plan's
    /// `data_loss` flag — never inferred.
    pub lossy_import: bool,
}

/// A data-driven single-file rewrite applied when migrating onto an adapter.
///
/// The planner folds each hook into a `Modify` file change so that backup
/// scoping and rollback cover the touched file like any other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformHook {
    pub name: String,
    /// Project-relative path of the file to rewrite.
    pub file: String,
    pub find: String,
    pub replace: String,
}

/// One technology's footprint within its category. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnologyAdapter {
    pub category: Category,
    pub name: String,
    pub version: String,
    pub owned_files: Vec<OwnedFile>,
    /// npm package name → version requirement.
    pub dependencies: BTreeMap<String, String>,
    /// Environment variable keys the technology reads.
    pub env_vars: BTreeSet<String>,
    /// Strings whose presence in project config files fingerprints this
    /// technology (middleware symbols, client class names, env keys).
    pub config_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_profile: Option<DatabaseProfile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transform_hooks: Vec<TransformHook>,
}

impl TechnologyAdapter {
    /// The template content for an owned file, if this adapter owns it.
    pub fn template_for(&self, rel_path: &str) -> Option<&str> {
        self.owned_files
            .iter()
            .find(|f| f.path == rel_path)
            .map(|f| f.template.as_str())
    }

    /// Project-relative paths of all owned files.
    pub fn owned_paths(&self) -> BTreeSet<&str> {
        self.owned_files.iter().map(|f| f.path.as_str()).collect()
    }
}

/// The registry proper: the built-in catalog plus any overlay entries.
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    adapters: Vec<TechnologyAdapter>,
}

impl AdapterRegistry {
    /// The catalog shipped with the engine.
    pub fn builtin() -> Self {
        Self {
            adapters: catalog::builtin_adapters(),
        }
    }

    /// Built-in catalog merged with entries from a JSON overlay file
    /// (an array of [`TechnologyAdapter`] objects). Overlay entries replace
    /// built-in entries with the same (category, name).
    pub fn with_overlay(path: &Path) -> Result<Self, RegistryError> {
        let mut registry = Self::builtin();
        let bytes = std::fs::read(path)?;
        let extra: Vec<TechnologyAdapter> = serde_json::from_slice(&bytes)?;
        for adapter in extra {
            registry.insert(adapter);
        }
        Ok(registry)
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, adapter: TechnologyAdapter) {
        self.adapters
            .retain(|a| !(a.category == adapter.category && a.name == adapter.name));
        self.adapters.push(adapter);
    }

    /// Looks up an adapter; fails with `UnknownTechnology` if absent.
    pub fn resolve(&self, category: Category, name: &str) -> Result<&TechnologyAdapter, RegistryError> {
        self.adapters
            .iter()
            .find(|a| a.category == category && a.name == name)
            .ok_or_else(|| RegistryError::UnknownTechnology {
                category,
                name: name.to_string(),
            })
    }

    /// All adapters registered for a category, catalog order.
    pub fn available(&self, category: Category) -> Vec<&TechnologyAdapter> {
        self.adapters
            .iter()
            .filter(|a| a.category == category)
            .collect()
    }
}
