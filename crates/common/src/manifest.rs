//! The project stack manifest.
//!
//! Written by the scaffolding front-end at generation time and maintained by
//! the migration engine afterwards: which technology fills each category,
//! the checksum of every generated file as it left the template renderer,
//! and the append-only migration history.
//!
//! Lives at `{project_root}/.restack/manifest.json`.

use crate::error::MigrationError;
use crate::{checksum_file, Category};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Project-local namespace for engine state (manifest, backups, executions).
pub const STATE_DIR: &str = ".restack";
/// Manifest file name inside [`STATE_DIR`].
pub const MANIFEST_FILE: &str = "manifest.json";

const SCHEMA_VERSION: u32 = 2;

/// One completed migration, recorded forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub from: String,
    pub to: String,
    pub category: Category,
    /// Unix seconds at completion.
    pub date: u64,
    pub migration_id: String,
    pub reason: String,
}

/// Persisted configuration manifest of a generated project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackManifest {
    pub schema_version: u32,
    /// Which technology currently fills each category.
    pub technologies: BTreeMap<Category, String>,
    /// Project-relative path → checksum of the file as generated.
    /// A current checksum differing from this baseline means the user
    /// modified the file after generation.
    pub generated_checksums: BTreeMap<String, String>,
    /// Append-only. Entries are never rewritten or removed.
    #[serde(default)]
    pub migration_history: Vec<HistoryEntry>,
}

impl StackManifest {
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            technologies: BTreeMap::new(),
            generated_checksums: BTreeMap::new(),
            migration_history: Vec::new(),
        }
    }

    /// Path of the manifest file for a project root.
    pub fn path(project_root: &Path) -> PathBuf {
        project_root.join(STATE_DIR).join(MANIFEST_FILE)
    }

    /// Loads the manifest, or returns an empty one if the project has none
    /// (a project migrated for the first time without its generator state).
    pub fn load(project_root: &Path) -> Result<Self, MigrationError> {
        let path = Self::path(project_root);
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, project_root: &Path) -> Result<(), MigrationError> {
        let path = Self::path(project_root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, bytes)?;
        Ok(())
    }

    /// The technology currently recorded for `category`, if any.
    pub fn technology(&self, category: Category) -> Option<&str> {
        self.technologies.get(&category).map(String::as_str)
    }

    /// Records the generation-time checksum baseline for a file.
    pub fn record_generated(&mut self, rel_path: &str, checksum: String) {
        self.generated_checksums
            .insert(rel_path.to_string(), checksum);
    }

    /// Drops the baseline for a file the migration removed.
    pub fn forget_generated(&mut self, rel_path: &str) {
        self.generated_checksums.remove(rel_path);
    }

    /// Whether the file at `rel_path` diverged from its generated baseline.
    ///
    /// Returns `false` when no baseline was recorded or the file is gone —
    /// without a baseline there is no three-way merge base to speak of.
    pub fn is_user_modified(&self, project_root: &Path, rel_path: &str) -> bool {
        let Some(baseline) = self.generated_checksums.get(rel_path) else {
            return false;
        };
        match checksum_file(&project_root.join(rel_path)) {
            Ok(current) => current != *baseline,
            Err(_) => false,
        }
    }

    /// Appends a history entry. History is append-only by contract; there is
    /// deliberately no API that rewrites or truncates it.
    pub fn append_history(&mut self, entry: HistoryEntry) {
        self.migration_history.push(entry);
    }
}

impl Default for StackManifest {
    fn default() -> Self {
        Self::new()
    }
}
