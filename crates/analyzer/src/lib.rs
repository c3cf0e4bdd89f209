//! Project fingerprinting.
//!
//! Detects which technology currently fills a category by weighing three
//! evidence sources against every registered adapter:
//! 1. dependency-manifest entries (`package.json`),
//! 2. owned-file path signatures on disk,
//! 3. known configuration keys found in env/config files (single
//!    Aho-Corasick pass).
//!
//! Ties break on matched distinguishing files first, then matched
//! dependency entries. A winner below the confidence gate means the project
//! does not carry this category at all → `IncompatibleCategory`.

use aho_corasick::AhoCorasick;
use common::error::MigrationError;
use common::Category;
use registry::{AdapterRegistry, DatabaseFamily, TechnologyAdapter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use walkdir::WalkDir;

/// File extensions scanned for configuration-key signatures.
const CONFIG_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "json", "toml", "yaml", "yml", "env", "prisma",
];

/// Directory names never scanned.
const SCAN_EXCLUDED: &[&str] = &["node_modules", ".git", ".restack", "dist", ".next", "target"];

/// Compatibility verdict between a source and a target adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Compatibility {
    pub compatible: bool,
    pub warnings: Vec<String>,
    pub blocking_issues: Vec<String>,
}

/// Everything the planner needs to know about the current project state.
/// Created fresh per invocation; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationAnalysis {
    pub source_adapter: TechnologyAdapter,
    pub target_adapter: TechnologyAdapter,
    /// Owned files of the source adapter found on disk.
    pub detected_files: Vec<String>,
    /// Source-adapter dependencies found in `package.json`.
    pub detected_dependencies: Vec<String>,
    pub compatibility: Compatibility,
}

/// Per-adapter evidence gathered during detection.
#[derive(Debug, Default, Clone)]
struct Evidence {
    file_matches: Vec<String>,
    dep_matches: Vec<String>,
    key_hits: usize,
}

impl Evidence {
    /// Detection confidence gate: one dependency entry or two distinguishing
    /// files. Key hits alone are too weak (READMEs mention competitors).
    fn confident(&self) -> bool {
        !self.dep_matches.is_empty() || self.file_matches.len() >= 2
    }

    fn rank(&self) -> (usize, usize, usize) {
        (self.file_matches.len(), self.dep_matches.len(), self.key_hits)
    }
}

/// Analyzes `project_root` and resolves the migration endpoints.
///
/// `declared_source` is the operator's `--from` value; detection always
/// runs, and a mismatch is surfaced as a warning (detection wins).
pub fn analyze(
    project_root: &Path,
    registry: &AdapterRegistry,
    category: Category,
    target_name: &str,
    declared_source: Option<&str>,
) -> Result<MigrationAnalysis, MigrationError> {
    let root = dunce::canonicalize(project_root)?;
    let target = registry.resolve(category, target_name)?.clone();

    let candidates = registry.available(category);
    if candidates.is_empty() {
        return Err(MigrationError::IncompatibleCategory {
            category: category.to_string(),
            root: root.display().to_string(),
        });
    }

    let installed_deps = read_package_dependencies(&root);
    let key_hits = scan_config_keys(&root, &candidates);

    let mut best: Option<(&TechnologyAdapter, Evidence)> = None;
    for (i, adapter) in candidates.iter().enumerate() {
        let mut ev = Evidence {
            key_hits: key_hits[i],
            ..Default::default()
        };
        for owned in &adapter.owned_files {
            if root.join(&owned.path).is_file() {
                ev.file_matches.push(owned.path.clone());
            }
        }
        for dep in adapter.dependencies.keys() {
            if installed_deps.contains(dep) {
                ev.dep_matches.push(dep.clone());
            }
        }
        let replaces = match &best {
            Some((_, top)) => ev.rank() > top.rank(),
            None => true,
        };
        if replaces {
            best = Some((*adapter, ev));
        }
    }

    let (source, evidence) = best.ok_or_else(|| MigrationError::IncompatibleCategory {
        category: category.to_string(),
        root: root.display().to_string(),
    })?;
    if !evidence.confident() {
        return Err(MigrationError::IncompatibleCategory {
            category: category.to_string(),
            root: root.display().to_string(),
        });
    }

    let mut compatibility = check_compatibility(source, &target);
    if let Some(declared) = declared_source {
        if declared != source.name {
            compatibility.warnings.push(format!(
                "--from said `{declared}` but `{}` was detected; proceeding with the detected technology",
                source.name
            ));
        }
    }

    Ok(MigrationAnalysis {
        source_adapter: source.clone(),
        target_adapter: target,
        detected_files: evidence.file_matches.clone(),
        detected_dependencies: evidence.dep_matches.clone(),
        compatibility,
    })
}

/// Structural compatibility between two adapters of the same category.
fn check_compatibility(source: &TechnologyAdapter, target: &TechnologyAdapter) -> Compatibility {
    let mut warnings = Vec::new();
    let mut blocking = Vec::new();

    if source.name == target.name {
        blocking.push(format!(
            "source and target are both `{}`; nothing to migrate",
            source.name
        ));
    }

    if let (Some(src), Some(dst)) = (&source.database_profile, &target.database_profile) {
        if src.family != dst.family {
            let (a, b) = match src.family {
                DatabaseFamily::Relational => ("relational", "document-store"),
                DatabaseFamily::Document => ("document-store", "relational"),
            };
            blocking.push(format!(
                "{} is {a} but {} is {b}; schemas cannot be carried across automatically",
                source.name, target.name
            ));
        }
        if src.row_level_security && !dst.row_level_security {
            blocking.push(format!(
                "{} row-level security policies have no analog in {}",
                source.name, target.name
            ));
        }
        if dst.lossy_import {
            warnings.push(format!(
                "importing into {} drops schema features (adapter declares lossy import)",
                target.name
            ));
        }
    }

    Compatibility {
        compatible: blocking.is_empty(),
        warnings,
        blocking_issues: blocking,
    }
}

/// Dependency names from `package.json` (`dependencies` + `devDependencies`).
fn read_package_dependencies(root: &Path) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let Ok(bytes) = std::fs::read(root.join("package.json")) else {
        return names;
    };
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
        return names;
    };
    for section in ["dependencies", "devDependencies"] {
        if let Some(map) = value.get(section).and_then(|v| v.as_object()) {
            names.extend(map.keys().cloned());
        }
    }
    names
}

/// One Aho-Corasick pass over config-like files, counting hits of each
/// candidate adapter's signature keys. Returns hit counts aligned with
/// `candidates`.
fn scan_config_keys(root: &Path, candidates: &[&TechnologyAdapter]) -> Vec<usize> {
    let mut patterns: Vec<&str> = Vec::new();
    let mut owner: Vec<usize> = Vec::new();
    for (i, adapter) in candidates.iter().enumerate() {
        for key in &adapter.config_keys {
            patterns.push(key.as_str());
            owner.push(i);
        }
    }
    let mut hits = vec![0usize; candidates.len()];
    if patterns.is_empty() {
        return hits;
    }
    let Ok(ac) = AhoCorasick::new(&patterns) else {
        return hits;
    };

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_scan_excluded(e.path()))
        .flatten()
    {
        let path = entry.path();
        if !path.is_file() || !is_config_file(path) {
            continue;
        }
        let Ok(content) = std::fs::read(path) else {
            continue;
        };
        for mat in ac.find_iter(&content) {
            hits[owner[mat.pattern().as_usize()]] += 1;
        }
    }
    hits
}

fn is_config_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name.starts_with(".env") {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| CONFIG_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn is_scan_excluded(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| SCAN_EXCLUDED.contains(&name))
        .unwrap_or(false)
}
