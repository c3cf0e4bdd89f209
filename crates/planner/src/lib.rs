//! Plan synthesis.
//!
//! Diffs the source and target adapters into an ordered change list. The
//! ordering policy is fixed and deterministic: all `Add`s first, then
//! `Modify`s, then `Delete`s, then dependency changes, then environment
//! variables last — new files exist before old ones are removed, and
//! dependencies are updated before the environment that assumes them.
//!
//! Planning mutates nothing and a plan is consumed exactly once by the
//! executor; two plans computed against an unchanged project are identical
//! (content-hash ids, no wall-clock input besides the timestamp field).

use analyzer::MigrationAnalysis;
use common::error::MigrationError;
use common::manifest::StackManifest;
use common::Category;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One file-level mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileChange {
    Add {
        path: String,
        content: String,
        reason: String,
    },
    Modify {
        path: String,
        diff: String,
        reason: String,
    },
    Delete {
        path: String,
        reason: String,
    },
}

impl FileChange {
    pub fn path(&self) -> &str {
        match self {
            FileChange::Add { path, .. }
            | FileChange::Modify { path, .. }
            | FileChange::Delete { path, .. } => path,
        }
    }
}

/// Dependency-manifest mutation (set difference, not version diff).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DependencyChange {
    Add { name: String, version: String },
    Remove { name: String },
}

/// Environment-variable mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvVarChange {
    Add { key: String },
    Remove { key: String },
}

/// One step of a database migration. `command` is an operator-supplied or
/// adapter-supplied shell command; `None` means the step is recorded but
/// there is nothing to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub name: String,
    pub command: Option<String>,
    pub reversible: bool,
}

/// Database-level portion of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseChange {
    pub requires_migration: bool,
    pub migration_steps: Vec<MigrationStep>,
    /// Adapter-declared: the import side drops schema features. Requires
    /// explicit operator acknowledgment before execution.
    pub data_loss: bool,
    pub estimated_duration_secs: u64,
}

/// Coarse disruption classification, driving confirmation gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// The ordered, computed set of changes moving a project between adapters.
/// Immutable once computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Content hash of the change set — identical projects plan identically.
    pub id: String,
    /// Unix seconds at planning time. Not part of the id.
    pub timestamp: u64,
    pub from: String,
    pub to: String,
    pub category: Category,
    pub file_changes: Vec<FileChange>,
    pub dependency_changes: Vec<DependencyChange>,
    pub env_var_changes: Vec<EnvVarChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_changes: Option<DatabaseChange>,
    pub risk_level: RiskLevel,
    /// Source-owned files that diverged from their generated baseline;
    /// the executor routes their `Modify` steps through the merger.
    pub user_modified: Vec<String>,
}

impl MigrationPlan {
    /// Every project-relative path a run of this plan may touch, including
    /// the dependency manifest and env file when those change. Used to
    /// scope the pre-execution backup.
    pub fn touched_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .file_changes
            .iter()
            .map(|c| c.path().to_string())
            .collect();
        if !self.dependency_changes.is_empty() {
            paths.push("package.json".to_string());
        }
        if !self.env_var_changes.is_empty() {
            paths.push(".env.example".to_string());
        }
        paths.sort();
        paths.dedup();
        paths
    }
}

/// Computes the migration plan for an analysis against the project state.
pub fn plan(
    analysis: &MigrationAnalysis,
    project_root: &Path,
    manifest: &StackManifest,
) -> Result<MigrationPlan, MigrationError> {
    let source = &analysis.source_adapter;
    let target = &analysis.target_adapter;

    if !analysis.compatibility.compatible {
        return Err(MigrationError::IncompatibleTechnologies(
            analysis.compatibility.blocking_issues.join("; "),
        ));
    }

    let source_paths = source.owned_paths();
    let target_paths = target.owned_paths();

    let mut adds = Vec::new();
    let mut modifies = Vec::new();
    let mut deletes = Vec::new();

    // Files only in the target: Add.
    for owned in &target.owned_files {
        if !source_paths.contains(owned.path.as_str()) {
            adds.push(FileChange::Add {
                path: owned.path.clone(),
                content: owned.template.clone(),
                reason: format!("required by {}", target.name),
            });
        }
    }

    // Files in both with differing templates: Modify.
    for owned in &target.owned_files {
        if let Some(src_template) = source.template_for(&owned.path) {
            if src_template != owned.template {
                modifies.push(FileChange::Modify {
                    path: owned.path.clone(),
                    diff: merger::unified_diff(src_template, &owned.template),
                    reason: format!("retarget from {} to {}", source.name, target.name),
                });
            }
        }
    }

    // Transform hooks become Modify entries so backup scoping covers them.
    for hook in &target.transform_hooks {
        let already = modifies.iter().any(|c| c.path() == hook.file)
            || adds.iter().any(|c| c.path() == hook.file);
        if !already && project_root.join(&hook.file).is_file() {
            modifies.push(FileChange::Modify {
                path: hook.file.clone(),
                diff: format!("- {}\n+ {}\n", hook.find, hook.replace),
                reason: format!("transform hook {}", hook.name),
            });
        }
    }

    // Files only in the source and not reused: Delete.
    for owned in &source.owned_files {
        if !target_paths.contains(owned.path.as_str()) {
            deletes.push(FileChange::Delete {
                path: owned.path.clone(),
                reason: format!("owned by {}, unused by {}", source.name, target.name),
            });
        }
    }

    let mut file_changes = adds;
    file_changes.extend(modifies);
    file_changes.extend(deletes);

    // Dependencies and env vars: plain set difference, target-sorted.
    let mut dependency_changes: Vec<DependencyChange> = target
        .dependencies
        .iter()
        .filter(|(name, _)| !source.dependencies.contains_key(*name))
        .map(|(name, version)| DependencyChange::Add {
            name: name.clone(),
            version: version.clone(),
        })
        .collect();
    dependency_changes.extend(
        source
            .dependencies
            .keys()
            .filter(|name| !target.dependencies.contains_key(*name))
            .map(|name| DependencyChange::Remove { name: name.clone() }),
    );

    let mut env_var_changes: Vec<EnvVarChange> = target
        .env_vars
        .difference(&source.env_vars)
        .map(|key| EnvVarChange::Add { key: key.clone() })
        .collect();
    env_var_changes.extend(
        source
            .env_vars
            .difference(&target.env_vars)
            .map(|key| EnvVarChange::Remove { key: key.clone() }),
    );

    // User-modified source files: candidates for the three-way merge.
    let user_modified: Vec<String> = source
        .owned_files
        .iter()
        .map(|f| f.path.clone())
        .filter(|path| manifest.is_user_modified(project_root, path))
        .collect();

    let database_changes = database_change(analysis);
    let risk_level = score_risk(&user_modified, database_changes.as_ref());

    let id = plan_id(
        analysis.source_adapter.category,
        &source.name,
        &target.name,
        &file_changes,
        &dependency_changes,
        &env_var_changes,
    )?;

    Ok(MigrationPlan {
        id,
        timestamp: common::unix_now(),
        from: source.name.clone(),
        to: target.name.clone(),
        category: source.category,
        file_changes,
        dependency_changes,
        env_var_changes,
        database_changes,
        risk_level,
        user_modified,
    })
}

/// Synthesizes the database change for database-category migrations.
fn database_change(analysis: &MigrationAnalysis) -> Option<DatabaseChange> {
    let target_profile = analysis.target_adapter.database_profile.as_ref()?;
    if analysis.source_adapter.database_profile.is_none() {
        return None;
    }

    let data_loss = target_profile.lossy_import;
    let migration_steps = vec![
        MigrationStep {
            name: "export-schema".into(),
            command: None,
            reversible: true,
        },
        MigrationStep {
            name: "export-data".into(),
            command: None,
            reversible: true,
        },
        MigrationStep {
            name: "import-schema".into(),
            command: None,
            reversible: !data_loss,
        },
        MigrationStep {
            name: "import-data".into(),
            command: None,
            reversible: !data_loss,
        },
    ];
    let estimated_duration_secs = 90 * migration_steps.len() as u64;

    Some(DatabaseChange {
        requires_migration: true,
        migration_steps,
        data_loss,
        estimated_duration_secs,
    })
}

/// Deterministic risk scoring.
///
/// `low`: no database change and at most 3 user-modified files.
/// `high`: a data-loss database change, or more than 10 user-modified files.
/// `medium`: everything in between.
fn score_risk(user_modified: &[String], db: Option<&DatabaseChange>) -> RiskLevel {
    let data_loss = db.map(|d| d.data_loss).unwrap_or(false);
    if data_loss || user_modified.len() > 10 {
        RiskLevel::High
    } else if db.is_none() && user_modified.len() <= 3 {
        RiskLevel::Low
    } else {
        RiskLevel::Medium
    }
}

/// Content-hash plan id: blake3 over the serialized change set.
fn plan_id(
    category: Category,
    from: &str,
    to: &str,
    files: &[FileChange],
    deps: &[DependencyChange],
    envs: &[EnvVarChange],
) -> Result<String, MigrationError> {
    let payload = serde_json::to_vec(&(category, from, to, files, deps, envs))?;
    Ok(common::checksum_bytes(&payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::checksum_bytes;
    use registry::AdapterRegistry;
    use std::fs;
    use std::path::Path;

    fn seed_project(root: &Path, registry: &AdapterRegistry, category: Category, tech: &str) -> StackManifest {
        let adapter = registry.resolve(category, tech).unwrap();
        let mut manifest = StackManifest::new();
        for owned in &adapter.owned_files {
            let path = root.join(&owned.path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, &owned.template).unwrap();
            manifest.record_generated(&owned.path, checksum_bytes(owned.template.as_bytes()));
        }
        let deps: serde_json::Map<String, serde_json::Value> = adapter
            .dependencies
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        fs::write(
            root.join("package.json"),
            serde_json::to_vec_pretty(&serde_json::json!({"name": "fixture", "dependencies": deps}))
                .unwrap(),
        )
        .unwrap();
        manifest.technologies.insert(category, tech.to_string());
        manifest
    }

    fn analysis_for(
        root: &Path,
        registry: &AdapterRegistry,
        category: Category,
        target: &str,
    ) -> analyzer::MigrationAnalysis {
        analyzer::analyze(root, registry, category, target, None).unwrap()
    }

    #[test]
    fn test_clerk_to_workos_plan_shape() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        let manifest = seed_project(dir.path(), &registry, Category::Auth, "clerk");
        let analysis = analysis_for(dir.path(), &registry, Category::Auth, "workos");

        let plan = plan(&analysis, dir.path(), &manifest).unwrap();

        // workos-only file added, clerk middleware deleted, shared provider modified.
        assert!(plan.file_changes.iter().any(
            |c| matches!(c, FileChange::Add { path, .. } if path == "src/lib/auth/callback.ts")
        ));
        assert!(plan.file_changes.iter().any(
            |c| matches!(c, FileChange::Delete { path, .. } if path == "src/middleware/clerk.ts")
        ));
        assert!(plan.file_changes.iter().any(
            |c| matches!(c, FileChange::Modify { path, .. } if path == "src/lib/auth/provider.ts")
        ));

        // Dependency swap clerk → workos.
        assert!(plan
            .dependency_changes
            .contains(&DependencyChange::Add {
                name: "@workos-inc/node".into(),
                version: "^7.0.0".into()
            }));
        assert!(plan
            .dependency_changes
            .contains(&DependencyChange::Remove {
                name: "@clerk/nextjs".into()
            }));

        // No database change, no user-modified files: low risk.
        assert!(plan.database_changes.is_none());
        assert_eq!(plan.risk_level, RiskLevel::Low);
        assert!(plan.user_modified.is_empty());
    }

    #[test]
    fn test_ordering_adds_then_modifies_then_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        let manifest = seed_project(dir.path(), &registry, Category::Auth, "clerk");
        let analysis = analysis_for(dir.path(), &registry, Category::Auth, "workos");

        let plan = plan(&analysis, dir.path(), &manifest).unwrap();
        let kind_rank = |c: &FileChange| match c {
            FileChange::Add { .. } => 0,
            FileChange::Modify { .. } => 1,
            FileChange::Delete { .. } => 2,
        };
        let ranks: Vec<_> = plan.file_changes.iter().map(kind_rank).collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted, "changes must be Add, Modify, Delete in order");
    }

    #[test]
    fn test_planning_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        let manifest = seed_project(dir.path(), &registry, Category::Auth, "clerk");

        let a1 = analysis_for(dir.path(), &registry, Category::Auth, "workos");
        let p1 = plan(&a1, dir.path(), &manifest).unwrap();
        let a2 = analysis_for(dir.path(), &registry, Category::Auth, "workos");
        let p2 = plan(&a2, dir.path(), &manifest).unwrap();

        assert_eq!(p1.id, p2.id);
        assert_eq!(p1.file_changes, p2.file_changes);
        assert_eq!(p1.dependency_changes, p2.dependency_changes);
        assert_eq!(p1.env_var_changes, p2.env_var_changes);
        assert_eq!(p1.risk_level, p2.risk_level);
    }

    #[test]
    fn test_neon_to_planetscale_carries_data_loss() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        let manifest = seed_project(dir.path(), &registry, Category::Database, "neon");

        // User modified the schema file after generation.
        let schema = dir.path().join("src/lib/db/schema.ts");
        let mut content = fs::read_to_string(&schema).unwrap();
        content.push_str("export const comments = \"comments\";\n");
        fs::write(&schema, content).unwrap();

        let analysis = analysis_for(dir.path(), &registry, Category::Database, "planetscale");
        let plan = plan(&analysis, dir.path(), &manifest).unwrap();

        let db = plan.database_changes.as_ref().unwrap();
        assert!(db.requires_migration);
        assert!(db.data_loss);
        assert_eq!(plan.risk_level, RiskLevel::High);
        assert!(plan
            .user_modified
            .contains(&"src/lib/db/schema.ts".to_string()));
    }

    #[test]
    fn test_unmodified_project_has_no_merge_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        let manifest = seed_project(dir.path(), &registry, Category::Email, "resend");
        let analysis = analysis_for(dir.path(), &registry, Category::Email, "postmark");

        let plan = plan(&analysis, dir.path(), &manifest).unwrap();
        assert!(plan.user_modified.is_empty());
    }

    #[test]
    fn test_blocking_compatibility_refuses_to_plan() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        let manifest = seed_project(dir.path(), &registry, Category::Database, "neon");
        let analysis = analysis_for(dir.path(), &registry, Category::Database, "mongodb");

        let err = plan(&analysis, dir.path(), &manifest).unwrap_err();
        assert!(matches!(err, MigrationError::IncompatibleTechnologies(_)));
    }

    #[test]
    fn test_touched_paths_cover_carrier_files() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        let manifest = seed_project(dir.path(), &registry, Category::Auth, "clerk");
        let analysis = analysis_for(dir.path(), &registry, Category::Auth, "workos");

        let plan = plan(&analysis, dir.path(), &manifest).unwrap();
        let touched = plan.touched_paths();
        assert!(touched.contains(&"package.json".to_string()));
        assert!(touched.contains(&".env.example".to_string()));
        assert!(touched.contains(&"src/middleware/clerk.ts".to_string()));
    }
}
