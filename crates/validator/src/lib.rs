//! Post-migration validation.
//!
//! Runs after every executor step succeeded: structural checks over the
//! project tree plus the project's own test suite as a subprocess. A
//! `Failure` verdict is surfaced with a rollback recommendation but never
//! acted on automatically — test failures can be environment-specific, so
//! the operator decides.

use aho_corasick::AhoCorasick;
use common::error::MigrationError;
use common::probe;
use planner::{DependencyChange, FileChange, MigrationPlan};
use registry::AdapterRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use walkdir::WalkDir;

/// Directory names excluded from the leftover-marker sweep.
const SWEEP_EXCLUDED: &[&str] = &["node_modules", ".git", ".restack", "dist", ".next", "target"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One structural check outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub severity: Severity,
}

/// Outcome of the project's own test suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSummary {
    /// False when no test runner was available (reported as info).
    pub ran: bool,
    pub passed: Option<bool>,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Success,
    Warnings,
    Failure,
}

/// Aggregated validation result for one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub execution_id: String,
    pub checks: Vec<CheckResult>,
    pub test_summary: TestSummary,
    pub overall: Verdict,
}

impl ValidationReport {
    fn aggregate(checks: &[CheckResult], tests: &TestSummary) -> Verdict {
        let failed_error = checks
            .iter()
            .any(|c| !c.passed && c.severity == Severity::Error)
            || tests.passed == Some(false);
        let failed_warning = checks
            .iter()
            .any(|c| !c.passed && c.severity == Severity::Warning);
        if failed_error {
            Verdict::Failure
        } else if failed_warning {
            Verdict::Warnings
        } else {
            Verdict::Success
        }
    }
}

/// Validation knobs.
#[derive(Debug, Clone, Default)]
pub struct ValidatorOptions {
    /// Row-count probe command; compared against `pre_row_counts`.
    pub row_count_cmd: Option<String>,
    /// Skip the test-suite subprocess (used by the CLI for quick runs).
    pub skip_tests: bool,
}

/// Validates a migrated project against the applied plan.
pub fn validate(
    project_root: &Path,
    plan: &MigrationPlan,
    registry: &AdapterRegistry,
    execution_id: &str,
    pre_row_counts: Option<&BTreeMap<String, u64>>,
    options: &ValidatorOptions,
) -> Result<ValidationReport, MigrationError> {
    let target = registry.resolve(plan.category, &plan.to)?;

    let mut checks = Vec::new();

    // Target footprint present.
    let mut missing: Vec<&str> = target
        .owned_files
        .iter()
        .map(|f| f.path.as_str())
        .filter(|p| !project_root.join(p).is_file())
        .collect();
    missing.sort();
    checks.push(CheckResult {
        name: "target-files-present".into(),
        passed: missing.is_empty(),
        message: if missing.is_empty() {
            format!("all {} files owned by {} exist", target.owned_files.len(), plan.to)
        } else {
            format!("missing: {}", missing.join(", "))
        },
        severity: Severity::Error,
    });

    // Source leftovers gone.
    let leftovers: Vec<String> = plan
        .file_changes
        .iter()
        .filter_map(|c| match c {
            FileChange::Delete { path, .. } if project_root.join(path).exists() => {
                Some(path.clone())
            }
            _ => None,
        })
        .collect();
    checks.push(CheckResult {
        name: "source-files-removed".into(),
        passed: leftovers.is_empty(),
        message: if leftovers.is_empty() {
            "no source-owned files remain".into()
        } else {
            format!("still present: {}", leftovers.join(", "))
        },
        severity: Severity::Warning,
    });

    checks.push(dependency_check(project_root, plan));
    checks.push(env_check(project_root, target.env_vars.iter()));
    checks.push(marker_sweep(project_root));

    if let Some(db) = &plan.database_changes {
        checks.push(row_count_check(db.requires_migration, pre_row_counts, options));
    }

    let test_summary = if options.skip_tests {
        TestSummary {
            ran: false,
            passed: None,
            detail: "test suite skipped by request".into(),
        }
    } else {
        run_test_suite(project_root)
    };

    let overall = ValidationReport::aggregate(&checks, &test_summary);
    Ok(ValidationReport {
        execution_id: execution_id.to_string(),
        checks,
        test_summary,
        overall,
    })
}

/// Target dependencies present, source-only dependencies gone.
fn dependency_check(project_root: &Path, plan: &MigrationPlan) -> CheckResult {
    let path = project_root.join("package.json");
    let parsed: Option<serde_json::Value> = std::fs::read(&path)
        .ok()
        .and_then(|b| serde_json::from_slice(&b).ok());
    let Some(pkg) = parsed else {
        return CheckResult {
            name: "dependency-manifest".into(),
            passed: false,
            message: "package.json is missing or unparsable".into(),
            severity: Severity::Error,
        };
    };

    let installed: Vec<&str> = ["dependencies", "devDependencies"]
        .iter()
        .filter_map(|s| pkg.get(*s).and_then(|v| v.as_object()))
        .flat_map(|m| m.keys().map(String::as_str))
        .collect();

    let mut problems = Vec::new();
    for change in &plan.dependency_changes {
        match change {
            DependencyChange::Add { name, .. } if !installed.contains(&name.as_str()) => {
                problems.push(format!("{name} was not added"));
            }
            DependencyChange::Remove { name } if installed.contains(&name.as_str()) => {
                problems.push(format!("{name} was not removed"));
            }
            _ => {}
        }
    }

    CheckResult {
        name: "dependency-manifest".into(),
        passed: problems.is_empty(),
        message: if problems.is_empty() {
            "package.json matches the plan".into()
        } else {
            problems.join("; ")
        },
        severity: Severity::Error,
    }
}

/// Every env var the target reads is declared in `.env.example`.
fn env_check<'k>(project_root: &Path, keys: impl Iterator<Item = &'k String>) -> CheckResult {
    let content = std::fs::read_to_string(project_root.join(".env.example")).unwrap_or_default();
    let mut missing: Vec<&str> = keys
        .map(String::as_str)
        .filter(|k| !content.lines().any(|l| l.starts_with(&format!("{k}="))))
        .collect();
    missing.sort();

    CheckResult {
        name: "env-vars-declared".into(),
        passed: missing.is_empty(),
        message: if missing.is_empty() {
            "all target env vars declared".into()
        } else {
            format!("missing from .env.example: {}", missing.join(", "))
        },
        severity: Severity::Warning,
    }
}

/// Sweeps the tree for leftover conflict markers.
fn marker_sweep(project_root: &Path) -> CheckResult {
    let patterns = ["<<<<<<< ", ">>>>>>> "];
    let Ok(ac) = AhoCorasick::new(patterns) else {
        return CheckResult {
            name: "conflict-markers".into(),
            passed: true,
            message: "sweep skipped".into(),
            severity: Severity::Info,
        };
    };

    let mut dirty = Vec::new();
    for entry in WalkDir::new(project_root)
        .into_iter()
        .filter_entry(|e| {
            e.file_name()
                .to_str()
                .map(|n| !SWEEP_EXCLUDED.contains(&n))
                .unwrap_or(true)
        })
        .flatten()
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(content) = std::fs::read(path) else {
            continue;
        };
        if ac.find(&content).is_some() {
            dirty.push(
                path.strip_prefix(project_root)
                    .unwrap_or(path)
                    .display()
                    .to_string(),
            );
        }
    }
    dirty.sort();

    CheckResult {
        name: "conflict-markers".into(),
        passed: dirty.is_empty(),
        message: if dirty.is_empty() {
            "no unresolved conflict markers".into()
        } else {
            format!("markers found in: {}", dirty.join(", "))
        },
        severity: Severity::Error,
    }
}

/// Compares post-migration row counts against the pre-migration capture.
fn row_count_check(
    requires_migration: bool,
    pre: Option<&BTreeMap<String, u64>>,
    options: &ValidatorOptions,
) -> CheckResult {
    if !requires_migration {
        return CheckResult {
            name: "row-count-parity".into(),
            passed: true,
            message: "no database migration planned".into(),
            severity: Severity::Info,
        };
    }
    let (Some(cmd), Some(pre)) = (&options.row_count_cmd, pre) else {
        return CheckResult {
            name: "row-count-parity".into(),
            passed: true,
            message: "row-count probe not configured; comparison skipped".into(),
            severity: Severity::Info,
        };
    };

    match probe::row_counts(cmd) {
        Ok(post) => {
            let mut diffs = Vec::new();
            for (table, before) in pre {
                let after = post.get(table).copied().unwrap_or(0);
                if after != *before {
                    diffs.push(format!("{table}: {before} → {after}"));
                }
            }
            CheckResult {
                name: "row-count-parity".into(),
                passed: diffs.is_empty(),
                message: if diffs.is_empty() {
                    format!("{} tables match pre-migration counts", pre.len())
                } else {
                    diffs.join("; ")
                },
                severity: Severity::Error,
            }
        }
        Err(e) => CheckResult {
            name: "row-count-parity".into(),
            passed: false,
            message: format!("post-migration probe failed: {e}"),
            severity: Severity::Error,
        },
    }
}

/// Runs `npm test` in the project root. A missing npm is not a failure —
/// the environment may simply not carry the toolchain.
fn run_test_suite(project_root: &Path) -> TestSummary {
    let status = Command::new("npm")
        .args(["test", "--silent"])
        .current_dir(project_root)
        .status();

    match status {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => TestSummary {
            ran: false,
            passed: None,
            detail: "npm not found — test suite skipped".into(),
        },
        Err(e) => TestSummary {
            ran: false,
            passed: None,
            detail: format!("failed to spawn npm: {e}"),
        },
        Ok(s) if s.success() => TestSummary {
            ran: true,
            passed: Some(true),
            detail: "test suite passed".into(),
        },
        Ok(s) => TestSummary {
            ran: true,
            passed: Some(false),
            detail: format!("test suite exited with {}", s.code().unwrap_or(-1)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::manifest::StackManifest;
    use common::{checksum_bytes, Category};
    use std::fs;
    use std::path::Path;

    /// Seeds a project on `from` and returns the plan to `to`.
    fn seed_and_plan(
        root: &Path,
        registry: &AdapterRegistry,
        category: Category,
        from: &str,
        to: &str,
    ) -> MigrationPlan {
        let adapter = registry.resolve(category, from).unwrap().clone();
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
        manifest.save(root).unwrap();

        let analysis = analyzer::analyze(root, registry, category, to, None).unwrap();
        planner::plan(&analysis, root, &manifest).unwrap()
    }

    /// Applies the target adapter's footprint by hand (files, package.json,
    /// env) so the validator sees a correctly migrated tree.
    fn apply_target(root: &Path, registry: &AdapterRegistry, plan: &MigrationPlan) {
        let source = registry.resolve(plan.category, &plan.from).unwrap();
        let target = registry.resolve(plan.category, &plan.to).unwrap();
        for owned in &source.owned_files {
            let _ = fs::remove_file(root.join(&owned.path));
        }
        for owned in &target.owned_files {
            let path = root.join(&owned.path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, &owned.template).unwrap();
        }
        let deps: serde_json::Map<String, serde_json::Value> = target
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
        let env_lines: String = target.env_vars.iter().map(|k| format!("{k}=\n")).collect();
        fs::write(root.join(".env.example"), env_lines).unwrap();
    }

    fn options_without_tests() -> ValidatorOptions {
        ValidatorOptions {
            row_count_cmd: None,
            skip_tests: true,
        }
    }

    #[test]
    fn test_clean_migration_validates_success() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        let plan = seed_and_plan(dir.path(), &registry, Category::Auth, "clerk", "workos");
        apply_target(dir.path(), &registry, &plan);

        let report = validate(
            dir.path(),
            &plan,
            &registry,
            "exec-1",
            None,
            &options_without_tests(),
        )
        .unwrap();
        assert_eq!(report.overall, Verdict::Success, "checks: {:?}", report.checks);
        assert_eq!(report.execution_id, "exec-1");
    }

    #[test]
    fn test_missing_target_file_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        let plan = seed_and_plan(dir.path(), &registry, Category::Auth, "clerk", "workos");
        apply_target(dir.path(), &registry, &plan);
        fs::remove_file(dir.path().join("src/lib/auth/callback.ts")).unwrap();

        let report = validate(
            dir.path(),
            &plan,
            &registry,
            "exec-2",
            None,
            &options_without_tests(),
        )
        .unwrap();
        assert_eq!(report.overall, Verdict::Failure);
        assert!(report
            .checks
            .iter()
            .any(|c| c.name == "target-files-present" && !c.passed));
    }

    #[test]
    fn test_leftover_source_file_warns() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        let plan = seed_and_plan(dir.path(), &registry, Category::Auth, "clerk", "workos");
        apply_target(dir.path(), &registry, &plan);
        // Resurrect a file the plan deletes.
        let leftover = dir.path().join("src/middleware/clerk.ts");
        fs::create_dir_all(leftover.parent().unwrap()).unwrap();
        fs::write(&leftover, "stale").unwrap();

        let report = validate(
            dir.path(),
            &plan,
            &registry,
            "exec-3",
            None,
            &options_without_tests(),
        )
        .unwrap();
        assert_eq!(report.overall, Verdict::Warnings);
    }

    #[test]
    fn test_conflict_markers_are_failure() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        let plan = seed_and_plan(dir.path(), &registry, Category::Auth, "clerk", "workos");
        apply_target(dir.path(), &registry, &plan);
        fs::write(
            dir.path().join("src/lib/auth/provider.ts"),
            "<<<<<<< current\nmine\n=======\ntheirs\n>>>>>>> incoming\n",
        )
        .unwrap();

        let report = validate(
            dir.path(),
            &plan,
            &registry,
            "exec-4",
            None,
            &options_without_tests(),
        )
        .unwrap();
        assert_eq!(report.overall, Verdict::Failure);
        assert!(report
            .checks
            .iter()
            .any(|c| c.name == "conflict-markers" && !c.passed));
    }

    #[test]
    fn test_row_count_parity_compares_pre_and_post() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        let plan = seed_and_plan(dir.path(), &registry, Category::Database, "neon", "supabase");
        apply_target(dir.path(), &registry, &plan);

        let pre: BTreeMap<String, u64> = [("users".to_string(), 42u64)].into_iter().collect();

        // Matching counts pass.
        let options = ValidatorOptions {
            row_count_cmd: Some("echo '{\"users\": 42}'".into()),
            skip_tests: true,
        };
        let report = validate(dir.path(), &plan, &registry, "exec-5", Some(&pre), &options).unwrap();
        assert!(report
            .checks
            .iter()
            .any(|c| c.name == "row-count-parity" && c.passed));

        // Diverging counts fail.
        let options = ValidatorOptions {
            row_count_cmd: Some("echo '{\"users\": 41}'".into()),
            skip_tests: true,
        };
        let report = validate(dir.path(), &plan, &registry, "exec-6", Some(&pre), &options).unwrap();
        assert_eq!(report.overall, Verdict::Failure);
    }

    #[test]
    fn test_unconfigured_probe_is_informational() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        let plan = seed_and_plan(dir.path(), &registry, Category::Database, "neon", "supabase");
        apply_target(dir.path(), &registry, &plan);

        let report = validate(
            dir.path(),
            &plan,
            &registry,
            "exec-7",
            None,
            &options_without_tests(),
        )
        .unwrap();
        let check = report
            .checks
            .iter()
            .find(|c| c.name == "row-count-parity")
            .unwrap();
        assert!(check.passed);
        assert_eq!(check.severity, Severity::Info);
    }
}
