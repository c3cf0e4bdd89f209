//! Plan execution.
//!
//! Applies a `MigrationPlan` in the planner's fixed order, one atomic step
//! at a time, under the project lock and behind a verified backup snapshot.
//! The first failing step halts the run, triggers automatic rollback, and
//! the record reports `Failed` with the original error — there is no
//! partial-success commit.

pub mod lock;
pub mod rollback;

use backup::BackupManager;
use common::error::MigrationError;
use common::manifest::{HistoryEntry, StackManifest, STATE_DIR};
use common::{checksum_bytes, unix_now};
use lock::ProjectLock;
use merger::MergeConflict;
use planner::{
    DependencyChange, EnvVarChange, FileChange, MigrationPlan, MigrationStep,
};
use registry::{AdapterRegistry, TechnologyAdapter};
use rollback::{RollbackController, RollbackRecord, RollbackStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Directory under the project state namespace holding execution records.
pub const EXECUTIONS_DIR: &str = "executions";

const ENV_FILE: &str = ".env.example";
const PACKAGE_JSON: &str = "package.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One applied (or attempted) step, with wall-clock bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    RolledBack,
}

/// Durable record of one migration attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique id of this attempt (also the history entry id).
    pub migration_id: String,
    pub plan_id: String,
    pub status: ExecutionStatus,
    pub steps: Vec<StepRecord>,
    pub backup_id: Option<String>,
    pub created_at: u64,
    pub logs: Vec<String>,
    /// Original error of the failing step, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Conflict payload when a merge halted the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<MergeConflict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackRecord>,
    /// Row counts captured before the first database step, when a probe
    /// command was configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_row_counts: Option<BTreeMap<String, u64>>,
    /// True once a database step flagged irreversible has completed.
    #[serde(default)]
    pub irreversible_db_applied: bool,
}

impl ExecutionRecord {
    fn new(plan: &MigrationPlan) -> Self {
        Self {
            migration_id: Uuid::new_v4().simple().to_string(),
            plan_id: plan.id.clone(),
            status: ExecutionStatus::Pending,
            steps: Vec::new(),
            backup_id: None,
            created_at: unix_now(),
            logs: Vec::new(),
            error: None,
            conflict: None,
            rollback: None,
            pre_row_counts: None,
            irreversible_db_applied: false,
        }
    }

    /// Persists the record under `.restack/executions/`.
    pub fn persist(&self, project_root: &Path) -> Result<(), MigrationError> {
        let dir = project_root.join(STATE_DIR).join(EXECUTIONS_DIR);
        std::fs::create_dir_all(&dir)?;
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(dir.join(format!("{}.json", self.migration_id)), bytes)?;
        Ok(())
    }
}

/// Loads the most recent execution record, if any.
pub fn load_latest_record(project_root: &Path) -> Result<Option<ExecutionRecord>, MigrationError> {
    let dir = project_root.join(STATE_DIR).join(EXECUTIONS_DIR);
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut latest: Option<ExecutionRecord> = None;
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let Ok(bytes) = std::fs::read(entry.path()) else {
            continue;
        };
        let Ok(record) = serde_json::from_slice::<ExecutionRecord>(&bytes) else {
            continue;
        };
        let newer = latest
            .as_ref()
            .map(|l| {
                (record.created_at, record.migration_id.as_str())
                    > (l.created_at, l.migration_id.as_str())
            })
            .unwrap_or(true);
        if newer {
            latest = Some(record);
        }
    }
    Ok(latest)
}

/// Knobs an invocation can turn.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Operator acknowledged a `data_loss = true` database change.
    pub acknowledge_data_loss: bool,
    /// Timeout for database step subprocesses.
    pub db_timeout: Duration,
    /// Optional row-count probe command (JSON `{table: count}` on stdout).
    pub row_count_cmd: Option<String>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            acknowledge_data_loss: false,
            db_timeout: Duration::from_secs(600),
            row_count_cmd: None,
        }
    }
}

/// What one step does. Owned clones keep the record self-contained.
#[derive(Debug, Clone)]
enum StepAction {
    File(FileChange),
    Dependency(DependencyChange),
    Env(EnvVarChange),
    Database(MigrationStep),
}

impl StepAction {
    fn name(&self) -> String {
        match self {
            StepAction::File(FileChange::Add { path, .. }) => format!("add:{path}"),
            StepAction::File(FileChange::Modify { path, .. }) => format!("modify:{path}"),
            StepAction::File(FileChange::Delete { path, .. }) => format!("delete:{path}"),
            StepAction::Dependency(DependencyChange::Add { name, .. }) => {
                format!("dependency:add {name}")
            }
            StepAction::Dependency(DependencyChange::Remove { name }) => {
                format!("dependency:remove {name}")
            }
            StepAction::Env(EnvVarChange::Add { key }) => format!("env:add {key}"),
            StepAction::Env(EnvVarChange::Remove { key }) => format!("env:remove {key}"),
            StepAction::Database(step) => format!("database:{}", step.name),
        }
    }
}

/// Applies plans. One instance per invocation.
pub struct Executor<'a> {
    project_root: PathBuf,
    registry: &'a AdapterRegistry,
    options: ExecutorOptions,
    cancel: Arc<AtomicBool>,
}

impl<'a> Executor<'a> {
    pub fn new(project_root: &Path, registry: &'a AdapterRegistry, options: ExecutorOptions) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            registry,
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares the cancellation flag; setting it finishes the in-flight step
    /// and then rolls back. Cancellation is never applied mid-step.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Runs the plan to a terminal state.
    ///
    /// Pre-mutation refusals (`ConfirmationRequired`, `ProjectLocked`,
    /// `BackupFailed`) return `Err` — nothing was touched. Once mutation
    /// starts, the result is always a record: `Completed`, or `Failed` with
    /// the original error and the rollback outcome attached.
    pub fn execute(&self, plan: &MigrationPlan) -> Result<ExecutionRecord, MigrationError> {
        // Fail closed on unacknowledged data loss, before any mutation.
        if let Some(db) = &plan.database_changes {
            if db.data_loss && !self.options.acknowledge_data_loss {
                return Err(MigrationError::ConfirmationRequired(format!(
                    "the {} → {} database migration is flagged data_loss; re-run with \
                     --acknowledge-data-loss to proceed",
                    plan.from, plan.to
                )));
            }
        }

        let _lock = ProjectLock::acquire(&self.project_root)?;

        let source = self.registry.resolve(plan.category, &plan.from)?.clone();
        let target = self.registry.resolve(plan.category, &plan.to)?.clone();

        let backup_mgr = BackupManager::new(&self.project_root);
        let snapshot = backup_mgr
            .snapshot(&plan.touched_paths())
            .map_err(|e| MigrationError::BackupFailed(e.to_string()))?;

        let mut record = ExecutionRecord::new(plan);
        record.backup_id = Some(snapshot.id.clone());
        record.status = ExecutionStatus::InProgress;
        record
            .logs
            .push(format!("backup snapshot {} created", snapshot.id));

        if plan.database_changes.is_some() {
            if let Some(cmd) = &self.options.row_count_cmd {
                match common::probe::row_counts(cmd) {
                    Ok(counts) => record.pre_row_counts = Some(counts),
                    Err(e) => record.logs.push(format!("pre-migration row probe failed: {e}")),
                }
            }
        }

        let actions = build_actions(plan);
        for action in actions {
            let mut step = StepRecord {
                name: action.name(),
                status: StepStatus::Pending,
                started_at: None,
                finished_at: None,
                error: None,
            };

            // Cancellation checkpoint: only between steps.
            if self.cancel.load(Ordering::SeqCst) {
                step.status = StepStatus::Failed;
                step.error = Some("cancelled by operator".to_string());
                record.steps.push(step);
                return self.fail(record, snapshot.id.clone(), "cancelled by operator".into());
            }

            step.status = StepStatus::InProgress;
            step.started_at = Some(unix_now());

            let outcome = self.apply(&action, plan, &source, &target);
            step.finished_at = Some(unix_now());

            match outcome {
                Ok(()) => {
                    if let StepAction::Database(db_step) = &action {
                        if !db_step.reversible {
                            record.irreversible_db_applied = true;
                        }
                    }
                    step.status = StepStatus::Completed;
                    record.steps.push(step);
                }
                Err(StepFailure { error, conflict }) => {
                    let message = error.to_string();
                    step.status = StepStatus::Failed;
                    step.error = Some(message.clone());
                    record.steps.push(step);
                    record.conflict = conflict;
                    return self.fail(record, snapshot.id.clone(), message);
                }
            }
        }

        self.finalize_manifest(plan, &target)?;
        record.status = ExecutionStatus::Completed;
        record.logs.push(format!(
            "migrated {} from {} to {}",
            plan.category, plan.from, plan.to
        ));
        record.persist(&self.project_root)?;
        Ok(record)
    }

    /// Failure path: automatic rollback, terminal `Failed` with the
    /// original error.
    fn fail(
        &self,
        mut record: ExecutionRecord,
        backup_id: String,
        error: String,
    ) -> Result<ExecutionRecord, MigrationError> {
        let backup_mgr = BackupManager::new(&self.project_root);
        let rollback = match backup_mgr.load(&backup_id) {
            Ok(snapshot) => RollbackController::new(&backup_mgr)
                .run(&snapshot, record.irreversible_db_applied),
            Err(e) => RollbackRecord {
                status: RollbackStatus::Failed,
                notes: vec![format!("could not load snapshot {backup_id}: {e}")],
            },
        };
        record.logs.push(match rollback.status {
            RollbackStatus::Completed => "rollback completed".to_string(),
            _ => "rollback did not complete".to_string(),
        });
        record.rollback = Some(rollback);
        record.error = Some(error);
        record.status = ExecutionStatus::Failed;
        record.persist(&self.project_root)?;
        Ok(record)
    }

    fn apply(
        &self,
        action: &StepAction,
        plan: &MigrationPlan,
        source: &TechnologyAdapter,
        target: &TechnologyAdapter,
    ) -> Result<(), StepFailure> {
        match action {
            StepAction::File(change) => self.apply_file(change, plan, source, target),
            StepAction::Dependency(change) => self
                .apply_dependency(change)
                .map_err(StepFailure::plain),
            StepAction::Env(change) => self.apply_env(change).map_err(StepFailure::plain),
            StepAction::Database(step) => self.apply_database(step).map_err(StepFailure::plain),
        }
    }

    fn apply_file(
        &self,
        change: &FileChange,
        plan: &MigrationPlan,
        source: &TechnologyAdapter,
        target: &TechnologyAdapter,
    ) -> Result<(), StepFailure> {
        match change {
            FileChange::Add { path, content, .. } => {
                let dest = self.project_root.join(path);
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent).map_err(StepFailure::io)?;
                }
                std::fs::write(&dest, content).map_err(StepFailure::io)?;
                Ok(())
            }
            FileChange::Delete { path, .. } => {
                let dest = self.project_root.join(path);
                if dest.exists() {
                    std::fs::remove_file(&dest).map_err(StepFailure::io)?;
                }
                Ok(())
            }
            FileChange::Modify { path, .. } => {
                if let Some(theirs) = target.template_for(path) {
                    self.apply_template_modify(path, theirs, plan, source)
                } else if let Some(hook) = target.transform_hooks.iter().find(|h| h.file == *path) {
                    let dest = self.project_root.join(path);
                    let content = std::fs::read_to_string(&dest).map_err(StepFailure::io)?;
                    let rewritten = content.replace(&hook.find, &hook.replace);
                    std::fs::write(&dest, rewritten).map_err(StepFailure::io)?;
                    Ok(())
                } else {
                    Err(StepFailure::plain(MigrationError::InternalError(format!(
                        "no template or transform hook for modified file {path}"
                    ))))
                }
            }
        }
    }

    /// Template-driven modify; user-touched files route through the
    /// three-way merge. A `ManualRequired` region halts the step with the
    /// conflict payload — never a silent pick of one side.
    fn apply_template_modify(
        &self,
        path: &str,
        theirs: &str,
        plan: &MigrationPlan,
        source: &TechnologyAdapter,
    ) -> Result<(), StepFailure> {
        let dest = self.project_root.join(path);

        if !plan.user_modified.iter().any(|p| p == path) {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(StepFailure::io)?;
            }
            std::fs::write(&dest, theirs).map_err(StepFailure::io)?;
            return Ok(());
        }

        let base = source.template_for(path).ok_or_else(|| {
            StepFailure::plain(MigrationError::InternalError(format!(
                "no baseline template for user-modified file {path}"
            )))
        })?;
        let ours = std::fs::read_to_string(&dest).map_err(StepFailure::io)?;

        let merged = merger::merge_three_way(base, &ours, theirs);
        if merged.is_clean() {
            std::fs::write(&dest, merged.content).map_err(StepFailure::io)?;
            return Ok(());
        }

        let conflict = MergeConflict {
            file: path.to_string(),
            base_version: base.to_string(),
            our_version: ours,
            their_version: theirs.to_string(),
            conflict_regions: merged.regions,
        };
        Err(StepFailure {
            error: MigrationError::CustomCodeConflicts {
                file: path.to_string(),
                regions: conflict
                    .conflict_regions
                    .iter()
                    .filter(|r| r.resolution == merger::Resolution::ManualRequired)
                    .count(),
            },
            conflict: Some(conflict),
        })
    }

    fn apply_dependency(&self, change: &DependencyChange) -> Result<(), MigrationError> {
        let path = self.project_root.join(PACKAGE_JSON);
        let mut pkg: serde_json::Value = if path.is_file() {
            serde_json::from_slice(&std::fs::read(&path)?)?
        } else {
            serde_json::json!({})
        };
        let obj = pkg
            .as_object_mut()
            .ok_or_else(|| MigrationError::InternalError("package.json is not an object".into()))?;

        match change {
            DependencyChange::Add { name, version } => {
                let deps = obj
                    .entry("dependencies")
                    .or_insert_with(|| serde_json::json!({}));
                deps.as_object_mut()
                    .ok_or_else(|| {
                        MigrationError::InternalError("package.json dependencies is not an object".into())
                    })?
                    .insert(name.clone(), serde_json::Value::String(version.clone()));
            }
            DependencyChange::Remove { name } => {
                for section in ["dependencies", "devDependencies"] {
                    if let Some(deps) = obj.get_mut(section).and_then(|v| v.as_object_mut()) {
                        deps.remove(name);
                    }
                }
            }
        }

        let mut bytes = serde_json::to_vec_pretty(&pkg)?;
        bytes.push(b'\n');
        std::fs::write(&path, bytes)?;
        Ok(())
    }

    fn apply_env(&self, change: &EnvVarChange) -> Result<(), MigrationError> {
        let path = self.project_root.join(ENV_FILE);
        let content = if path.is_file() {
            std::fs::read_to_string(&path)?
        } else {
            String::new()
        };

        let updated = match change {
            EnvVarChange::Add { key } => {
                let prefix = format!("{key}=");
                if content.lines().any(|l| l.starts_with(&prefix)) {
                    content
                } else {
                    let mut c = content;
                    if !c.is_empty() && !c.ends_with('\n') {
                        c.push('\n');
                    }
                    c.push_str(&prefix);
                    c.push('\n');
                    c
                }
            }
            EnvVarChange::Remove { key } => {
                let prefix = format!("{key}=");
                let kept: Vec<&str> = content
                    .lines()
                    .filter(|l| !l.starts_with(&prefix))
                    .collect();
                let mut c = kept.join("\n");
                if !c.is_empty() {
                    c.push('\n');
                }
                c
            }
        };
        std::fs::write(&path, updated)?;
        Ok(())
    }

    /// Runs one database migration step. A missing command means the step
    /// is recorded but has nothing to execute; a timeout is a failure like
    /// any other.
    fn apply_database(&self, step: &MigrationStep) -> Result<(), MigrationError> {
        let Some(command) = &step.command else {
            return Ok(());
        };
        run_with_timeout(command, self.options.db_timeout)
    }

    /// Success path bookkeeping: new technology recorded, checksum
    /// baselines moved to the target templates, history appended.
    fn finalize_manifest(
        &self,
        plan: &MigrationPlan,
        target: &TechnologyAdapter,
    ) -> Result<(), MigrationError> {
        let mut manifest = StackManifest::load(&self.project_root)?;
        manifest
            .technologies
            .insert(plan.category, plan.to.clone());

        for owned in &target.owned_files {
            manifest.record_generated(&owned.path, checksum_bytes(owned.template.as_bytes()));
        }
        for change in &plan.file_changes {
            match change {
                FileChange::Delete { path, .. } => manifest.forget_generated(path),
                FileChange::Modify { path, .. } if target.template_for(path).is_none() => {
                    // Hook-rewritten file: the post-hook content is the new
                    // generated state.
                    if let Ok(sum) = common::checksum_file(&self.project_root.join(path)) {
                        manifest.record_generated(path, sum);
                    }
                }
                _ => {}
            }
        }

        manifest.append_history(HistoryEntry {
            from: plan.from.clone(),
            to: plan.to.clone(),
            category: plan.category,
            date: unix_now(),
            migration_id: Uuid::new_v4().simple().to_string(),
            reason: format!("migrate {} from {} to {}", plan.category, plan.from, plan.to),
        });
        manifest.save(&self.project_root)
    }
}

/// Explicit rollback of the most recent execution record.
///
/// On success the record transitions to `RolledBack` — the one place that
/// status is used; automatic rollback after a failure keeps `Failed`.
pub fn rollback_latest(project_root: &Path) -> Result<ExecutionRecord, MigrationError> {
    let _lock = ProjectLock::acquire(project_root)?;

    let mut record = load_latest_record(project_root)?.ok_or_else(|| {
        MigrationError::InternalError("no execution records exist; nothing to roll back".into())
    })?;
    let backup_id = record.backup_id.clone().ok_or_else(|| {
        MigrationError::InternalError("latest execution has no backup snapshot".into())
    })?;

    let backup_mgr = BackupManager::new(project_root);
    let snapshot = backup_mgr
        .load(&backup_id)
        .map_err(|e| MigrationError::BackupFailed(e.to_string()))?;

    let outcome = RollbackController::new(&backup_mgr).run(&snapshot, record.irreversible_db_applied);
    let completed = outcome.status == RollbackStatus::Completed;
    record.rollback = Some(outcome);
    if completed {
        record.status = ExecutionStatus::RolledBack;
    }
    record.persist(project_root)?;

    if completed {
        Ok(record)
    } else {
        Err(MigrationError::InternalError(
            "rollback did not complete; see the execution record for notes".into(),
        ))
    }
}

/// Plan order is authoritative: files, then dependencies, then env vars,
/// then database steps.
fn build_actions(plan: &MigrationPlan) -> Vec<StepAction> {
    let mut actions: Vec<StepAction> = Vec::new();
    actions.extend(plan.file_changes.iter().cloned().map(StepAction::File));
    actions.extend(
        plan.dependency_changes
            .iter()
            .cloned()
            .map(StepAction::Dependency),
    );
    actions.extend(plan.env_var_changes.iter().cloned().map(StepAction::Env));
    if let Some(db) = &plan.database_changes {
        actions.extend(db.migration_steps.iter().cloned().map(StepAction::Database));
    }
    actions
}

/// A step failure with an optional conflict payload.
struct StepFailure {
    error: MigrationError,
    conflict: Option<MergeConflict>,
}

impl StepFailure {
    fn plain(error: MigrationError) -> Self {
        Self {
            error,
            conflict: None,
        }
    }

    fn io(error: std::io::Error) -> Self {
        Self::plain(MigrationError::Io(error))
    }
}

/// Spawns `sh -c command`, polling until exit or timeout. Timeout kills the
/// child and reports failure.
fn run_with_timeout(command: &str, timeout: Duration) -> Result<(), MigrationError> {
    let mut child = Command::new("sh").arg("-c").arg(command).spawn()?;
    let started = Instant::now();
    loop {
        match child.try_wait()? {
            Some(status) if status.success() => return Ok(()),
            Some(status) => {
                return Err(MigrationError::InternalError(format!(
                    "command `{command}` exited with {}",
                    status.code().unwrap_or(-1)
                )))
            }
            None => {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(MigrationError::InternalError(format!(
                        "command `{command}` timed out after {}s",
                        timeout.as_secs()
                    )));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Category;
    use std::collections::BTreeMap as Map;
    use std::fs;

    fn seed_project(root: &Path, registry: &AdapterRegistry, category: Category, tech: &str) {
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
            root.join(PACKAGE_JSON),
            serde_json::to_vec_pretty(&serde_json::json!({"name": "fixture", "dependencies": deps}))
                .unwrap(),
        )
        .unwrap();
        let env_lines: String = adapter.env_vars.iter().map(|k| format!("{k}=\n")).collect();
        fs::write(root.join(ENV_FILE), env_lines).unwrap();
        manifest.technologies.insert(category, tech.to_string());
        manifest.save(root).unwrap();
    }

    fn plan_for(
        root: &Path,
        registry: &AdapterRegistry,
        category: Category,
        target: &str,
    ) -> MigrationPlan {
        let manifest = StackManifest::load(root).unwrap();
        let analysis = analyzer::analyze(root, registry, category, target, None).unwrap();
        planner::plan(&analysis, root, &manifest).unwrap()
    }

    /// Checksums of every project file outside the engine's state dir.
    fn tree_state(root: &Path) -> Map<String, String> {
        let mut state = Map::new();
        for entry in walkdir::WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.file_name().to_str() != Some(STATE_DIR))
            .flatten()
        {
            if entry.file_type().is_file() {
                let rel = entry
                    .path()
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/");
                state.insert(rel, common::checksum_file(entry.path()).unwrap());
            }
        }
        state
    }

    #[test]
    fn test_clerk_to_workos_full_run() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        seed_project(dir.path(), &registry, Category::Auth, "clerk");
        let plan = plan_for(dir.path(), &registry, Category::Auth, "workos");

        let executor = Executor::new(dir.path(), &registry, ExecutorOptions::default());
        let record = executor.execute(&plan).unwrap();

        assert_eq!(record.status, ExecutionStatus::Completed);
        assert!(record.steps.iter().all(|s| s.status == StepStatus::Completed));
        assert!(dir.path().join("src/lib/auth/callback.ts").is_file());
        assert!(!dir.path().join("src/middleware/clerk.ts").exists());

        let pkg: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join(PACKAGE_JSON)).unwrap()).unwrap();
        let deps = pkg["dependencies"].as_object().unwrap();
        assert!(deps.contains_key("@workos-inc/node"));
        assert!(!deps.contains_key("@clerk/nextjs"));

        let env = fs::read_to_string(dir.path().join(ENV_FILE)).unwrap();
        assert!(env.contains("WORKOS_API_KEY="));
        assert!(!env.contains("CLERK_SECRET_KEY="));

        let manifest = StackManifest::load(dir.path()).unwrap();
        assert_eq!(manifest.technology(Category::Auth), Some("workos"));
        assert_eq!(manifest.migration_history.len(), 1);
        assert_eq!(manifest.migration_history[0].from, "clerk");
        assert_eq!(manifest.migration_history[0].to, "workos");
    }

    #[test]
    fn test_round_trip_restores_tree_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        seed_project(dir.path(), &registry, Category::Email, "resend");
        let before = tree_state(dir.path());

        let plan = plan_for(dir.path(), &registry, Category::Email, "sendgrid");
        let executor = Executor::new(dir.path(), &registry, ExecutorOptions::default());
        let record = executor.execute(&plan).unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_ne!(tree_state(dir.path()), before);

        let rolled = rollback_latest(dir.path()).unwrap();
        assert_eq!(rolled.status, ExecutionStatus::RolledBack);
        assert_eq!(tree_state(dir.path()), before);
    }

    #[test]
    fn test_merge_conflict_halts_and_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        seed_project(dir.path(), &registry, Category::Auth, "clerk");

        // User rewrote the provider in place — overlapping the region the
        // workos template also rewrites.
        let provider = dir.path().join("src/lib/auth/provider.ts");
        let mut content = fs::read_to_string(&provider).unwrap();
        content = content.replace("return userId ? { userId } : null;", "return { userId: \"admin\" };");
        fs::write(&provider, &content).unwrap();
        let before = tree_state(dir.path());

        let plan = plan_for(dir.path(), &registry, Category::Auth, "workos");
        assert!(plan.user_modified.contains(&"src/lib/auth/provider.ts".to_string()));

        let executor = Executor::new(dir.path(), &registry, ExecutorOptions::default());
        let record = executor.execute(&plan).unwrap();

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.conflict.is_some());
        assert!(record.error.as_deref().unwrap_or("").contains("conflict"));
        let rollback = record.rollback.as_ref().unwrap();
        assert_eq!(rollback.status, RollbackStatus::Completed);
        // Everything touched before the failing step came back.
        assert_eq!(tree_state(dir.path()), before);
    }

    #[test]
    fn test_data_loss_requires_acknowledgment() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        seed_project(dir.path(), &registry, Category::Database, "neon");
        let before = tree_state(dir.path());

        let plan = plan_for(dir.path(), &registry, Category::Database, "planetscale");
        assert!(plan.database_changes.as_ref().unwrap().data_loss);

        let executor = Executor::new(dir.path(), &registry, ExecutorOptions::default());
        let err = executor.execute(&plan).unwrap_err();
        assert!(matches!(err, MigrationError::ConfirmationRequired(_)));
        // Refusal happened before any mutation — including the backup.
        assert_eq!(tree_state(dir.path()), before);
        assert!(BackupManager::new(dir.path()).list().unwrap().is_empty());

        let executor = Executor::new(
            dir.path(),
            &registry,
            ExecutorOptions {
                acknowledge_data_loss: true,
                ..Default::default()
            },
        );
        let record = executor.execute(&plan).unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
    }

    #[test]
    fn test_locked_project_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        seed_project(dir.path(), &registry, Category::Auth, "clerk");
        let plan = plan_for(dir.path(), &registry, Category::Auth, "workos");

        let _held = ProjectLock::acquire(dir.path()).unwrap();
        let executor = Executor::new(dir.path(), &registry, ExecutorOptions::default());
        let err = executor.execute(&plan).unwrap_err();
        assert!(matches!(err, MigrationError::ProjectLocked(_)));
    }

    #[test]
    fn test_cancellation_completes_no_step_then_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        seed_project(dir.path(), &registry, Category::Auth, "clerk");
        let before = tree_state(dir.path());
        let plan = plan_for(dir.path(), &registry, Category::Auth, "workos");

        let executor = Executor::new(dir.path(), &registry, ExecutorOptions::default());
        executor.cancel_flag().store(true, Ordering::SeqCst);
        let record = executor.execute(&plan).unwrap();

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record
            .steps
            .iter()
            .all(|s| s.status != StepStatus::Completed));
        assert_eq!(tree_state(dir.path()), before);
    }

    #[test]
    fn test_database_step_timeout_fails_and_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        seed_project(dir.path(), &registry, Category::Database, "neon");
        let before = tree_state(dir.path());

        let mut plan = plan_for(dir.path(), &registry, Category::Database, "supabase");
        {
            let db = plan.database_changes.as_mut().unwrap();
            db.migration_steps[0].command = Some("sleep 30".into());
        }

        let executor = Executor::new(
            dir.path(),
            &registry,
            ExecutorOptions {
                db_timeout: Duration::from_millis(200),
                ..Default::default()
            },
        );
        let record = executor.execute(&plan).unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.error.as_deref().unwrap_or("").contains("timed out"));
        assert_eq!(tree_state(dir.path()), before);
    }

    #[test]
    fn test_failed_step_restores_earlier_steps() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        seed_project(dir.path(), &registry, Category::Database, "neon");
        let before = tree_state(dir.path());

        let mut plan = plan_for(dir.path(), &registry, Category::Database, "supabase");
        {
            let db = plan.database_changes.as_mut().unwrap();
            // File/dependency/env steps run first and succeed; this fails.
            db.migration_steps[0].command = Some("exit 7".into());
        }

        let executor = Executor::new(dir.path(), &registry, ExecutorOptions::default());
        let record = executor.execute(&plan).unwrap();

        assert_eq!(record.status, ExecutionStatus::Failed);
        let completed = record
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        assert!(completed > 0, "earlier steps must have run");
        assert_eq!(
            record.steps.last().unwrap().status,
            StepStatus::Failed,
            "the database step is the failing one"
        );
        // All earlier mutations restored.
        assert_eq!(tree_state(dir.path()), before);
        // Never reported as Completed, manifest untouched.
        let manifest = StackManifest::load(dir.path()).unwrap();
        assert_eq!(manifest.technology(Category::Database), Some("neon"));
        assert!(manifest.migration_history.is_empty());
    }
}
