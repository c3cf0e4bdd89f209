//! Rollback controller.
//!
//! State machine: `Pending → InProgress → {Completed, Failed}`. Runs
//! automatically when a step fails, or explicitly for the most recent
//! execution record. File and manifest state restores as a pure copy-back
//! from the snapshot; database steps flagged irreversible cannot be undone
//! here and force a `Failed` outcome with a manual-recovery notice.

use backup::{BackupManager, BackupSnapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Outcome of one rollback run, nested in the execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub status: RollbackStatus,
    pub notes: Vec<String>,
}

pub struct RollbackController<'a> {
    backup: &'a BackupManager,
}

impl<'a> RollbackController<'a> {
    pub fn new(backup: &'a BackupManager) -> Self {
        Self { backup }
    }

    /// Restores the snapshot. `irreversible_db_applied` is true when a
    /// database step flagged `data_loss` already completed — file state is
    /// still restored, but the controller reports `Failed` rather than
    /// pretending the database came back.
    pub fn run(
        &self,
        snapshot: &BackupSnapshot,
        irreversible_db_applied: bool,
    ) -> RollbackRecord {
        let mut record = RollbackRecord {
            status: RollbackStatus::Pending,
            notes: Vec::new(),
        };
        record.status = RollbackStatus::InProgress;

        match self.backup.restore(snapshot) {
            Ok(()) => {
                record
                    .notes
                    .push(format!("restored {} files from {}", snapshot.manifest.len(), snapshot.id));
                record.status = RollbackStatus::Completed;
            }
            Err(e) => {
                record.notes.push(format!("restore failed: {e}"));
                record.status = RollbackStatus::Failed;
            }
        }

        if irreversible_db_applied {
            record.notes.push(
                "an irreversible database step already ran; database state requires \
                 manual recovery from your provider's backup"
                    .to_string(),
            );
            record.status = RollbackStatus::Failed;
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_rollback_restores_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f.ts"), "before").unwrap();

        let manager = BackupManager::new(dir.path());
        let snapshot = manager.snapshot(&["f.ts".into()]).unwrap();
        fs::write(dir.path().join("f.ts"), "after").unwrap();

        let record = RollbackController::new(&manager).run(&snapshot, false);
        assert_eq!(record.status, RollbackStatus::Completed);
        assert_eq!(fs::read_to_string(dir.path().join("f.ts")).unwrap(), "before");
    }

    #[test]
    fn test_irreversible_database_step_fails_rollback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f.ts"), "before").unwrap();

        let manager = BackupManager::new(dir.path());
        let snapshot = manager.snapshot(&["f.ts".into()]).unwrap();

        let record = RollbackController::new(&manager).run(&snapshot, true);
        assert_eq!(record.status, RollbackStatus::Failed);
        assert!(record.notes.iter().any(|n| n.contains("manual recovery")));
    }
}
