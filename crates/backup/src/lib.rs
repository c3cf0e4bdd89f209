//! Transactional snapshots of migration-affected state.
//!
//! ## Workflow
//! 1. `BackupManager::new(project_root)` — initialises the backup namespace.
//! 2. `snapshot(paths)` — copies every referenced file (plus the stack
//!    manifest) into a staging directory, records per-file checksums, then
//!    atomically renames the stage into place. Any copy failure discards
//!    the whole stage: no partial snapshots exist.
//! 3. `restore(&snapshot)` — failure path: verifies each backed-up file
//!    against its manifest checksum and copies it back; files recorded as
//!    absent pre-migration are deleted.
//! 4. `prune(keep)` — explicit retention; snapshots are never
//!    garbage-collected implicitly.

use common::manifest::{MANIFEST_FILE, STATE_DIR};
use common::{checksum_file, unix_now};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Directory under the project state namespace holding all snapshots.
pub const BACKUPS_DIR: &str = "backups";
const SNAPSHOT_MANIFEST: &str = "manifest.json";
const FILES_DIR: &str = "files";

/// Errors from backup operations.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("manifest error: {0}")]
    ManifestError(#[from] serde_json::Error),
    #[error("snapshot {0} not found")]
    NotFound(String),
    #[error("backup copy of {file} no longer matches its recorded checksum")]
    Corrupt { file: String },
}

/// One file in a snapshot manifest. `checksum: None` records that the file
/// did not exist before the migration, so restoration deletes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    pub checksum: Option<String>,
}

/// A completed snapshot. Read-only after creation; owned by exactly one
/// migration attempt until rollback consumes it or it is pruned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub id: String,
    /// Absolute path of the snapshot directory.
    pub path: PathBuf,
    pub manifest: Vec<ManifestEntry>,
    pub created_at: u64,
}

/// Creates, restores, lists and prunes snapshots for one project.
pub struct BackupManager {
    project_root: PathBuf,
    backups_dir: PathBuf,
}

impl BackupManager {
    pub fn new(project_root: &Path) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            backups_dir: project_root.join(STATE_DIR).join(BACKUPS_DIR),
        }
    }

    /// Takes an all-or-nothing snapshot of the given project-relative paths
    /// plus the stack manifest.
    ///
    /// The snapshot is staged under a `.tmp-` prefix and renamed into place
    /// only once every copy succeeded; a failed copy discards the stage and
    /// nothing is retained.
    pub fn snapshot(&self, rel_paths: &[String]) -> Result<BackupSnapshot, BackupError> {
        let created_at = unix_now();
        let id = format!(
            "{}_{}",
            created_at,
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let stage = self.backups_dir.join(format!(".tmp-{id}"));
        let final_dir = self.backups_dir.join(&id);

        let result = self.fill_stage(&stage, rel_paths, &id, created_at);
        match result {
            Ok(manifest) => {
                if let Err(e) = std::fs::rename(&stage, &final_dir) {
                    let _ = std::fs::remove_dir_all(&stage);
                    return Err(e.into());
                }
                Ok(BackupSnapshot {
                    id,
                    path: final_dir,
                    manifest,
                    created_at,
                })
            }
            Err(e) => {
                let _ = std::fs::remove_dir_all(&stage);
                Err(e)
            }
        }
    }

    fn fill_stage(
        &self,
        stage: &Path,
        rel_paths: &[String],
        id: &str,
        created_at: u64,
    ) -> Result<Vec<ManifestEntry>, BackupError> {
        std::fs::create_dir_all(stage.join(FILES_DIR))?;

        let mut all: Vec<String> = rel_paths.to_vec();
        let manifest_rel = format!("{STATE_DIR}/{MANIFEST_FILE}");
        if !all.contains(&manifest_rel) {
            all.push(manifest_rel);
        }
        all.sort();
        all.dedup();

        let mut entries = Vec::with_capacity(all.len());
        for rel in &all {
            let source = self.project_root.join(rel);
            if source.is_file() {
                let dest = stage.join(FILES_DIR).join(rel);
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(&source, &dest)?;
                entries.push(ManifestEntry {
                    file: rel.clone(),
                    checksum: Some(checksum_file(&dest)?),
                });
            } else {
                entries.push(ManifestEntry {
                    file: rel.clone(),
                    checksum: None,
                });
            }
        }

        let snapshot = BackupSnapshot {
            id: id.to_string(),
            path: stage.to_path_buf(),
            manifest: entries.clone(),
            created_at,
        };
        let bytes = serde_json::to_vec_pretty(&PersistedManifest::from(&snapshot))?;
        std::fs::write(stage.join(SNAPSHOT_MANIFEST), bytes)?;
        Ok(entries)
    }

    /// Restores every manifest entry: pure copy-back for files that existed,
    /// deletion for files recorded absent. Each backup copy is verified
    /// against its recorded checksum before it overwrites project state.
    pub fn restore(&self, snapshot: &BackupSnapshot) -> Result<(), BackupError> {
        for entry in &snapshot.manifest {
            let target = self.project_root.join(&entry.file);
            match &entry.checksum {
                Some(expected) => {
                    let backed_up = snapshot.path.join(FILES_DIR).join(&entry.file);
                    let actual = checksum_file(&backed_up)?;
                    if actual != *expected {
                        return Err(BackupError::Corrupt {
                            file: entry.file.clone(),
                        });
                    }
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::copy(&backed_up, &target)?;
                }
                None => {
                    if target.exists() {
                        std::fs::remove_file(&target)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Loads a snapshot by id.
    pub fn load(&self, id: &str) -> Result<BackupSnapshot, BackupError> {
        let dir = self.backups_dir.join(id);
        let manifest_path = dir.join(SNAPSHOT_MANIFEST);
        if !manifest_path.is_file() {
            return Err(BackupError::NotFound(id.to_string()));
        }
        let bytes = std::fs::read(&manifest_path)?;
        let persisted: PersistedManifest = serde_json::from_slice(&bytes)?;
        Ok(BackupSnapshot {
            id: persisted.id,
            path: dir,
            manifest: persisted.entries,
            created_at: persisted.created_at,
        })
    }

    /// All snapshots, oldest first. Staging leftovers are ignored.
    pub fn list(&self) -> Result<Vec<BackupSnapshot>, BackupError> {
        let mut snapshots = Vec::new();
        if !self.backups_dir.is_dir() {
            return Ok(snapshots);
        }
        for entry in std::fs::read_dir(&self.backups_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(".tmp-") {
                continue;
            }
            if let Ok(snapshot) = self.load(&name) {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by_key(|s| (s.created_at, s.id.clone()));
        Ok(snapshots)
    }

    /// Deletes all but the newest `keep` snapshots. Returns how many were
    /// removed.
    pub fn prune(&self, keep: usize) -> Result<usize, BackupError> {
        let snapshots = self.list()?;
        let excess = snapshots.len().saturating_sub(keep);
        for snapshot in snapshots.iter().take(excess) {
            std::fs::remove_dir_all(&snapshot.path)?;
        }
        Ok(excess)
    }
}

/// On-disk form of a snapshot manifest (the directory path is implied).
#[derive(Debug, Serialize, Deserialize)]
struct PersistedManifest {
    id: String,
    created_at: u64,
    entries: Vec<ManifestEntry>,
}

impl From<&BackupSnapshot> for PersistedManifest {
    fn from(s: &BackupSnapshot) -> Self {
        Self {
            id: s.id.clone(),
            created_at: s.created_at,
            entries: s.manifest.clone(),
        }
    }
}

/// Project-relative path of the stack manifest, as recorded in snapshots.
pub fn manifest_rel_path() -> String {
    format!("{STATE_DIR}/{MANIFEST_FILE}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_snapshot_and_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a.ts", "original a");
        write(dir.path(), "src/b.ts", "original b");

        let manager = BackupManager::new(dir.path());
        let snapshot = manager
            .snapshot(&["src/a.ts".into(), "src/b.ts".into()])
            .unwrap();

        fs::write(dir.path().join("src/a.ts"), "mutated").unwrap();
        fs::remove_file(dir.path().join("src/b.ts")).unwrap();

        manager.restore(&snapshot).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("src/a.ts")).unwrap(),
            "original a"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("src/b.ts")).unwrap(),
            "original b"
        );
    }

    #[test]
    fn test_restore_deletes_files_absent_before_migration() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(dir.path());
        // "src/new.ts" does not exist yet — an Add target.
        let snapshot = manager.snapshot(&["src/new.ts".into()]).unwrap();

        write(dir.path(), "src/new.ts", "added by migration");
        manager.restore(&snapshot).unwrap();
        assert!(!dir.path().join("src/new.ts").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_snapshot_is_all_or_nothing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ok.ts", "fine");
        write(dir.path(), "secret.ts", "no read");
        let secret = dir.path().join("secret.ts");
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();

        // A privileged process reads 0o000 files regardless; the failure
        // injection only works when the permission actually bites.
        if fs::read(&secret).is_ok() {
            return;
        }

        let manager = BackupManager::new(dir.path());
        let result = manager.snapshot(&["ok.ts".into(), "secret.ts".into()]);
        assert!(result.is_err());
        // No snapshot directory (complete or partial) may remain.
        assert_eq!(manager.list().unwrap().len(), 0);

        fs::set_permissions(&secret, fs::Permissions::from_mode(0o644)).unwrap();
    }

    #[test]
    fn test_corrupt_backup_refuses_restore() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a.ts", "original");

        let manager = BackupManager::new(dir.path());
        let snapshot = manager.snapshot(&["src/a.ts".into()]).unwrap();

        // Tamper with the backed-up copy.
        fs::write(snapshot.path.join("files/src/a.ts"), "tampered").unwrap();
        let err = manager.restore(&snapshot).unwrap_err();
        assert!(matches!(err, BackupError::Corrupt { .. }));
    }

    #[test]
    fn test_load_and_list() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ts", "a");
        let manager = BackupManager::new(dir.path());
        let s1 = manager.snapshot(&["a.ts".into()]).unwrap();

        let loaded = manager.load(&s1.id).unwrap();
        assert_eq!(loaded.id, s1.id);
        assert_eq!(loaded.manifest.len(), s1.manifest.len());

        assert_eq!(manager.list().unwrap().len(), 1);
        assert!(matches!(
            manager.load("nope").unwrap_err(),
            BackupError::NotFound(_)
        ));
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ts", "a");
        let manager = BackupManager::new(dir.path());
        let ids: Vec<String> = (0..3)
            .map(|_| manager.snapshot(&["a.ts".into()]).unwrap().id)
            .collect();

        let removed = manager.prune(1).unwrap();
        assert_eq!(removed, 2);
        let remaining = manager.list().unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(ids.contains(&remaining[0].id));
    }
}
