//! Engine-wide error taxonomy.
//!
//! Analysis and planning errors abort before any mutation and require no
//! rollback. `BackupFailed` always blocks execution. Errors raised while a
//! plan is being applied trigger automatic rollback, and the terminal state
//! reported to the operator is `Failed` with the original error.

use crate::exit_codes;

/// Every failure the migration pipeline can surface to an operator.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("unknown technology `{name}` in category `{category}`")]
    UnknownTechnology { category: String, name: String },

    #[error("no {category} technology could be confidently detected under {root}")]
    IncompatibleCategory { category: String, root: String },

    #[error("incompatible technologies: {0}")]
    IncompatibleTechnologies(String),

    #[error("unresolved merge conflicts in {file}: {regions} region(s) need manual resolution")]
    CustomCodeConflicts { file: String, regions: usize },

    #[error("database schema mismatch: {0}")]
    DatabaseSchemaMismatch(String),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("confirmation required: {0}")]
    ConfirmationRequired(String),

    #[error("project test suite failed: {0}")]
    TestFailures(String),

    #[error("backup failed: {0}")]
    BackupFailed(String),

    #[error("another migration holds the project lock: {0}")]
    ProjectLocked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl MigrationError {
    /// The process exit code a CLI run terminating on this error reports.
    ///
    /// Phases stay distinguishable from the exit code alone: analysis and
    /// planning failures, execution failures, and the confirmation/lock
    /// refusals each map to their own code.
    pub fn exit_code(&self) -> i32 {
        match self {
            MigrationError::UnknownTechnology { .. }
            | MigrationError::IncompatibleCategory { .. }
            | MigrationError::IncompatibleTechnologies(_)
            | MigrationError::DatabaseSchemaMismatch(_) => exit_codes::ANALYSIS_FAILED,
            MigrationError::TestFailures(_) => exit_codes::VALIDATION_FAILED,
            MigrationError::ConfirmationRequired(_) | MigrationError::MissingCredentials(_) => {
                exit_codes::CONFIRMATION_REQUIRED
            }
            MigrationError::ProjectLocked(_) => exit_codes::PROJECT_LOCKED,
            MigrationError::CustomCodeConflicts { .. }
            | MigrationError::BackupFailed(_)
            | MigrationError::Io(_)
            | MigrationError::Json(_)
            | MigrationError::InternalError(_) => exit_codes::EXECUTION_FAILED,
        }
    }
}
