//! Process exit codes, one per pipeline phase.

/// Migration (or rollback) completed, validation passed or warned.
pub const SUCCESS: i32 = 0;
/// Analysis or planning failed; nothing was touched, no rollback needed.
pub const ANALYSIS_FAILED: i32 = 2;
/// Execution failed; automatic rollback was attempted.
pub const EXECUTION_FAILED: i32 = 3;
/// Migration applied but post-migration validation reported a failure.
pub const VALIDATION_FAILED: i32 = 4;
/// A data-loss step was planned without operator acknowledgment.
pub const CONFIRMATION_REQUIRED: i32 = 5;
/// Another migration holds the project lock.
pub const PROJECT_LOCKED: i32 = 6;
