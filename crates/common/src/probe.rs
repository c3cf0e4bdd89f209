//! Database row-count probe.
//!
//! The engine has no live database driver of its own; when the operator
//! configures a probe command (`RESTACK_ROW_COUNT_CMD` or `--row-count-cmd`),
//! it is run as a subprocess and must print a JSON object mapping table name
//! to row count. The executor captures counts before the first mutating
//! database step and the validator re-probes afterwards to compare.

use crate::error::MigrationError;
use std::collections::BTreeMap;
use std::process::Command;

/// Environment variable consulted when no explicit probe command is given.
pub const ROW_COUNT_CMD_ENV: &str = "RESTACK_ROW_COUNT_CMD";

/// Runs `command` through the shell and parses its stdout as
/// `{"table": count, ...}`.
pub fn row_counts(command: &str) -> Result<BTreeMap<String, u64>, MigrationError> {
    let output = Command::new("sh").arg("-c").arg(command).output()?;
    if !output.status.success() {
        return Err(MigrationError::DatabaseSchemaMismatch(format!(
            "row-count probe `{command}` exited with {}",
            output.status.code().unwrap_or(-1)
        )));
    }
    let counts: BTreeMap<String, u64> = serde_json::from_slice(&output.stdout)?;
    Ok(counts)
}
