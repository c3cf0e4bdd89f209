//! Three-way line merge for files that diverged from their generated
//! baseline.
//!
//! ## Workflow
//! 1. `base` — the original template output (checksum-matched at planning
//!    time), `ours` — the file currently on disk, `theirs` — the new target
//!    template output.
//! 2. Line ranges changed on only one side merge automatically. Identical
//!    changes on both sides merge automatically.
//! 3. Overlapping, differing changes are preserved verbatim on BOTH sides
//!    between conflict markers and reported as `ManualRequired`. The merger
//!    never picks a side and never drops content.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opening marker for the side currently on disk.
pub const MARKER_OURS: &str = "<<<<<<< current";
/// Separator between the two sides of a conflict.
pub const MARKER_SEP: &str = "=======";
/// Closing marker for the incoming target-template side.
pub const MARKER_THEIRS: &str = ">>>>>>> incoming";

/// How a changed region was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// One-sided or identical change; merged without intervention.
    Auto,
    /// Overlapping differing change; both sides preserved behind markers.
    ManualRequired,
}

/// A changed region in the merged output. Lines are 1-based and inclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRegion {
    pub line_start: usize,
    pub line_end: usize,
    pub resolution: Resolution,
}

/// Full conflict payload for a file that needs manual resolution.
///
/// Resolution state is data returned to the caller, not an error — callers
/// decide whether to prompt, fail a CI run, or halt an execution step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConflict {
    pub file: String,
    pub base_version: String,
    pub our_version: String,
    pub their_version: String,
    pub conflict_regions: Vec<ConflictRegion>,
}

/// Result of a three-way merge.
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// Merged content; contains conflict markers iff any region is
    /// `ManualRequired`.
    pub content: String,
    pub regions: Vec<ConflictRegion>,
}

impl MergeResult {
    /// Number of regions requiring manual resolution.
    pub fn manual_regions(&self) -> usize {
        self.regions
            .iter()
            .filter(|r| r.resolution == Resolution::ManualRequired)
            .count()
    }

    /// `true` if the merge completed without manual regions.
    pub fn is_clean(&self) -> bool {
        self.manual_regions() == 0
    }
}

/// Merges `ours` and `theirs` against their common ancestor `base`.
pub fn merge_three_way(base: &str, ours: &str, theirs: &str) -> MergeResult {
    let b: Vec<&str> = base.lines().collect();
    let o: Vec<&str> = ours.lines().collect();
    let t: Vec<&str> = theirs.lines().collect();

    // Base line → matching line on each side, from two pairwise LCS runs.
    let match_ours: HashMap<usize, usize> = lcs_pairs(&b, &o).into_iter().collect();
    let match_theirs: HashMap<usize, usize> = lcs_pairs(&b, &t).into_iter().collect();

    // Anchors: base lines matched on BOTH sides. LCS pairs are monotone, so
    // walking anchors in base order keeps all three cursors in sync.
    let mut anchors: Vec<(usize, usize, usize)> = b
        .iter()
        .enumerate()
        .filter_map(|(bi, _)| {
            match (match_ours.get(&bi), match_theirs.get(&bi)) {
                (Some(&oi), Some(&ti)) => Some((bi, oi, ti)),
                _ => None,
            }
        })
        .collect();
    // Virtual end anchor closes the final chunk.
    anchors.push((b.len(), o.len(), t.len()));

    let mut out: Vec<String> = Vec::new();
    let mut regions: Vec<ConflictRegion> = Vec::new();
    let (mut bi, mut oi, mut ti) = (0usize, 0usize, 0usize);

    for (ab, ao, at) in anchors {
        emit_chunk(
            &b[bi..ab],
            &o[oi..ao],
            &t[ti..at],
            &mut out,
            &mut regions,
        );
        if ab < b.len() {
            // The anchor line itself is identical on all three sides.
            out.push(b[ab].to_string());
        }
        bi = ab + 1;
        oi = ao + 1;
        ti = at + 1;
    }

    let mut content = out.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    MergeResult { content, regions }
}

/// Decides one non-anchored chunk: base slice vs both sides' slices.
fn emit_chunk(
    b: &[&str],
    o: &[&str],
    t: &[&str],
    out: &mut Vec<String>,
    regions: &mut Vec<ConflictRegion>,
) {
    if b.is_empty() && o.is_empty() && t.is_empty() {
        return;
    }

    let ours_changed = o != b;
    let theirs_changed = t != b;

    let start = out.len();
    let resolution = match (ours_changed, theirs_changed) {
        (false, false) => {
            out.extend(b.iter().map(|l| l.to_string()));
            None
        }
        (true, false) => {
            out.extend(o.iter().map(|l| l.to_string()));
            Some(Resolution::Auto)
        }
        (false, true) => {
            out.extend(t.iter().map(|l| l.to_string()));
            Some(Resolution::Auto)
        }
        (true, true) if o == t => {
            // Convergent edit: both sides made the same change.
            out.extend(o.iter().map(|l| l.to_string()));
            Some(Resolution::Auto)
        }
        (true, true) => {
            out.push(MARKER_OURS.to_string());
            out.extend(o.iter().map(|l| l.to_string()));
            out.push(MARKER_SEP.to_string());
            out.extend(t.iter().map(|l| l.to_string()));
            out.push(MARKER_THEIRS.to_string());
            Some(Resolution::ManualRequired)
        }
    };

    if let Some(resolution) = resolution {
        if out.len() > start {
            regions.push(ConflictRegion {
                line_start: start + 1,
                line_end: out.len(),
                resolution,
            });
        }
    }
}

/// Longest common subsequence of two line slices, as (index_a, index_b)
/// pairs in strictly increasing order on both components.
fn lcs_pairs(a: &[&str], b: &[&str]) -> Vec<(usize, usize)> {
    let n = a.len();
    let m = b.len();
    if n == 0 || m == 0 {
        return Vec::new();
    }

    // Standard DP table; template-sized inputs keep this small.
    let mut dp = vec![0u32; (n + 1) * (m + 1)];
    let idx = |i: usize, j: usize| i * (m + 1) + j;
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[idx(i, j)] = if a[i] == b[j] {
                dp[idx(i + 1, j + 1)] + 1
            } else {
                dp[idx(i + 1, j)].max(dp[idx(i, j + 1)])
            };
        }
    }

    let mut pairs = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < n && j < m {
        if a[i] == b[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if dp[idx(i + 1, j)] >= dp[idx(i, j + 1)] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

/// Minimal unified-style listing of the line differences between two texts.
///
/// Used by the planner to describe a `Modify` change; not a patch format.
pub fn unified_diff(a: &str, b: &str) -> String {
    let al: Vec<&str> = a.lines().collect();
    let bl: Vec<&str> = b.lines().collect();
    let matched: HashMap<usize, usize> = lcs_pairs(&al, &bl).into_iter().collect();
    let matched_b: std::collections::HashSet<usize> = matched.values().copied().collect();

    let mut out = String::new();
    let mut j = 0usize;
    for (i, line) in al.iter().enumerate() {
        if let Some(&mj) = matched.get(&i) {
            while j < mj {
                if !matched_b.contains(&j) {
                    out.push_str("+ ");
                    out.push_str(bl[j]);
                    out.push('\n');
                }
                j += 1;
            }
            j = mj + 1;
        } else {
            out.push_str("- ");
            out.push_str(line);
            out.push('\n');
        }
    }
    while j < bl.len() {
        if !matched_b.contains(&j) {
            out.push_str("+ ");
            out.push_str(bl[j]);
            out.push('\n');
        }
        j += 1;
    }
    out
}
