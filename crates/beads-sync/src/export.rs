//! `ExportJsonl(store) -> P` -- materializes `.beads/issues.jsonl` from the
//! main store.
//!
//! Export is the write side's first phase: every sync cycle begins with
//! "export then capture-left" so that the snapshot triple in
//! [`crate::merge`] has a faithful `left` to compare against. Writes are
//! atomic (temp-file + rename) and sorted by `id` ascending so that
//! successive exports diff minimally.

use std::path::Path;

use beads_core::filter::IssueFilter;
use beads_core::issue::Issue;
use beads_storage::traits::Storage;

use crate::atomic::write_atomic;
use crate::error::Result;

/// The canonical export path, relative to the workspace's `.beads/`
/// directory.
pub const ISSUES_JSONL: &str = "issues.jsonl";

/// Exports every non-tombstoned issue in `store` to `beads_dir/issues.jsonl`,
/// sorted by id, one JSON object per line.
///
/// Tombstoned issues are deliberately omitted: their *absence* from the
/// exported tree is what signals a deletion to peers during the next
/// three-way merge (see [`crate::merge::three_way_merge`]).
///
/// # Errors
///
/// Returns [`crate::error::SyncError::Storage`] if the query fails, or
/// [`crate::error::SyncError::Io`] if the atomic write fails.
pub fn export_jsonl(store: &dyn Storage, beads_dir: &Path) -> Result<Vec<Issue>> {
    let mut issues = store.search_issues("", &IssueFilter::default())?;
    issues.sort_by(|a, b| a.id.cmp(&b.id));

    let mut buf = Vec::new();
    beads_core::jsonl::write_jsonl(&mut buf, &issues).expect("writing to an in-memory Vec cannot fail");
    let content = String::from_utf8(buf).expect("serde_json never emits non-UTF-8");

    write_atomic(&beads_dir.join(ISSUES_JSONL), &content)?;
    Ok(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use beads_storage::sqlite::SqliteStore;

    #[test]
    fn export_writes_sorted_jsonl_and_skips_tombstones() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .create_issue(&IssueBuilder::new("b").id("bd-2").build(), "tester")
            .unwrap();
        store
            .create_issue(&IssueBuilder::new("a").id("bd-1").build(), "tester")
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let issues = export_jsonl(&store, dir.path()).unwrap();
        assert_eq!(issues.iter().map(|i| i.id.clone()).collect::<Vec<_>>(), vec!["bd-1", "bd-2"]);

        let content = std::fs::read_to_string(dir.path().join(ISSUES_JSONL)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("bd-1"));
        assert!(lines[1].contains("bd-2"));
    }
}
