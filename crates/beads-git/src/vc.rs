//! Version-control operations over the exported JSONL tree.
//!
//! The main store (`beads-storage`) is treated as a versioned database by
//! running ordinary `git` plumbing against the workspace's exported
//! `.beads/issues.jsonl` tree rather than a version-controlled SQL engine.
//! `status`/`commit`/`log`/`branch`/`merge`/`push`/`pull` map directly onto
//! their git counterparts; `get_issue_as_of` and `get_issue_history` are
//! implemented by parsing the JSONL blob at a given ref with `git show`.
//!
//! Conflicts raised by git's merge driver on `issues.jsonl` are NOT resolved
//! here -- that file uses a three-way JSON merge (see `beads-sync`), not
//! git's line-oriented algorithm. This module reports that a merge produced
//! conflicts; resolving them is the sync engine's job.

use std::path::Path;

use beads_core::issue::Issue;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::commands::{git_command, GitError};

/// Errors produced by version-control operations.
#[derive(Debug, Error)]
pub enum VcError {
    /// Underlying git command failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// `Commit` was called with nothing staged or unstaged.
    #[error("nothing to commit, working tree clean")]
    NothingToCommit,

    /// `Push` failed because the remote has commits this clone lacks.
    #[error("remote has diverged; pull before pushing")]
    RemoteAhead,

    /// `Pull` failed because the local working tree has uncommitted changes.
    #[error("local working tree is dirty")]
    LocalDirty,

    /// `Merge` produced conflicts that were not auto-resolved.
    #[error("merge produced conflicts in {0} table(s)")]
    MergeConflicts(usize),

    /// `ResolveConflicts` was called with a strategy other than `ours`/`theirs`.
    #[error("invalid conflict resolution strategy: {0:?} (expected \"ours\" or \"theirs\")")]
    InvalidStrategy(String),

    /// The requested ref or id could not be resolved.
    #[error("not found: {0}")]
    NotFound(String),

    /// A JSONL blob failed to parse.
    #[error("failed to parse issue JSONL at {context}: {source}")]
    Parse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// A commit's date string was not valid RFC3339.
    #[error("malformed commit date {0:?}")]
    MalformedDate(String),
}

pub type Result<T> = std::result::Result<T, VcError>;

/// Kind of change observed in `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One entry in a `status` or `diff` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    pub table: String,
    pub kind: ChangeKind,
}

/// Result of [`status`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcStatus {
    pub staged: Vec<ChangeEntry>,
    pub unstaged: Vec<ChangeEntry>,
}

/// One commit in [`log`] or [`get_issue_history`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub author: String,
    pub email: String,
    pub date: DateTime<Utc>,
    pub message: String,
}

/// Outcome of [`merge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merge completed, possibly as a merge commit.
    Merged { commit: Option<String> },
    /// Merge stopped with conflicts; each entry names an affected table and
    /// how many conflicting records it holds.
    Conflicts(Vec<(String, usize)>),
}

/// Conflict-resolution strategy for [`resolve_conflicts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    Ours,
    Theirs,
}

impl ResolveStrategy {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "ours" => Ok(Self::Ours),
            "theirs" => Ok(Self::Theirs),
            other => Err(VcError::InvalidStrategy(other.to_string())),
        }
    }

    fn as_git_flag(self) -> &'static str {
        match self {
            Self::Ours => "--ours",
            Self::Theirs => "--theirs",
        }
    }
}

/// The file tracked under version control; `status`/`diff`/`log` scope to
/// this single path, since it is the only exported artifact C6 versions.
const ISSUES_JSONL: &str = "issues.jsonl";

/// A ref name for `diff`/`get_issue_as_of` meaning "the working tree", as
/// opposed to a git ref.
pub const WORKING: &str = "WORKING";

/// `Status() -> { staged[], unstaged[] }`.
///
/// # Errors
///
/// Returns [`VcError::Git`] if `git status --porcelain` fails (e.g. `repo`
/// is not a git repository).
pub fn status(repo: &Path) -> Result<VcStatus> {
    let porcelain = git_command(&["status", "--porcelain=v1"], repo)?;
    let mut out = VcStatus::default();
    for line in porcelain.lines() {
        if line.len() < 3 {
            continue;
        }
        let index_status = line.as_bytes()[0] as char;
        let worktree_status = line.as_bytes()[1] as char;
        let path = line[3..].trim();
        if !path.contains(ISSUES_JSONL) {
            continue;
        }
        let table = ISSUES_JSONL.to_string();
        if let Some(kind) = kind_from_code(index_status) {
            out.staged.push(ChangeEntry {
                table: table.clone(),
                kind,
            });
        }
        if let Some(kind) = kind_from_code(worktree_status) {
            out.unstaged.push(ChangeEntry { table, kind });
        }
    }
    Ok(out)
}

fn kind_from_code(code: char) -> Option<ChangeKind> {
    match code {
        'A' => Some(ChangeKind::Added),
        'M' => Some(ChangeKind::Modified),
        'D' => Some(ChangeKind::Deleted),
        'R' => Some(ChangeKind::Renamed),
        _ => None,
    }
}

/// `Commit(message)` -- fails with [`VcError::NothingToCommit`] when the
/// working set is clean; otherwise creates a linear commit on the current
/// branch and returns its hash.
///
/// # Errors
///
/// Returns [`VcError::NothingToCommit`] if there are no staged or unstaged
/// changes to `issues.jsonl`, or [`VcError::Git`] on any underlying git
/// failure.
pub fn commit(repo: &Path, message: &str) -> Result<String> {
    let current = status(repo)?;
    if current.staged.is_empty() && current.unstaged.is_empty() {
        return Err(VcError::NothingToCommit);
    }
    git_command(&["add", ISSUES_JSONL], repo)?;
    git_command(&["commit", "-m", message], repo)?;
    let hash = git_command(&["rev-parse", "HEAD"], repo)?;
    Ok(hash)
}

/// `Log(limit) -> commits`, newest first.
///
/// # Errors
///
/// Returns [`VcError::Git`] if the underlying `git log` invocation fails,
/// or [`VcError::Parse`] if a commit's date cannot be parsed.
pub fn log(repo: &Path, limit: usize) -> Result<Vec<CommitInfo>> {
    const SEP: &str = "\x1f";
    let format = format!("%H{SEP}%an{SEP}%ae{SEP}%aI{SEP}%s");
    let mut args = vec!["log".to_string(), format!("--pretty=format:{format}")];
    if limit > 0 {
        args.push(format!("-n{limit}"));
    }
    args.push("--".to_string());
    args.push(ISSUES_JSONL.to_string());
    let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
    let output = match git_command(&args_ref, repo) {
        Ok(o) => o,
        Err(GitError::CommandFailed { .. }) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut commits = Vec::new();
    for line in output.lines() {
        let parts: Vec<&str> = line.splitn(5, SEP).collect();
        if parts.len() != 5 {
            continue;
        }
        let date = DateTime::parse_from_rfc3339(parts[3])
            .map_err(|_| VcError::MalformedDate(parts[3].to_string()))?
            .with_timezone(&Utc);
        commits.push(CommitInfo {
            hash: parts[0].to_string(),
            author: parts[1].to_string(),
            email: parts[2].to_string(),
            date,
            message: parts[4].to_string(),
        });
    }
    Ok(commits)
}

/// `Branch(name)` -- creates a new branch without switching to it.
pub fn branch(repo: &Path, name: &str) -> Result<()> {
    git_command(&["branch", name], repo)?;
    Ok(())
}

/// `Checkout(ref)`.
pub fn checkout(repo: &Path, reference: &str) -> Result<()> {
    git_command(&["checkout", reference], repo)?;
    Ok(())
}

/// `CurrentBranch()`.
pub fn current_branch(repo: &Path) -> Result<String> {
    let branch = git_command(&["rev-parse", "--abbrev-ref", "HEAD"], repo)?;
    Ok(branch)
}

/// `Merge(ref)` -- may create a merge commit or report conflicts.
///
/// Conflicts in `issues.jsonl` are reported, not resolved; resolving them is
/// the three-way JSONL merge's job (see `beads-sync`), not git's.
///
/// # Errors
///
/// Returns [`VcError::Git`] on any git failure other than a merge conflict.
pub fn merge(repo: &Path, reference: &str) -> Result<MergeOutcome> {
    match git_command(&["merge", "--no-edit", reference], repo) {
        Ok(_) => {
            let commit = git_command(&["rev-parse", "HEAD"], repo).ok();
            Ok(MergeOutcome::Merged { commit })
        }
        Err(GitError::CommandFailed { .. }) => {
            let conflicted = conflicted_paths(repo)?;
            if conflicted.is_empty() {
                // The merge failed for a reason unrelated to conflicts (e.g.
                // dirty working tree); re-run to surface the real error.
                git_command(&["merge", "--abort"], repo).ok();
                return Err(VcError::Git(GitError::CommandFailed {
                    code: None,
                    stderr: "merge failed".to_string(),
                }));
            }
            let count = count_conflict_records(repo)?;
            Ok(MergeOutcome::Conflicts(vec![(ISSUES_JSONL.to_string(), count)]))
        }
        Err(e) => Err(e.into()),
    }
}

fn conflicted_paths(repo: &Path) -> Result<Vec<String>> {
    let out = git_command(&["diff", "--name-only", "--diff-filter=U"], repo)?;
    Ok(out.lines().map(str::to_string).collect())
}

/// Counts `<<<<<<<` conflict markers left in `issues.jsonl` after a failed
/// merge, as a rough proxy for "number of conflicting records".
fn count_conflict_records(repo: &Path) -> Result<usize> {
    let path = repo.join(ISSUES_JSONL);
    let content = std::fs::read_to_string(&path).unwrap_or_default();
    Ok(content.lines().filter(|l| l.starts_with("<<<<<<<")).count())
}

/// `ResolveConflicts(table, strategy)` -- bulk-resolves a conflicted table by
/// picking one side of the merge wholesale.
///
/// # Errors
///
/// Returns [`VcError::InvalidStrategy`] if `strategy` is not `"ours"` or
/// `"theirs"`, or [`VcError::Git`] if the underlying checkout/add fails.
pub fn resolve_conflicts(repo: &Path, table: &str, strategy: &str) -> Result<()> {
    let strategy = ResolveStrategy::parse(strategy)?;
    git_command(&["checkout", strategy.as_git_flag(), "--", table], repo)?;
    git_command(&["add", table], repo)?;
    Ok(())
}

/// One changed record in a [`diff`] result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub id: String,
    pub kind: ChangeKind,
}

/// `Diff(fromRef, toRef) -> entries`, where `toRef = WORKING` names the
/// working set rather than a committed ref.
///
/// # Errors
///
/// Returns [`VcError::Git`] if either ref fails to resolve.
pub fn diff(repo: &Path, from_ref: &str, to_ref: &str) -> Result<Vec<DiffEntry>> {
    let from = read_jsonl_ids_at(repo, from_ref)?;
    let to = if to_ref == WORKING {
        read_jsonl_ids_from_disk(repo)?
    } else {
        read_jsonl_ids_at(repo, to_ref)?
    };

    let mut entries = Vec::new();
    for id in to.keys() {
        if !from.contains_key(id) {
            entries.push(DiffEntry {
                id: id.clone(),
                kind: ChangeKind::Added,
            });
        } else if from.get(id) != to.get(id) {
            entries.push(DiffEntry {
                id: id.clone(),
                kind: ChangeKind::Modified,
            });
        }
    }
    for id in from.keys() {
        if !to.contains_key(id) {
            entries.push(DiffEntry {
                id: id.clone(),
                kind: ChangeKind::Deleted,
            });
        }
    }
    entries.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(entries)
}

/// `Push()`.
///
/// # Errors
///
/// Returns [`VcError::RemoteAhead`] if the remote has commits this clone
/// lacks (a non-fast-forward rejection), or [`VcError::Git`] on any other
/// failure.
pub fn push(repo: &Path) -> Result<()> {
    match git_command(&["push"], repo) {
        Ok(_) => Ok(()),
        Err(GitError::CommandFailed { stderr, .. }) if is_non_fast_forward(&stderr) => {
            Err(VcError::RemoteAhead)
        }
        Err(e) => Err(e.into()),
    }
}

/// `ForcePush()`.
pub fn force_push(repo: &Path) -> Result<()> {
    git_command(&["push", "--force-with-lease"], repo)?;
    Ok(())
}

/// `Pull()`.
///
/// # Errors
///
/// Returns [`VcError::LocalDirty`] if the working tree has uncommitted
/// changes to `issues.jsonl`, or [`VcError::Git`] on any other failure.
pub fn pull(repo: &Path) -> Result<()> {
    let current = status(repo)?;
    if !current.staged.is_empty() || !current.unstaged.is_empty() {
        return Err(VcError::LocalDirty);
    }
    git_command(&["pull", "--no-rebase"], repo)?;
    Ok(())
}

/// `AddRemote(name, url)`.
pub fn add_remote(repo: &Path, name: &str, url: &str) -> Result<()> {
    git_command(&["remote", "add", name, url], repo)?;
    Ok(())
}

fn is_non_fast_forward(stderr: &str) -> bool {
    stderr.contains("non-fast-forward") || stderr.contains("fetch first") || stderr.contains("rejected")
}

/// `GetIssueAsOf(id, ref) -> issue`.
///
/// # Errors
///
/// Returns [`VcError::NotFound`] if no record with `id` exists in the JSONL
/// blob at `reference`, or [`VcError::Parse`] if a matching line is not
/// valid JSON.
pub fn get_issue_as_of(repo: &Path, id: &str, reference: &str) -> Result<Issue> {
    let content = read_jsonl_blob(repo, reference)?;
    find_issue_by_id(&content, id, reference)
}

/// `GetIssueHistory(id) -> sequence of (commit, issue-snapshot)`, oldest
/// first is NOT guaranteed; commits are returned in [`log`]'s newest-first
/// order.
///
/// # Errors
///
/// Returns [`VcError::Git`] if `log` fails. Commits whose blob doesn't
/// contain `id` are silently omitted (the issue didn't exist yet, or was
/// later compacted out of that snapshot) rather than treated as an error.
pub fn get_issue_history(repo: &Path, id: &str) -> Result<Vec<(CommitInfo, Issue)>> {
    let commits = log(repo, 0)?;
    let mut history = Vec::with_capacity(commits.len());
    for commit in commits {
        let content = match read_jsonl_blob(repo, &commit.hash) {
            Ok(c) => c,
            Err(VcError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        };
        if let Ok(issue) = find_issue_by_id(&content, id, &commit.hash) {
            history.push((commit, issue));
        }
    }
    Ok(history)
}

fn find_issue_by_id(jsonl: &str, id: &str, context: &str) -> Result<Issue> {
    for line in jsonl.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let issue: Issue = serde_json::from_str(line).map_err(|e| VcError::Parse {
            context: context.to_string(),
            source: e,
        })?;
        if issue.id == id {
            return Ok(issue);
        }
    }
    Err(VcError::NotFound(id.to_string()))
}

fn read_jsonl_blob(repo: &Path, reference: &str) -> Result<String> {
    let spec = format!("{reference}:{ISSUES_JSONL}");
    match git_command(&["show", &spec], repo) {
        Ok(content) => Ok(content),
        Err(GitError::CommandFailed { .. }) => {
            Err(VcError::NotFound(format!("{ISSUES_JSONL} at {reference}")))
        }
        Err(e) => Err(e.into()),
    }
}

fn read_jsonl_ids_at(repo: &Path, reference: &str) -> Result<std::collections::BTreeMap<String, String>> {
    let content = read_jsonl_blob(repo, reference)?;
    Ok(index_by_id(&content))
}

fn read_jsonl_ids_from_disk(repo: &Path) -> Result<std::collections::BTreeMap<String, String>> {
    let path = repo.join(ISSUES_JSONL);
    let content = std::fs::read_to_string(&path).unwrap_or_default();
    Ok(index_by_id(&content))
}

fn index_by_id(jsonl: &str) -> std::collections::BTreeMap<String, String> {
    let mut map = std::collections::BTreeMap::new();
    for line in jsonl.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(id) = extract_id(line) {
            map.insert(id, line.to_string());
        }
    }
    map
}

fn extract_id(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    value.get("id")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        git_command(&["init"], dir.path()).unwrap();
        git_command(&["config", "user.name", "Test"], dir.path()).unwrap();
        git_command(&["config", "user.email", "test@example.com"], dir.path()).unwrap();
        dir
    }

    fn write_jsonl(dir: &Path, lines: &[&str]) {
        fs::write(dir.join(ISSUES_JSONL), lines.join("\n") + "\n").unwrap();
    }

    #[test]
    fn status_reports_untracked_issues_file() {
        let dir = init_repo();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1"}"#]);
        let st = status(dir.path()).unwrap();
        assert_eq!(st.unstaged.len(), 1);
        assert_eq!(st.unstaged[0].kind, ChangeKind::Added);
    }

    #[test]
    fn commit_fails_when_nothing_to_commit() {
        let dir = init_repo();
        let err = commit(dir.path(), "empty").unwrap_err();
        assert!(matches!(err, VcError::NothingToCommit));
    }

    #[test]
    fn commit_then_log_round_trip() {
        let dir = init_repo();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1"}"#]);
        let hash = commit(dir.path(), "add bd-1").unwrap();
        let commits = log(dir.path(), 10).unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].hash, hash);
        assert_eq!(commits[0].message, "add bd-1");
    }

    #[test]
    fn current_branch_reports_main_or_master() {
        let dir = init_repo();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1"}"#]);
        commit(dir.path(), "init").unwrap();
        let branch = current_branch(dir.path()).unwrap();
        assert!(!branch.is_empty());
    }

    #[test]
    fn branch_and_checkout() {
        let dir = init_repo();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1"}"#]);
        commit(dir.path(), "init").unwrap();
        branch(dir.path(), "feature").unwrap();
        checkout(dir.path(), "feature").unwrap();
        assert_eq!(current_branch(dir.path()).unwrap(), "feature");
    }

    #[test]
    fn get_issue_as_of_reads_historical_blob() {
        let dir = init_repo();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1","title":"first"}"#]);
        let first_hash = commit(dir.path(), "v1").unwrap();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1","title":"second"}"#]);
        commit(dir.path(), "v2").unwrap();

        let at_first = get_issue_as_of(dir.path(), "bd-1", &first_hash).unwrap();
        assert_eq!(at_first.title, "first");

        let at_head = get_issue_as_of(dir.path(), "bd-1", "HEAD").unwrap();
        assert_eq!(at_head.title, "second");
    }

    #[test]
    fn get_issue_as_of_missing_id_not_found() {
        let dir = init_repo();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1"}"#]);
        commit(dir.path(), "init").unwrap();
        let err = get_issue_as_of(dir.path(), "bd-missing", "HEAD").unwrap_err();
        assert!(matches!(err, VcError::NotFound(_)));
    }

    #[test]
    fn get_issue_history_walks_commits_newest_first() {
        let dir = init_repo();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1","title":"first"}"#]);
        commit(dir.path(), "v1").unwrap();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1","title":"second"}"#]);
        commit(dir.path(), "v2").unwrap();

        let history = get_issue_history(dir.path(), "bd-1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].1.title, "second");
        assert_eq!(history[1].1.title, "first");
    }

    #[test]
    fn diff_detects_added_modified_and_deleted() {
        let dir = init_repo();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1","title":"a"}"#, r#"{"id":"bd-2","title":"b"}"#]);
        let base = commit(dir.path(), "base").unwrap();
        write_jsonl(
            dir.path(),
            &[r#"{"id":"bd-1","title":"a-changed"}"#, r#"{"id":"bd-3","title":"c"}"#],
        );

        let entries = diff(dir.path(), &base, WORKING).unwrap();
        let kinds: std::collections::BTreeMap<_, _> =
            entries.iter().map(|e| (e.id.clone(), e.kind)).collect();
        assert_eq!(kinds.get("bd-1"), Some(&ChangeKind::Modified));
        assert_eq!(kinds.get("bd-2"), Some(&ChangeKind::Deleted));
        assert_eq!(kinds.get("bd-3"), Some(&ChangeKind::Added));
    }

    #[test]
    fn resolve_conflicts_rejects_invalid_strategy() {
        let dir = init_repo();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1"}"#]);
        commit(dir.path(), "init").unwrap();
        let err = resolve_conflicts(dir.path(), ISSUES_JSONL, "mine").unwrap_err();
        assert!(matches!(err, VcError::InvalidStrategy(_)));
    }

    #[test]
    fn merge_produces_conflicts_on_diverging_content() {
        let dir = init_repo();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1","title":"base"}"#]);
        commit(dir.path(), "base").unwrap();
        branch(dir.path(), "feature").unwrap();

        write_jsonl(dir.path(), &[r#"{"id":"bd-1","title":"main-edit"}"#]);
        commit(dir.path(), "main edit").unwrap();

        checkout(dir.path(), "feature").unwrap();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1","title":"feature-edit"}"#]);
        commit(dir.path(), "feature edit").unwrap();

        checkout(dir.path(), "master").or_else(|_| checkout(dir.path(), "main")).unwrap();
        let outcome = merge(dir.path(), "feature").unwrap();
        match outcome {
            MergeOutcome::Conflicts(tables) => {
                assert_eq!(tables.len(), 1);
                assert_eq!(tables[0].0, ISSUES_JSONL);
            }
            MergeOutcome::Merged { .. } => panic!("expected conflicts"),
        }
    }

    #[test]
    fn push_without_remote_reports_git_error() {
        let dir = init_repo();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1"}"#]);
        commit(dir.path(), "init").unwrap();
        let err = push(dir.path()).unwrap_err();
        assert!(matches!(err, VcError::Git(_)));
    }

    #[test]
    fn pull_with_dirty_tree_is_rejected() {
        let dir = init_repo();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1"}"#]);
        commit(dir.path(), "init").unwrap();
        write_jsonl(dir.path(), &[r#"{"id":"bd-1","title":"dirty"}"#]);
        let err = pull(dir.path()).unwrap_err();
        assert!(matches!(err, VcError::LocalDirty));
    }
}
