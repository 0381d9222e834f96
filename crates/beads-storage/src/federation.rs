//! Route beads and cross-workspace resolution (C10).
//!
//! A *route* is an [`Issue`] of type `route` whose title encodes
//! `<prefix> -> <workspace path>` (an ASCII arrow or the Unicode `→` are both
//! accepted). Given an id whose prefix matches a route, operations can be
//! forwarded to the store rooted at that workspace instead of the local one.
//!
//! Routes are read from the local store and cached in memory; [`RouteTable`]
//! does not watch the filesystem itself -- callers invalidate the cache when
//! they observe a route-bead change (create/update/delete of an
//! `IssueType::Custom("route")` issue), mirroring how the daemon's event
//! loop invalidates other derived state on write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use beads_core::enums::IssueType;
use beads_core::issue::Issue;

use crate::error::Result;
use crate::sqlite::SqliteStore;
use crate::traits::Storage;

/// The issue type string that marks a route bead.
pub const ROUTE_ISSUE_TYPE: &str = "route";

/// A single `prefix -> workspace path` mapping parsed from a route bead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub prefix: String,
    pub workspace_path: PathBuf,
}

/// Parses a route bead's title into a [`RouteEntry`].
///
/// Accepts `"<prefix> -> <path>"` and `"<prefix> \u{2192} <path>"`. Returns
/// `None` if the issue isn't a route, or its title doesn't match either
/// separator.
pub fn parse_route(issue: &Issue) -> Option<RouteEntry> {
    if !matches!(&issue.issue_type, IssueType::Custom(t) if t == ROUTE_ISSUE_TYPE) {
        return None;
    }
    let title = issue.title.as_str();
    let (prefix, path) = title
        .split_once("->")
        .or_else(|| title.split_once('\u{2192}'))?;
    let prefix = prefix.trim();
    let path = path.trim();
    if prefix.is_empty() || path.is_empty() {
        return None;
    }
    Some(RouteEntry {
        prefix: prefix.to_string(),
        workspace_path: PathBuf::from(path),
    })
}

/// In-memory cache of the workspace's route beads, keyed for longest-prefix
/// resolution.
///
/// Absence of any routes means every id resolves locally -- the common case
/// for a workspace that doesn't federate.
#[derive(Default)]
pub struct RouteTable {
    entries: RwLock<Vec<RouteEntry>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Rebuilds the table from the route beads currently in `store`.
    pub fn rebuild(&self, store: &dyn Storage) -> Result<()> {
        let filter = beads_core::filter::IssueFilter {
            issue_type: Some(IssueType::Custom(ROUTE_ISSUE_TYPE.to_string())),
            ..Default::default()
        };
        let issues = store.search_issues("", &filter)?;
        let mut routes: Vec<RouteEntry> = issues.iter().filter_map(parse_route).collect();
        // Longest prefix first so resolve() finds the most specific match.
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        *self.entries.write().expect("route table lock poisoned") = routes;
        Ok(())
    }

    /// Clears the cache; the next [`RouteTable::resolve`] after this sees no
    /// routes until [`RouteTable::rebuild`] runs again.
    pub fn invalidate(&self) {
        self.entries
            .write()
            .expect("route table lock poisoned")
            .clear();
    }

    /// Returns the workspace path of the longest matching route prefix for
    /// `id`, or `None` if no route applies (local resolution).
    pub fn resolve(&self, id: &str) -> Option<PathBuf> {
        self.entries
            .read()
            .expect("route table lock poisoned")
            .iter()
            .find(|r| id.starts_with(r.prefix.as_str()))
            .map(|r| r.workspace_path.clone())
    }

    /// Returns a snapshot of the currently cached routes.
    pub fn snapshot(&self) -> Vec<RouteEntry> {
        self.entries.read().expect("route table lock poisoned").clone()
    }
}

/// Opens (and caches) the target stores that routes point at, and forwards
/// id lookups to them.
///
/// This is the "direct store access" fallback described for transient CLI
/// processes without a daemon connection: it opens the target workspace's
/// `beads.db` directly rather than going through that workspace's daemon
/// socket, since the socket RPC client lives in a higher-level crate. A
/// daemon-aware forwarder can wrap this with the same [`RouteTable`] and
/// prefer the socket when one is listening.
pub struct RouteForwarder {
    table: RouteTable,
    opened: RwLock<HashMap<PathBuf, SqliteStore>>,
}

impl RouteForwarder {
    pub fn new() -> Self {
        Self {
            table: RouteTable::new(),
            opened: RwLock::new(HashMap::new()),
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Resolves `id` against the route table and, if a route matches, opens
    /// (or reuses) the target workspace's store and looks the issue up
    /// there. Returns `Ok(None)` when no route applies.
    pub fn forward_get(&self, id: &str) -> Result<Option<Issue>> {
        let Some(workspace) = self.table.resolve(id) else {
            return Ok(None);
        };
        let db_path = workspace.join(".beads").join("beads.db");
        {
            let opened = self.opened.read().expect("route forwarder lock poisoned");
            if let Some(store) = opened.get(&workspace) {
                return Ok(Some(store.get_issue(id)?));
            }
        }
        let store = SqliteStore::open(&db_path)?;
        let issue = store.get_issue(id)?;
        self.opened
            .write()
            .expect("route forwarder lock poisoned")
            .insert(workspace, store);
        Ok(Some(issue))
    }
}

impl Default for RouteForwarder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;

    fn route_issue(title: &str) -> Issue {
        let mut issue = IssueBuilder::new(title).id("route-1").build();
        issue.issue_type = IssueType::Custom(ROUTE_ISSUE_TYPE.to_string());
        issue
    }

    #[test]
    fn parses_ascii_arrow() {
        let issue = route_issue("ext- -> ../other-workspace");
        let route = parse_route(&issue).unwrap();
        assert_eq!(route.prefix, "ext-");
        assert_eq!(route.workspace_path, PathBuf::from("../other-workspace"));
    }

    #[test]
    fn parses_unicode_arrow() {
        let issue = route_issue("ext- \u{2192} ../other-workspace");
        let route = parse_route(&issue).unwrap();
        assert_eq!(route.prefix, "ext-");
    }

    #[test]
    fn non_route_issue_type_is_ignored() {
        let mut issue = IssueBuilder::new("ext- -> ../x").id("t-1").build();
        issue.issue_type = IssueType::Task;
        assert!(parse_route(&issue).is_none());
    }

    #[test]
    fn resolve_picks_longest_prefix() {
        let table = RouteTable::new();
        *table.entries.write().unwrap() = vec![
            RouteEntry {
                prefix: "ext-".to_string(),
                workspace_path: PathBuf::from("/a"),
            },
            RouteEntry {
                prefix: "ext-sub-".to_string(),
                workspace_path: PathBuf::from("/b"),
            },
        ];
        // Longest prefix should have been sorted first by rebuild(); here we
        // insert directly, so sort explicitly to mirror rebuild()'s contract.
        table
            .entries
            .write()
            .unwrap()
            .sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        assert_eq!(table.resolve("ext-sub-42"), Some(PathBuf::from("/b")));
        assert_eq!(table.resolve("ext-7"), Some(PathBuf::from("/a")));
        assert_eq!(table.resolve("other-1"), None);
    }

    #[test]
    fn invalidate_clears_routes() {
        let table = RouteTable::new();
        *table.entries.write().unwrap() = vec![RouteEntry {
            prefix: "ext-".to_string(),
            workspace_path: PathBuf::from("/a"),
        }];
        table.invalidate();
        assert_eq!(table.resolve("ext-1"), None);
    }
}
