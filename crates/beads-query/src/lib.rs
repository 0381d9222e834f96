//! A thin, composable query layer above [`beads_core::filter::IssueFilter`].
//!
//! The storage crate turns an `IssueFilter` into a SQL `WHERE` clause. This
//! crate provides the other half of the C5 contract: a [`FilterBuilder`]
//! that validates metadata keys eagerly (at build time, not query time, so
//! `InvalidMetadataKey` is reported as close to the call site as possible),
//! and a pure [`matches`] predicate usable anywhere a `Vec<Issue>` needs to
//! be filtered in memory rather than in SQL -- the ephemeral store, a
//! route-forwarded result set that must be re-filtered client-side, or a
//! unit test. Both code paths are built from the same `IssueFilter` fields,
//! so a constraint added to one is available to the other without having to
//! re-derive it.

use std::collections::BTreeMap;

use beads_core::enums::{IssueType, MolType, Status, WispType};
use beads_core::filter::{validate_metadata_key, IssueFilter};
use beads_core::issue::Issue;
use thiserror::Error;

/// Errors raised while building or evaluating a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A metadata key failed [`validate_metadata_key`].
    #[error("invalid metadata key: {0}")]
    InvalidMetadataKey(#[from] beads_core::filter::InvalidMetadataKey),
}

/// Result alias for query construction.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Builds an [`IssueFilter`] incrementally, validating metadata constraints
/// as they are added rather than waiting for the first query execution.
///
/// ```
/// use beads_query::FilterBuilder;
/// use beads_core::enums::Status;
///
/// let filter = FilterBuilder::new()
///     .status(Status::Open)
///     .label("gt:agent")
///     .metadata_field("rig", "default")
///     .unwrap()
///     .build();
/// assert_eq!(filter.status, Some(Status::Open));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    filter: IssueFilter,
}

impl FilterBuilder {
    /// Starts from an empty filter (matches everything except tombstones).
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing filter, e.g. to layer additional constraints
    /// onto one parsed from CLI flags.
    pub fn from_filter(filter: IssueFilter) -> Self {
        Self { filter }
    }

    pub fn status(mut self, status: Status) -> Self {
        self.filter.status = Some(status);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.filter.priority = Some(priority);
        self
    }

    pub fn issue_type(mut self, issue_type: IssueType) -> Self {
        self.filter.issue_type = Some(issue_type);
        self
    }

    pub fn assignee(mut self, assignee: impl Into<String>) -> Self {
        self.filter.assignee = Some(assignee.into());
        self
    }

    /// Adds a label that must be present (AND semantics across all calls).
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.filter.labels.push(label.into());
        self
    }

    pub fn ids(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.filter.ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn source_repo(mut self, source_repo: impl Into<String>) -> Self {
        self.filter.source_repo = Some(source_repo.into());
        self
    }

    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.filter.ephemeral = Some(ephemeral);
        self
    }

    pub fn include_tombstones(mut self, include: bool) -> Self {
        self.filter.include_tombstones = include;
        self
    }

    pub fn limit(mut self, limit: i32) -> Self {
        self.filter.limit = Some(limit);
        self
    }

    pub fn mol_type(mut self, mol_type: MolType) -> Self {
        self.filter.mol_type = Some(mol_type);
        self
    }

    pub fn wisp_type(mut self, wisp_type: WispType) -> Self {
        self.filter.wisp_type = Some(wisp_type);
        self
    }

    /// Adds a `key == value` metadata constraint, validating `key`
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidMetadataKey`] if `key` fails
    /// [`validate_metadata_key`]; the builder is left unchanged.
    pub fn metadata_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let key = key.into();
        validate_metadata_key(&key)?;
        self.filter.metadata_fields.insert(key, value.into());
        Ok(self)
    }

    /// Requires the metadata JSON to contain `key` (any value), validating
    /// `key` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidMetadataKey`] if `key` fails
    /// [`validate_metadata_key`].
    pub fn has_metadata_key(mut self, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        validate_metadata_key(&key)?;
        self.filter.has_metadata_key = Some(key);
        Ok(self)
    }

    /// Finalizes the filter.
    ///
    /// Metadata keys have already been validated as they were added, so this
    /// never fails -- but callers that built an `IssueFilter` some other way
    /// (e.g. deserialized from a daemon RPC argument) should still run it
    /// through [`validate`] before using it, since that path skips the
    /// builder entirely.
    pub fn build(self) -> IssueFilter {
        self.filter
    }
}

/// Validates every metadata key an externally-constructed [`IssueFilter`]
/// references (e.g. one deserialized from an RPC request, which bypassed
/// [`FilterBuilder`]'s eager validation).
///
/// # Errors
///
/// Returns [`QueryError::InvalidMetadataKey`] on the first invalid key.
pub fn validate(filter: &IssueFilter) -> Result<()> {
    filter.validate_metadata_keys().map_err(QueryError::from)
}

/// The pure in-memory predicate counterpart to the storage layer's SQL
/// `WHERE` clause generation.
///
/// This function and the SQL builder in `beads-storage` MUST agree on every
/// constraint in [`IssueFilter`] -- a discrepancy here is a query-engine bug.
/// Use this wherever results cannot come from the SQL layer directly: the
/// ephemeral store's own filtering, or re-filtering a route-forwarded result
/// set from a remote workspace (C10) that was fetched with a looser filter.
///
/// # Errors
///
/// Returns [`QueryError::InvalidMetadataKey`] if the filter's own metadata
/// constraints are invalid, matching the SQL path's behavior of failing the
/// whole query rather than silently excluding everything.
pub fn matches(issue: &Issue, filter: &IssueFilter) -> Result<bool> {
    validate(filter)?;
    Ok(matches_unchecked(issue, filter))
}

/// Like [`matches`] but skips metadata-key validation, for call sites that
/// already validated the filter once (e.g. scanning many issues against one
/// filter) and want to avoid repeating the check per issue.
pub fn matches_unchecked(issue: &Issue, filter: &IssueFilter) -> bool {
    if !filter.include_tombstones && issue.status == Status::Tombstone {
        return false;
    }
    if let Some(status) = filter.status {
        if issue.status != status {
            return false;
        }
    }
    if let Some(priority) = filter.priority {
        if issue.priority != priority {
            return false;
        }
    }
    if let Some(issue_type) = filter.issue_type {
        if issue.issue_type != issue_type {
            return false;
        }
    }
    if let Some(ref assignee) = filter.assignee {
        if &issue.assignee != assignee {
            return false;
        }
    }
    if !filter.labels.is_empty() && !filter.labels.iter().all(|l| issue.labels.contains(l)) {
        return false;
    }
    if !filter.labels_any.is_empty() && !filter.labels_any.iter().any(|l| issue.labels.contains(l)) {
        return false;
    }
    if !filter.ids.is_empty() && !filter.ids.contains(&issue.id) {
        return false;
    }
    if let Some(ref prefix) = filter.id_prefix {
        if !issue.id.starts_with(prefix.as_str()) {
            return false;
        }
    }
    if let Some(ref prefix) = filter.spec_id_prefix {
        if !issue.spec_id.starts_with(prefix.as_str()) {
            return false;
        }
    }
    if filter.no_assignee && !issue.assignee.is_empty() {
        return false;
    }
    if filter.empty_description && !issue.description.is_empty() {
        return false;
    }
    if filter.no_labels && !issue.labels.is_empty() {
        return false;
    }
    if let Some(ref source_repo) = filter.source_repo {
        if &issue.source_repo != source_repo {
            return false;
        }
    }
    if let Some(ephemeral) = filter.ephemeral {
        if issue.ephemeral != ephemeral {
            return false;
        }
    }
    if let Some(pinned) = filter.pinned {
        if issue.pinned != pinned {
            return false;
        }
    }
    if let Some(is_template) = filter.is_template {
        if issue.is_template != is_template {
            return false;
        }
    }
    if let Some(mol_type) = filter.mol_type {
        if issue.mol_type != mol_type {
            return false;
        }
    }
    if let Some(wisp_type) = filter.wisp_type {
        if issue.wisp_type != wisp_type {
            return false;
        }
    }
    if filter.exclude_status.contains(&issue.status) {
        return false;
    }
    if filter.exclude_types.contains(&issue.issue_type) {
        return false;
    }
    if let Some(ref q) = filter.title_search {
        if !text_contains(&issue.title, q) {
            return false;
        }
    }
    if let Some(ref q) = filter.title_contains {
        if !text_contains(&issue.title, q) {
            return false;
        }
    }
    if let Some(ref q) = filter.description_contains {
        if !text_contains(&issue.description, q) {
            return false;
        }
    }
    if let Some(ref q) = filter.notes_contains {
        if !text_contains(&issue.notes, q) {
            return false;
        }
    }
    if !metadata_matches(issue, &filter.metadata_fields, filter.has_metadata_key.as_deref()) {
        return false;
    }
    true
}

/// Full-text substring match against title/description/notes, case
/// insensitive, matching the SQL layer's `LIKE` semantics.
pub fn full_text_matches(issue: &Issue, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    text_contains(&issue.title, query)
        || text_contains(&issue.description, query)
        || text_contains(&issue.notes, query)
}

fn text_contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn metadata_matches(issue: &Issue, fields: &BTreeMap<String, String>, has_key: Option<&str>) -> bool {
    let parsed: Option<serde_json::Value> = issue
        .metadata
        .as_ref()
        .and_then(|raw| serde_json::from_str(raw.get()).ok());

    if !fields.is_empty() {
        let Some(ref obj) = parsed else {
            return false;
        };
        for (key, value) in fields {
            let found = obj.get(key).and_then(|v| v.as_str()).map(|s| s == value);
            if found != Some(true) {
                return false;
            }
        }
    }

    if let Some(key) = has_key {
        let Some(ref obj) = parsed else {
            return false;
        };
        if obj.get(key).is_none() {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;

    fn issue_with_metadata(json: &str) -> Issue {
        let mut issue = IssueBuilder::new("Title").build();
        issue.metadata = Some(serde_json::value::RawValue::from_string(json.to_string()).unwrap());
        issue
    }

    #[test]
    fn builder_rejects_bad_metadata_key_immediately() {
        let result = FilterBuilder::new().metadata_field("'; DROP TABLE issues; --", "x");
        assert!(matches!(result, Err(QueryError::InvalidMetadataKey(_))));
    }

    #[test]
    fn builder_accepts_valid_fields() {
        let filter = FilterBuilder::new()
            .status(Status::Open)
            .label("gt:agent")
            .metadata_field("rig", "default")
            .unwrap()
            .build();
        assert_eq!(filter.status, Some(Status::Open));
        assert_eq!(filter.labels, vec!["gt:agent".to_string()]);
        assert_eq!(filter.metadata_fields.get("rig"), Some(&"default".to_string()));
    }

    #[test]
    fn matches_excludes_tombstones_by_default() {
        let mut issue = IssueBuilder::new("x").build();
        issue.status = Status::Tombstone;
        let filter = IssueFilter::default();
        assert!(!matches_unchecked(&issue, &filter));
    }

    #[test]
    fn matches_includes_tombstones_when_requested() {
        let mut issue = IssueBuilder::new("x").build();
        issue.status = Status::Tombstone;
        let filter = FilterBuilder::new().include_tombstones(true).build();
        assert!(matches_unchecked(&issue, &filter));
    }

    #[test]
    fn matches_requires_all_labels() {
        let mut issue = IssueBuilder::new("x").build();
        issue.labels = vec!["a".into(), "b".into()];
        let filter = FilterBuilder::new().label("a").label("c").build();
        assert!(!matches_unchecked(&issue, &filter));
        let filter = FilterBuilder::new().label("a").label("b").build();
        assert!(matches_unchecked(&issue, &filter));
    }

    #[test]
    fn matches_metadata_field_exact_value() {
        let issue = issue_with_metadata(r#"{"rig":"default"}"#);
        let filter = FilterBuilder::new().metadata_field("rig", "default").unwrap().build();
        assert!(matches_unchecked(&issue, &filter));
        let filter = FilterBuilder::new().metadata_field("rig", "other").unwrap().build();
        assert!(!matches_unchecked(&issue, &filter));
    }

    #[test]
    fn matches_has_metadata_key_any_value() {
        let issue = issue_with_metadata(r#"{"agent_id":"abc"}"#);
        let filter = FilterBuilder::new().has_metadata_key("agent_id").unwrap().build();
        assert!(matches_unchecked(&issue, &filter));
        let filter = FilterBuilder::new().has_metadata_key("missing").unwrap().build();
        assert!(!matches_unchecked(&issue, &filter));
    }

    #[test]
    fn matches_rejects_invalid_metadata_key_on_externally_built_filter() {
        let issue = IssueBuilder::new("x").build();
        let mut filter = IssueFilter::default();
        filter.has_metadata_key = Some("bad key".to_string());
        let result = matches(&issue, &filter);
        assert!(matches!(result, Err(QueryError::InvalidMetadataKey(_))));
    }

    #[test]
    fn full_text_matches_is_case_insensitive() {
        let mut issue = IssueBuilder::new("Urgent Bug").build();
        issue.description = "needs triage".to_string();
        assert!(full_text_matches(&issue, "urgent"));
        assert!(full_text_matches(&issue, "TRIAGE"));
        assert!(!full_text_matches(&issue, "nonexistent"));
    }

    #[test]
    fn matches_no_assignee_and_no_labels() {
        let mut issue = IssueBuilder::new("x").assignee("alice").build();
        issue.labels = vec!["a".into()];
        let mut filter = IssueFilter::default();
        filter.no_assignee = true;
        assert!(!matches_unchecked(&issue, &filter));
        filter.no_assignee = false;
        filter.no_labels = true;
        assert!(!matches_unchecked(&issue, &filter));

        let issue = IssueBuilder::new("x").build();
        let mut filter = IssueFilter::default();
        filter.no_assignee = true;
        filter.no_labels = true;
        assert!(matches_unchecked(&issue, &filter));
    }

    #[test]
    fn full_text_empty_query_matches_everything() {
        let issue = IssueBuilder::new("x").build();
        assert!(full_text_matches(&issue, ""));
    }
}
