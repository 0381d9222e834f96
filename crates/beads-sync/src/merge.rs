//! Three-way JSONL merge -- the normative algorithm from the synchronization
//! contract.
//!
//! Given `base` (last content both sides agreed on), `left` (this clone's
//! export before the pull), and `working` (the file on disk after the git
//! pull merged peers' changes in), this module decides, per record id,
//! whether the record was added remotely, deleted remotely, left unchanged,
//! or must be merged field-by-field.
//!
//! Only the four cases the contract actually specifies get dedicated
//! handling; the remaining presence combinations (a record that exists only
//! locally and never reached `base`, or one deleted on both sides already)
//! either require no action or are resolved conservatively in favor of not
//! losing data -- each is called out at its match arm below.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// One malformed line skipped during parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub source: SnapshotSource,
    pub line: usize,
    pub message: String,
}

/// Which of the three JSONL inputs a [`ParseError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Base,
    Left,
    Working,
}

/// Outcome of merging a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Present in `working` only -- imported as new.
    RemoteAdded,
    /// Present in `base` and `left` but absent from `working` -- tombstoned.
    RemoteDeleted,
    /// Identical in `left` and `working`; no action needed.
    Unchanged,
    /// Differed between `left` and `working`; the returned record is the
    /// field-by-field merge result.
    Merged,
}

/// The result of merging one id: what happened, and (for anything but
/// `RemoteDeleted`) the resulting JSON record to import into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRecord {
    pub id: String,
    pub outcome: RecordOutcome,
    pub record: Option<Map<String, Value>>,
}

/// Full report of a three-way merge pass.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub records: Vec<MergedRecord>,
    pub parse_errors: Vec<ParseError>,
}

impl MergeReport {
    pub fn added(&self) -> impl Iterator<Item = &MergedRecord> {
        self.records.iter().filter(|r| r.outcome == RecordOutcome::RemoteAdded)
    }

    pub fn deleted(&self) -> impl Iterator<Item = &MergedRecord> {
        self.records.iter().filter(|r| r.outcome == RecordOutcome::RemoteDeleted)
    }

    pub fn merged(&self) -> impl Iterator<Item = &MergedRecord> {
        self.records.iter().filter(|r| r.outcome == RecordOutcome::Merged)
    }

    /// `true` if every record was `Unchanged` and nothing was parsed
    /// incorrectly -- i.e. running the merge again would be a no-op.
    pub fn is_noop(&self) -> bool {
        self.records.iter().all(|r| r.outcome == RecordOutcome::Unchanged)
    }
}

/// Parses a JSONL blob into a map from `id` to its parsed JSON object,
/// recording (not aborting on) malformed lines.
pub fn parse_records(jsonl: &str, source: SnapshotSource, errors: &mut Vec<ParseError>) -> BTreeMap<String, Map<String, Value>> {
    let mut records = BTreeMap::new();
    for (idx, line) in jsonl.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(obj)) => {
                let Some(id) = obj.get("id").and_then(Value::as_str) else {
                    errors.push(ParseError {
                        source,
                        line: idx + 1,
                        message: "record has no string \"id\" field".to_string(),
                    });
                    continue;
                };
                records.insert(id.to_string(), obj);
            }
            Ok(_) => errors.push(ParseError {
                source,
                line: idx + 1,
                message: "expected a JSON object".to_string(),
            }),
            Err(e) => errors.push(ParseError {
                source,
                line: idx + 1,
                message: e.to_string(),
            }),
        }
    }
    records
}

/// Runs the three-way merge over the three JSONL blobs.
///
/// `base` is empty on a workspace's first sync cycle (no snapshot yet); in
/// that case the merge is skipped entirely by the caller (see
/// `crate::engine`), not by this function -- callers that genuinely have no
/// base should not call this at all.
pub fn three_way_merge(base: &str, left: &str, working: &str) -> MergeReport {
    let mut errors = Vec::new();
    let base_records = parse_records(base, SnapshotSource::Base, &mut errors);
    let left_records = parse_records(left, SnapshotSource::Left, &mut errors);
    let working_records = parse_records(working, SnapshotSource::Working, &mut errors);

    let mut ids: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
    ids.extend(left_records.keys().cloned());
    ids.extend(working_records.keys().cloned());
    ids.extend(base_records.keys().cloned());

    let mut records = Vec::with_capacity(ids.len());
    for id in ids {
        let b = base_records.get(&id);
        let l = left_records.get(&id);
        let w = working_records.get(&id);

        let merged = match (b, l, w) {
            // Remote-added: brand new, nobody's seen it before.
            (None, None, Some(w)) => MergedRecord {
                id,
                outcome: RecordOutcome::RemoteAdded,
                record: Some(w.clone()),
            },

            // Remote-deleted: we had it, peers removed it, git's merge
            // dropped it from the working tree.
            (Some(_), Some(_), None) => MergedRecord {
                id,
                outcome: RecordOutcome::RemoteDeleted,
                record: None,
            },

            // Present on both sides post-pull, identical -- nothing to do.
            (_, Some(l), Some(w)) if l == w => MergedRecord {
                id,
                outcome: RecordOutcome::Unchanged,
                record: Some(l.clone()),
            },

            // Present on both sides post-pull, differing -- field merge.
            // Covers both the normative (Some,Some,Some) case and convergent
            // creation ((None,Some,Some)), where `base` is absent and every
            // field is treated as having no prior agreed value.
            (b, Some(l), Some(w)) => {
                let merged_obj = field_merge(b, l, w);
                MergedRecord {
                    id,
                    outcome: RecordOutcome::Merged,
                    record: Some(merged_obj),
                }
            }

            // Local-only record never observed remotely (e.g. created
            // locally, not yet picked up by a peer's pull). The store
            // already holds it since `left` was exported from the store;
            // no action needed.
            (_, Some(l), None) => MergedRecord {
                id,
                outcome: RecordOutcome::Unchanged,
                record: Some(l.clone()),
            },

            // We had deleted it locally (absent from `left`) but a peer's
            // working copy still carries it, possibly with edits made after
            // our delete. The contract only specifies the mirror case
            // (§4.7); treated the same way here: import what the peer has
            // rather than silently dropping their data.
            (_, None, Some(w)) => MergedRecord {
                id,
                outcome: RecordOutcome::RemoteAdded,
                record: Some(w.clone()),
            },

            // Deleted on both sides already, or never existed anywhere
            // reachable -- nothing to do.
            (_, None, None) => continue,
        };
        records.push(merged);
    }

    MergeReport {
        records,
        parse_errors: errors,
    }
}

/// Merges one record field-by-field: for each field, picks the side that
/// differs from `base`; if both differ from `base` and from each other,
/// picks the side with the later `updated_at`, breaking ties toward
/// `working`.
fn field_merge(
    base: Option<&Map<String, Value>>,
    left: &Map<String, Value>,
    working: &Map<String, Value>,
) -> Map<String, Value> {
    let empty = Map::new();
    let base = base.unwrap_or(&empty);

    let later_side_is_working = later_updated_at_is_working(left, working);

    let mut keys: std::collections::BTreeSet<&String> = std::collections::BTreeSet::new();
    keys.extend(left.keys());
    keys.extend(working.keys());

    let mut merged = Map::new();
    for key in keys {
        let b = base.get(key);
        let l = left.get(key);
        let w = working.get(key);

        let value = match (l, w) {
            (Some(l), Some(w)) if l == w => l.clone(),
            (Some(l), Some(w)) => {
                let left_differs = b != Some(l);
                let working_differs = b != Some(w);
                match (left_differs, working_differs) {
                    (true, false) => l.clone(),
                    (false, true) => w.clone(),
                    // Both sides changed this field (or neither, which only
                    // happens if l != w while both equal a present base --
                    // impossible -- so this arm is really "both changed"):
                    // pick by recency, tie toward working.
                    _ => {
                        if later_side_is_working {
                            w.clone()
                        } else {
                            l.clone()
                        }
                    }
                }
            }
            (Some(l), None) => l.clone(),
            (None, Some(w)) => w.clone(),
            (None, None) => continue,
        };
        merged.insert(key.clone(), value);
    }
    merged
}

/// Compares the `updated_at` fields of two records, treating a missing or
/// unparsable timestamp as older than any present one. Ties resolve to
/// `working`, matching the merge contract's tiebreak rule.
fn later_updated_at_is_working(left: &Map<String, Value>, working: &Map<String, Value>) -> bool {
    let l = updated_at_of(left);
    let w = updated_at_of(working);
    match (l, w) {
        (Some(l), Some(w)) => w >= l,
        (None, Some(_)) => true,
        (Some(_), None) => false,
        (None, None) => true,
    }
}

fn updated_at_of(record: &Map<String, Value>) -> Option<DateTime<Utc>> {
    record
        .get("updated_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn remote_added_record_is_imported() {
        let working = r#"{"id":"bd-1","title":"new"}"#;
        let report = three_way_merge("", "", working);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].outcome, RecordOutcome::RemoteAdded);
    }

    #[test]
    fn remote_deleted_record_is_tombstoned() {
        let base = r#"{"id":"bd-1","title":"x"}"#;
        let left = r#"{"id":"bd-1","title":"x"}"#;
        let report = three_way_merge(base, left, "");
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].outcome, RecordOutcome::RemoteDeleted);
        assert!(report.records[0].record.is_none());
    }

    #[test]
    fn unchanged_when_left_and_working_identical() {
        let base = r#"{"id":"bd-1","title":"x"}"#;
        let left = r#"{"id":"bd-1","title":"x"}"#;
        let working = r#"{"id":"bd-1","title":"x"}"#;
        let report = three_way_merge(base, left, working);
        assert_eq!(report.records[0].outcome, RecordOutcome::Unchanged);
        assert!(report.is_noop());
    }

    #[test]
    fn field_merge_picks_side_that_changed() {
        let base = r#"{"id":"bd-1","title":"orig","notes":"orig-notes"}"#;
        // local changed title only
        let left = r#"{"id":"bd-1","title":"local-title","notes":"orig-notes"}"#;
        // remote changed notes only
        let working = r#"{"id":"bd-1","title":"orig","notes":"remote-notes"}"#;
        let report = three_way_merge(base, left, working);
        assert_eq!(report.records[0].outcome, RecordOutcome::Merged);
        let merged = report.records[0].record.as_ref().unwrap();
        assert_eq!(merged.get("title").unwrap(), "local-title");
        assert_eq!(merged.get("notes").unwrap(), "remote-notes");
    }

    #[test]
    fn field_merge_conflicting_field_picks_later_updated_at() {
        let base = json!({"id":"bd-1","title":"orig","updated_at":"2026-01-01T00:00:00Z"});
        let left = json!({"id":"bd-1","title":"local","updated_at":"2026-01-02T00:00:00Z"});
        let working = json!({"id":"bd-1","title":"remote","updated_at":"2026-01-03T00:00:00Z"});
        let merged = field_merge(Some(&obj(base)), &obj(left), &obj(working));
        // working's updated_at is later, so working wins the conflicting field.
        assert_eq!(merged.get("title").unwrap(), "remote");
    }

    #[test]
    fn field_merge_tie_picks_working() {
        let base = json!({"id":"bd-1","title":"orig","updated_at":"2026-01-01T00:00:00Z"});
        let left = json!({"id":"bd-1","title":"local","updated_at":"2026-01-02T00:00:00Z"});
        let working = json!({"id":"bd-1","title":"remote","updated_at":"2026-01-02T00:00:00Z"});
        let merged = field_merge(Some(&obj(base)), &obj(left), &obj(working));
        assert_eq!(merged.get("title").unwrap(), "remote");
    }

    #[test]
    fn parse_errors_are_recorded_not_fatal() {
        let working = "not-json\n{\"id\":\"bd-1\"}\n";
        let report = three_way_merge("", "", working);
        assert_eq!(report.parse_errors.len(), 1);
        assert_eq!(report.records.len(), 1);
    }

    #[test]
    fn missing_base_falls_back_to_convergent_creation_merge() {
        let left = r#"{"id":"bd-1","title":"local","updated_at":"2026-01-02T00:00:00Z"}"#;
        let working = r#"{"id":"bd-1","title":"remote","updated_at":"2026-01-01T00:00:00Z"}"#;
        let report = three_way_merge("", left, working);
        assert_eq!(report.records[0].outcome, RecordOutcome::Merged);
        let merged = report.records[0].record.as_ref().unwrap();
        // left is later, so it should win.
        assert_eq!(merged.get("title").unwrap(), "local");
    }

    #[test]
    fn local_only_record_is_untouched() {
        let left = r#"{"id":"bd-1","title":"local-only"}"#;
        let report = three_way_merge("", left, "");
        assert_eq!(report.records[0].outcome, RecordOutcome::Unchanged);
    }
}
