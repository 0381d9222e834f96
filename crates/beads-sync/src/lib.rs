//! Three-way JSONL synchronization for the beads system (C7).
//!
//! Reconciles the main store against `.beads/issues.jsonl` using a
//! base/left/working snapshot triple, per the normative contract: capture
//! left, let git merge the working tree, three-way-merge the JSONL by id,
//! apply the result in one transaction, then roll the base forward. See
//! [`engine::run_sync_cycle`] for the orchestration and [`merge`] for the
//! merge algorithm itself.

pub mod atomic;
pub mod engine;
pub mod error;
pub mod export;
pub mod merge;

pub use engine::{issues_jsonl_path, run_sync_cycle, SyncReport};
pub use error::{Result, SyncError};
pub use export::export_jsonl;
pub use merge::{three_way_merge, MergeReport, MergedRecord, ParseError, RecordOutcome, SnapshotSource};
