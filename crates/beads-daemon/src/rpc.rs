//! RPC method dispatch.
//!
//! Each unary method takes the shared [`DaemonState`] and a JSON args value
//! and returns a JSON result or a [`DaemonError`]. `WatchEvents` is handled
//! separately by the connection loop in `server.rs` since it streams
//! multiple responses instead of returning one.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use beads_core::dependency::Dependency;
use beads_core::enums::{DependencyType, IssueType, Status};
use beads_core::idgen::{self, adaptive_defaults};
use beads_core::issue::IssueBuilder;
use beads_storage::traits::IssueUpdates;
use beads_storage::Storage;

use crate::error::{DaemonError, Result};
use crate::state::DaemonState;

pub async fn dispatch(state: &DaemonState, method: &str, args: Value) -> Result<Value> {
    state.touch().await;
    match method {
        "Health" => health(state).await,
        "Status" => status(state).await,
        "List" => list(state, args).await,
        "Show" => show(state, args).await,
        "Create" => create(state, args).await,
        "Update" => update(state, args).await,
        "Batch" => batch(state, args).await,
        "Delete" => delete(state, args).await,
        "AddLabel" => add_label(state, args).await,
        "RemoveLabel" => remove_label(state, args).await,
        "ResolveID" => resolve_id(state, args).await,
        "AddDependency" => add_dependency(state, args).await,
        "RemoveDependency" => remove_dependency(state, args).await,
        "AddBidirectionalRelation" => add_bidirectional_relation(state, args).await,
        "RemoveBidirectionalRelation" => remove_bidirectional_relation(state, args).await,
        other => Err(DaemonError::UnknownMethod(other.to_string())),
    }
}

async fn health(_state: &DaemonState) -> Result<Value> {
    Ok(json!({ "status": "ok" }))
}

async fn status(state: &DaemonState) -> Result<Value> {
    let store = state.store.clone();
    let stats = tokio::task::spawn_blocking(move || store.get_statistics())
        .await
        .expect("blocking task panicked")?;
    Ok(json!({
        "total_issues": stats.total_issues,
        "open_issues": stats.open_issues,
        "closed_issues": stats.closed_issues,
        "in_progress_issues": stats.in_progress_issues,
        "blocked_issues": stats.blocked_issues,
        "deferred_issues": stats.deferred_issues,
        "last_activity": state.last_activity().await.to_rfc3339(),
    }))
}

#[derive(Deserialize, Default)]
struct ListArgs {
    #[serde(default)]
    query: String,
    #[serde(default)]
    filter: beads_core::filter::IssueFilter,
}

async fn list(state: &DaemonState, args: Value) -> Result<Value> {
    let args: ListArgs = serde_json::from_value(args).map_err(|e| DaemonError::BadRequest(e.to_string()))?;
    let store = state.store.clone();
    let issues = tokio::task::spawn_blocking(move || store.search_issues(&args.query, &args.filter))
        .await
        .expect("blocking task panicked")?;
    Ok(serde_json::to_value(issues).expect("Issue serializes"))
}

#[derive(Deserialize)]
struct IdArgs {
    id: String,
}

async fn show(state: &DaemonState, args: Value) -> Result<Value> {
    let args: IdArgs = serde_json::from_value(args).map_err(|e| DaemonError::BadRequest(e.to_string()))?;
    let store = state.store.clone();
    let issue = tokio::task::spawn_blocking(move || store.get_issue(&args.id))
        .await
        .expect("blocking task panicked")?;
    Ok(serde_json::to_value(issue).expect("Issue serializes"))
}

#[derive(Deserialize)]
struct CreateArgs {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    issue_type: IssueType,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    ephemeral: bool,
    #[serde(default = "default_prefix")]
    prefix: String,
}

fn default_prefix() -> String {
    "bd".to_string()
}

async fn create(state: &DaemonState, args: Value) -> Result<Value> {
    let args: CreateArgs = serde_json::from_value(args).map_err(|e| DaemonError::BadRequest(e.to_string()))?;
    let store = state.store.clone();
    let actor = state.actor.clone();

    let issue = tokio::task::spawn_blocking(move || -> Result<beads_core::issue::Issue> {
        let stats = store.get_statistics()?;
        let length = idgen::compute_adaptive_length(
            stats.total_issues as usize,
            adaptive_defaults::MIN_LENGTH,
            adaptive_defaults::MAX_LENGTH,
            adaptive_defaults::MAX_COLLISION_PROB,
        );
        let now = Utc::now();
        let store_ref = store.as_ref();
        let id = idgen::allocate_id(
            &args.prefix,
            &args.title,
            &args.description,
            &actor,
            now,
            0,
            length,
            adaptive_defaults::MAX_LENGTH,
            |candidate| store_ref.get_issue(candidate).is_ok(),
        )
        .map_err(|e| beads_storage::error::StorageError::Validation {
            message: e.to_string(),
        })?;

        let mut builder = IssueBuilder::new(&args.title)
            .id(&id)
            .description(&args.description)
            .issue_type(args.issue_type)
            .status(Status::Open)
            .ephemeral(args.ephemeral);
        if let Some(p) = args.priority {
            builder = builder.priority(p);
        }
        if let Some(a) = args.assignee {
            builder = builder.assignee(a);
        }
        let issue = builder.build();
        store.create_issue(&issue, &actor)?;
        for label in &args.labels {
            store.add_label(&id, label, &actor)?;
        }
        Ok(issue)
    })
    .await
    .expect("blocking task panicked")?;

    state.mark_dirty();
    Ok(serde_json::to_value(issue).expect("Issue serializes"))
}

#[derive(Deserialize)]
struct UpdateArgs {
    id: String,
    updates: IssueUpdatesArgs,
}

/// JSON-friendly mirror of [`IssueUpdates`] -- identical field set, but
/// derives `Deserialize` directly rather than requiring callers to know
/// the storage crate's internal type.
#[derive(Deserialize, Default)]
struct IssueUpdatesArgs {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<Status>,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    issue_type: Option<IssueType>,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    owner: Option<String>,
}

impl From<IssueUpdatesArgs> for IssueUpdates {
    fn from(a: IssueUpdatesArgs) -> Self {
        IssueUpdates {
            title: a.title,
            description: a.description,
            status: a.status,
            priority: a.priority,
            issue_type: a.issue_type,
            assignee: a.assignee,
            owner: a.owner,
            ..Default::default()
        }
    }
}

async fn update(state: &DaemonState, args: Value) -> Result<Value> {
    let args: UpdateArgs = serde_json::from_value(args).map_err(|e| DaemonError::BadRequest(e.to_string()))?;
    let store = state.store.clone();
    let actor = state.actor.clone();
    let updates: IssueUpdates = args.updates.into();
    tokio::task::spawn_blocking(move || store.update_issue(&args.id, &updates, &actor))
        .await
        .expect("blocking task panicked")?;
    state.mark_dirty();
    Ok(json!({ "id": args.id }))
}

async fn batch(state: &DaemonState, args: Value) -> Result<Value> {
    #[derive(Deserialize)]
    struct BatchArgs {
        requests: Vec<(String, Value)>,
    }
    let args: BatchArgs = serde_json::from_value(args).map_err(|e| DaemonError::BadRequest(e.to_string()))?;
    let mut results = Vec::with_capacity(args.requests.len());
    for (method, sub_args) in args.requests {
        let result = match dispatch(state, &method, sub_args).await {
            Ok(v) => json!({ "success": true, "data": v }),
            Err(e) => json!({ "success": false, "error": e.to_string() }),
        };
        results.push(result);
    }
    Ok(Value::Array(results))
}

async fn delete(state: &DaemonState, args: Value) -> Result<Value> {
    let args: IdArgs = serde_json::from_value(args).map_err(|e| DaemonError::BadRequest(e.to_string()))?;
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || store.delete_issue(&args.id))
        .await
        .expect("blocking task panicked")?;
    state.mark_dirty();
    Ok(json!({ "id": args.id }))
}

#[derive(Deserialize)]
struct LabelArgs {
    id: String,
    label: String,
}

async fn add_label(state: &DaemonState, args: Value) -> Result<Value> {
    let args: LabelArgs = serde_json::from_value(args).map_err(|e| DaemonError::BadRequest(e.to_string()))?;
    let store = state.store.clone();
    let actor = state.actor.clone();
    tokio::task::spawn_blocking(move || store.add_label(&args.id, &args.label, &actor))
        .await
        .expect("blocking task panicked")?;
    state.mark_dirty();
    Ok(json!({ "id": args.id, "label": args.label }))
}

async fn remove_label(state: &DaemonState, args: Value) -> Result<Value> {
    let args: LabelArgs = serde_json::from_value(args).map_err(|e| DaemonError::BadRequest(e.to_string()))?;
    let store = state.store.clone();
    let actor = state.actor.clone();
    tokio::task::spawn_blocking(move || store.remove_label(&args.id, &args.label, &actor))
        .await
        .expect("blocking task panicked")?;
    state.mark_dirty();
    Ok(json!({ "id": args.id, "label": args.label }))
}

#[derive(Deserialize)]
struct ResolveArgs {
    partial: String,
}

async fn resolve_id(state: &DaemonState, args: Value) -> Result<Value> {
    let args: ResolveArgs = serde_json::from_value(args).map_err(|e| DaemonError::BadRequest(e.to_string()))?;
    let store = state.store.clone();
    let resolved = tokio::task::spawn_blocking(move || -> Result<String> {
        let issues = store.search_issues("", &beads_core::filter::IssueFilter::default())?;
        let ids: Vec<&str> = issues.iter().map(|i| i.id.as_str()).collect();
        idgen::resolve_partial_id(&args.partial, ids.iter().copied())
            .map_err(|e| DaemonError::BadRequest(e.to_string()))
    })
    .await
    .expect("blocking task panicked")?;
    Ok(json!({ "id": resolved }))
}

#[derive(Deserialize)]
struct DependencyArgs {
    issue_id: String,
    depends_on_id: String,
    #[serde(default)]
    dep_type: DependencyType,
}

async fn add_dependency(state: &DaemonState, args: Value) -> Result<Value> {
    let args: DependencyArgs = serde_json::from_value(args).map_err(|e| DaemonError::BadRequest(e.to_string()))?;
    let store = state.store.clone();
    let actor = state.actor.clone();
    tokio::task::spawn_blocking(move || {
        let dep = Dependency {
            issue_id: args.issue_id.clone(),
            depends_on_id: args.depends_on_id.clone(),
            dep_type: args.dep_type,
            created_at: Utc::now(),
            created_by: actor.clone(),
            metadata: String::new(),
            thread_id: String::new(),
        };
        store.add_dependency(&dep, &actor)
    })
    .await
    .expect("blocking task panicked")?;
    state.mark_dirty();
    Ok(json!({}))
}

async fn remove_dependency(state: &DaemonState, args: Value) -> Result<Value> {
    let args: DependencyArgs = serde_json::from_value(args).map_err(|e| DaemonError::BadRequest(e.to_string()))?;
    let store = state.store.clone();
    let actor = state.actor.clone();
    tokio::task::spawn_blocking(move || {
        store.remove_dependency(&args.issue_id, &args.depends_on_id, &actor)
    })
    .await
    .expect("blocking task panicked")?;
    state.mark_dirty();
    Ok(json!({}))
}

#[derive(Deserialize)]
struct RelateArgs {
    a: String,
    b: String,
}

/// `relates-to` is the one dependency type the engine stores as a
/// reciprocal pair: both directions are written (or removed) so a lookup
/// from either endpoint sees the relation.
async fn add_bidirectional_relation(state: &DaemonState, args: Value) -> Result<Value> {
    let args: RelateArgs = serde_json::from_value(args).map_err(|e| DaemonError::BadRequest(e.to_string()))?;
    let store = state.store.clone();
    let actor = state.actor.clone();
    tokio::task::spawn_blocking(move || {
        let forward = Dependency {
            issue_id: args.a.clone(),
            depends_on_id: args.b.clone(),
            dep_type: DependencyType::RelatesTo,
            created_at: Utc::now(),
            created_by: actor.clone(),
            metadata: String::new(),
            thread_id: String::new(),
        };
        let backward = Dependency {
            issue_id: args.b.clone(),
            depends_on_id: args.a.clone(),
            dep_type: DependencyType::RelatesTo,
            created_at: Utc::now(),
            created_by: actor.clone(),
            metadata: String::new(),
            thread_id: String::new(),
        };
        store.add_dependency(&forward, &actor)?;
        store.add_dependency(&backward, &actor)
    })
    .await
    .expect("blocking task panicked")?;
    state.mark_dirty();
    Ok(json!({}))
}

async fn remove_bidirectional_relation(state: &DaemonState, args: Value) -> Result<Value> {
    let args: RelateArgs = serde_json::from_value(args).map_err(|e| DaemonError::BadRequest(e.to_string()))?;
    let store = state.store.clone();
    let actor = state.actor.clone();
    tokio::task::spawn_blocking(move || {
        store.remove_dependency(&args.a, &args.b, &actor)?;
        store.remove_dependency(&args.b, &args.a, &actor)
    })
    .await
    .expect("blocking task panicked")?;
    state.mark_dirty();
    Ok(json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use beads_storage::sqlite::SqliteStore;

    fn test_state() -> DaemonState {
        let store: Arc<dyn beads_storage::Storage> = Arc::new(SqliteStore::open_in_memory().unwrap());
        DaemonState::new(std::path::PathBuf::from("/tmp"), store, "tester".to_string())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let state = test_state();
        let result = dispatch(&state, "Health", json!({})).await.unwrap();
        assert_eq!(result["status"], "ok");
    }

    #[tokio::test]
    async fn create_then_show_round_trips() {
        let state = test_state();
        let created = dispatch(
            &state,
            "Create",
            json!({ "title": "fix the thing", "prefix": "bd" }),
        )
        .await
        .unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        assert!(state.take_dirty());

        let shown = dispatch(&state, "Show", json!({ "id": id })).await.unwrap();
        assert_eq!(shown["title"], "fix the thing");
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let state = test_state();
        let err = dispatch(&state, "Nonexistent", json!({})).await.unwrap_err();
        assert!(matches!(err, DaemonError::UnknownMethod(_)));
    }

    #[tokio::test]
    async fn bidirectional_relation_is_visible_from_both_sides() {
        let state = test_state();
        let a = dispatch(&state, "Create", json!({ "title": "a", "prefix": "bd" }))
            .await
            .unwrap();
        let b = dispatch(&state, "Create", json!({ "title": "b", "prefix": "bd" }))
            .await
            .unwrap();
        let a_id = a["id"].as_str().unwrap().to_string();
        let b_id = b["id"].as_str().unwrap().to_string();

        dispatch(
            &state,
            "AddBidirectionalRelation",
            json!({ "a": a_id, "b": b_id }),
        )
        .await
        .unwrap();

        let forward = state.store.get_dependencies(&a_id).unwrap();
        let backward = state.store.get_dependencies(&b_id).unwrap();
        assert!(forward.iter().any(|i| i.id == b_id));
        assert!(backward.iter().any(|i| i.id == a_id));
    }
}
