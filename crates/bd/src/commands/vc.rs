//! `bd vc` -- version-control operations over the exported JSONL tree.

use anyhow::{Context, Result};

use beads_git::vc::{self, VcError};

use crate::cli::{VcArgs, VcCommands};
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `bd vc` command.
pub fn run(ctx: &RuntimeContext, args: &VcArgs) -> Result<()> {
    let beads_dir = ctx
        .resolve_db_path()
        .context("no beads database found. Run 'bd init' to create one.")?;

    match &args.command {
        VcCommands::Status => run_status(ctx, &beads_dir),
        VcCommands::Commit(commit_args) => run_commit(ctx, &beads_dir, commit_args.message.as_deref()),
        VcCommands::Push => run_push(ctx, &beads_dir),
        VcCommands::Pull => run_pull(ctx, &beads_dir),
    }
}

fn run_status(ctx: &RuntimeContext, beads_dir: &std::path::Path) -> Result<()> {
    let status = vc::status(beads_dir).context("failed to read version-control status")?;
    if ctx.json {
        let value = serde_json::json!({
            "staged": status.staged.iter().map(change_json).collect::<Vec<_>>(),
            "unstaged": status.unstaged.iter().map(change_json).collect::<Vec<_>>(),
        });
        output_json(&value);
    } else if status.staged.is_empty() && status.unstaged.is_empty() {
        println!("working tree clean");
    } else {
        if !status.staged.is_empty() {
            println!("staged:");
            for entry in &status.staged {
                println!("  {:?} {}", entry.kind, entry.table);
            }
        }
        if !status.unstaged.is_empty() {
            println!("unstaged:");
            for entry in &status.unstaged {
                println!("  {:?} {}", entry.kind, entry.table);
            }
        }
    }
    Ok(())
}

fn change_json(entry: &vc::ChangeEntry) -> serde_json::Value {
    serde_json::json!({ "table": entry.table, "kind": format!("{:?}", entry.kind) })
}

fn run_commit(ctx: &RuntimeContext, beads_dir: &std::path::Path, message: Option<&str>) -> Result<()> {
    let message = message.unwrap_or("bd vc commit");
    match vc::commit(beads_dir, message) {
        Ok(hash) => {
            if ctx.json {
                output_json(&serde_json::json!({ "commit": hash }));
            } else {
                println!("committed {hash}");
            }
            Ok(())
        }
        Err(VcError::NothingToCommit) => {
            if ctx.json {
                output_json(&serde_json::json!({ "error": "nothing_to_commit" }));
            } else {
                println!("nothing to commit, working tree clean");
            }
            Ok(())
        }
        Err(e) => Err(e).context("commit failed"),
    }
}

fn run_push(ctx: &RuntimeContext, beads_dir: &std::path::Path) -> Result<()> {
    match vc::push(beads_dir) {
        Ok(()) => {
            if !ctx.json {
                println!("pushed");
            }
            Ok(())
        }
        Err(VcError::RemoteAhead) => {
            anyhow::bail!("remote has diverged; run 'bd vc pull' first")
        }
        Err(e) => Err(e).context("push failed"),
    }
}

fn run_pull(ctx: &RuntimeContext, beads_dir: &std::path::Path) -> Result<()> {
    match vc::pull(beads_dir) {
        Ok(()) => {
            if !ctx.json {
                println!("pulled");
            }
            Ok(())
        }
        Err(VcError::LocalDirty) => {
            anyhow::bail!("local working tree is dirty; commit or stash before pulling")
        }
        Err(e) => Err(e).context("pull failed"),
    }
}
