//! `bd dolt` -- version-control operations over the SQLite-backed store.
//!
//! The name is kept for command-surface familiarity; there is no Dolt
//! dependency here. Version control is implemented over the exported JSONL
//! tree via ordinary git plumbing (see `beads_git::vc`).

use anyhow::Result;

use crate::cli::{DoltArgs, DoltCommands};
use crate::context::RuntimeContext;

/// Execute the `bd dolt` command.
pub fn run(_ctx: &RuntimeContext, args: &DoltArgs) -> Result<()> {
    match &args.command {
        DoltCommands::Sql(_) => {
            println!("bd dolt sql: not supported (no generic SQL console over this backend)");
        }
        DoltCommands::Status => {
            println!("bd dolt status: use `bd vc status` (beads_git::vc::status)");
        }
        DoltCommands::Log => {
            println!("bd dolt log: use `bd vc log` (beads_git::vc::log)");
        }
        DoltCommands::Commit(_) => {
            println!("bd dolt commit: use `bd vc commit` (beads_git::vc::commit)");
        }
        DoltCommands::Push => {
            println!("bd dolt push: use `bd vc push` (beads_git::vc::push)");
        }
        DoltCommands::Pull => {
            println!("bd dolt pull: use `bd vc pull` (beads_git::vc::pull)");
        }
    }
    Ok(())
}
