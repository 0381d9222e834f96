//! Daemon and event loop for the beads system (C9).
//!
//! A single per-workspace background process that serializes writes,
//! debounces auto-commit, periodically pulls/pushes against the configured
//! remote, watches `.beads/` for out-of-band changes, and serves the CLI's
//! RPC surface over a Unix domain socket so repeated invocations don't each
//! pay SQLite-open and git-subprocess startup cost.
//!
//! [`run`] is the public entry point; everything else is reachable for
//! tests and for embedding the RPC surface in-process (the CLI's
//! direct-store fallback path when no daemon is listening).

pub mod error;
pub mod protocol;
pub mod rpc;
pub mod server;
pub mod state;
pub mod ticker;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use beads_config::{BeadsConfig, DaemonConfig};
use beads_storage::Storage;

pub use error::{DaemonError, Result};
pub use server::{run_daemon, SOCKET_FILE};
pub use state::DaemonState;

/// Runs the daemon for `beads_dir`, wiring the cancellation token to
/// SIGINT/SIGTERM so `Ctrl-C` or a service manager's stop signal triggers a
/// cooperative shutdown rather than being left to the OS to kill outright.
pub async fn run(
    beads_dir: PathBuf,
    store: Arc<dyn Storage>,
    actor: String,
    config: &BeadsConfig,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| DaemonError::Io {
            path: beads_dir.clone(),
            source: e,
        })?;

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        signal_cancel.cancel();
    });

    server::run_daemon(
        beads_dir,
        store,
        actor,
        daemon_config(config),
        config.sync.branch.clone(),
        cancel,
    )
    .await
}

fn daemon_config(config: &BeadsConfig) -> DaemonConfig {
    let mut daemon = config.daemon.clone();
    if let Ok(value) = std::env::var("BEADS_AUTO_PULL") {
        daemon.auto_pull = matches!(value.as_str(), "1" | "true" | "yes");
    }
    daemon
}
