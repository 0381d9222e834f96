//! The daemon's event loop: a single-threaded, cooperative scheduler over
//! the Unix socket listener, the filesystem watcher, and the three tickers.
//!
//! Ordering guarantees (RPC arrival order is write order) fall out of
//! running everything on one task via `select!` rather than spawning a
//! task per connection: only one branch of the loop body ever executes at a
//! time, and each RPC's actual storage work is a single `spawn_blocking`
//! call awaited to completion before the loop continues. Cancellation is
//! cooperative: every branch either completes quickly or itself polls the
//! cancellation token.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use beads_config::DaemonConfig;
use beads_lockfile::{LockGuard, LockKind, LockManager};
use beads_storage::Storage;

use crate::error::{DaemonError, Result};
use crate::protocol::{read_request, write_response, Response};
use crate::rpc;
use crate::state::DaemonState;
use crate::ticker::{auto_commit_ticker, housekeeping_ticker, remote_sync_ticker, Backoff};
use crate::watch::{spawn_watcher, WatchSignal};

pub const SOCKET_FILE: &str = "bd.sock";

/// Runs the daemon event loop until canceled. Acquires the daemon lock for
/// the process lifetime; dropping the returned guard (which happens when
/// this function returns) releases it.
pub async fn run_daemon(
    beads_dir: PathBuf,
    store: Arc<dyn Storage>,
    actor: String,
    config: DaemonConfig,
    sync_branch: String,
    cancel: CancellationToken,
) -> Result<()> {
    let lock_manager = LockManager::new(beads_dir.clone());
    let _daemon_lock: LockGuard = lock_manager
        .try_acquire(LockKind::Daemon, None)
        .map_err(|_| DaemonError::AlreadyRunning)?;

    let socket_path = beads_dir.join(SOCKET_FILE);
    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path).map_err(|e| DaemonError::Io {
        path: socket_path.clone(),
        source: e,
    })?;
    info!(?socket_path, "daemon listening");

    let state = Arc::new(DaemonState::new(beads_dir.clone(), store, actor));
    state.routes.rebuild(state.store.as_ref())?;

    let (mut watch_rx, watch_handle) = spawn_watcher(beads_dir.clone());
    let mut auto_commit = auto_commit_ticker(&config);
    let mut remote_sync = remote_sync_ticker(&config);
    let mut housekeeping = housekeeping_ticker(&config);
    let mut backoff = Backoff::new(&config);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("shutdown signal received, draining event loop");
                break;
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let state = state.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(stream, state, cancel).await {
                                debug!(%err, "connection closed with error");
                            }
                        });
                    }
                    Err(err) => warn!(%err, "failed to accept connection"),
                }
            }

            signal = watch_rx.recv() => {
                match signal {
                    Some(WatchSignal::JsonlChanged) => {
                        debug!("issues.jsonl changed on disk outside the daemon");
                        state.mark_dirty();
                    }
                    Some(WatchSignal::Other(path)) => {
                        debug!(?path, "housekeeping-relevant change");
                    }
                    None => {} // watcher thread exited; tolerate and keep running
                }
            }

            _ = auto_commit.tick() => {
                if state.take_dirty() {
                    if let Err(err) = run_sync_cycle(&state, &beads_dir) {
                        warn!(%err, "auto-commit sync cycle failed");
                        state.mark_dirty(); // retry next tick
                    }
                }
            }

            _ = tick_or_pending(remote_sync.as_mut()) => {
                if config.auto_pull && !sync_branch.is_empty() {
                    match run_sync_cycle(&state, &beads_dir) {
                        Ok(()) => backoff.reset(),
                        Err(err) => {
                            warn!(%err, "remote sync cycle failed, backing off");
                            tokio::time::sleep(backoff.next_delay()).await;
                        }
                    }
                }
            }

            _ = housekeeping.tick() => {
                if let Err(err) = run_housekeeping(&state) {
                    warn!(%err, "housekeeping cycle failed");
                }
            }
        }
    }

    watch_handle.abort();
    Ok(())
}

/// Awaits the next tick of an optional ticker, or never resolves if there is
/// none -- lets a disabled remote-sync ticker sit out of `select!` without a
/// separate branch per config state.
async fn tick_or_pending(ticker: Option<&mut tokio::time::Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn run_sync_cycle(state: &DaemonState, beads_dir: &Path) -> Result<()> {
    let report = beads_sync::run_sync_cycle(state.store.as_ref(), beads_dir, &state.actor)?;
    debug!(?report, "sync cycle complete");
    state.routes.rebuild(state.store.as_ref())?;
    Ok(())
}

fn run_housekeeping(state: &DaemonState) -> Result<()> {
    // Stale-lock reaping is handled by the lock manager's own timeout logic
    // on next acquisition; this tick exists to keep the route cache fresh
    // even when no sync cycle has run recently.
    state.routes.rebuild(state.store.as_ref())?;
    Ok(())
}

async fn handle_connection(
    stream: UnixStream,
    state: Arc<DaemonState>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            req = read_request(&mut reader) => req?,
        };
        let Some(request) = request else {
            return Ok(());
        };

        if request.method == "WatchEvents" {
            let mut events = state.subscribe_events();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    event = events.recv() => {
                        match event {
                            Ok(event) => {
                                let response = Response::ok(
                                    serde_json::to_value(&event).expect("Event serializes"),
                                );
                                write_response(&mut write_half, &response).await?;
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
                        }
                    }
                }
            }
        }

        let deadline = request
            .deadline_ms
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(30));
        let response = match tokio::time::timeout(
            deadline,
            rpc::dispatch(&state, &request.method, request.args),
        )
        .await
        {
            Ok(Ok(data)) => Response::ok(data),
            Ok(Err(err)) => Response::err(err.to_string()),
            Err(_) => Response::err(DaemonError::DeadlineExceeded.to_string()),
        };
        write_response(&mut write_half, &response).await?;
    }
}
