//! Filesystem watching for the `.beads/` directory.
//!
//! `notify`'s watcher is synchronous and its own background thread does the
//! blocking OS-level polling, so it's spawned via `spawn_blocking` and talks
//! back to the async event loop over an unbounded channel rather than ever
//! touching the single-threaded runtime directly.

use std::path::PathBuf;

use notify::{Event as NotifyEvent, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A coalesced filesystem change relevant to the daemon's event loop.
#[derive(Debug, Clone)]
pub enum WatchSignal {
    /// `issues.jsonl` (or its snapshot companions) changed on disk --
    /// likely a sibling process or a manual edit outside the daemon.
    JsonlChanged,
    /// Something else under `.beads/` changed; routed to housekeeping.
    Other(PathBuf),
}

/// Spawns a blocking-thread filesystem watcher over `beads_dir` and returns
/// the receiving end of its signal channel.
///
/// The returned `JoinHandle` keeps the watcher alive; dropping it (or
/// aborting the handle) stops the watch.
pub fn spawn_watcher(
    beads_dir: PathBuf,
) -> (mpsc::UnboundedReceiver<WatchSignal>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::task::spawn_blocking(move || {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = match notify::recommended_watcher(notify_tx) {
            Ok(w) => w,
            Err(err) => {
                warn!(%err, "failed to create filesystem watcher");
                return;
            }
        };
        if let Err(err) = watcher.watch(&beads_dir, RecursiveMode::NonRecursive) {
            warn!(%err, ?beads_dir, "failed to watch .beads directory");
            return;
        }

        for res in notify_rx {
            let event: NotifyEvent = match res {
                Ok(e) => e,
                Err(err) => {
                    debug!(%err, "watch error");
                    continue;
                }
            };
            for path in event.paths {
                let signal = match path.file_name().and_then(|n| n.to_str()) {
                    Some(name) if name.starts_with("issues.jsonl") => WatchSignal::JsonlChanged,
                    _ => WatchSignal::Other(path),
                };
                if tx.send(signal).is_err() {
                    return; // receiver dropped, event loop is shutting down
                }
            }
        }
    });

    (rx, handle)
}
