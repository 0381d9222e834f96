//! Daemon-process-local state: the shared store handle, the dirty flag that
//! drives the auto-commit ticker, and the C10 route cache.
//!
//! This is deliberately a single struct owned by the event loop rather than
//! a process-wide global -- every beads workspace gets its own daemon
//! process, so there is never more than one of these alive per process, but
//! keeping it instance-scoped rather than `static` keeps tests free of
//! shared mutable state between cases.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};

use beads_core::comment::Event;
use beads_storage::{RouteTable, Storage};

/// Shared daemon state, cheaply cloneable via the `Arc` it's normally held
/// behind.
pub struct DaemonState {
    pub beads_dir: PathBuf,
    pub store: Arc<dyn Storage>,
    pub actor: String,
    pub routes: RouteTable,
    /// Set on any write RPC; cleared by the auto-commit ticker once it has
    /// run a sync cycle. Read by the ticker to skip cycles with nothing new.
    dirty: AtomicBool,
    last_activity: Mutex<DateTime<Utc>>,
    /// Broadcasts newly observed events to `WatchEvents` subscribers.
    pub events: broadcast::Sender<Event>,
}

impl DaemonState {
    pub fn new(beads_dir: PathBuf, store: Arc<dyn Storage>, actor: String) -> Self {
        let (events, _rx) = broadcast::channel(1024);
        Self {
            beads_dir,
            store,
            actor,
            routes: RouteTable::new(),
            dirty: AtomicBool::new(false),
            last_activity: Mutex::new(Utc::now()),
            events,
        }
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Clears the dirty flag and returns whether it was set, so the ticker
    /// can decide whether this cycle has anything to do.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    pub async fn touch(&self) {
        *self.last_activity.lock().await = Utc::now();
    }

    pub async fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock().await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}
