//! Daemon error types.

use thiserror::Error;

/// Errors that can occur inside the daemon's event loop or its RPC handlers.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Storage(#[from] beads_storage::error::StorageError),

    #[error(transparent)]
    Sync(#[from] beads_sync::SyncError),

    #[error(transparent)]
    Git(#[from] beads_git::vc::VcError),

    #[error(transparent)]
    Lock(#[from] beads_lockfile::LockError),

    #[error("io error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("unknown RPC method: {0}")]
    UnknownMethod(String),

    #[error("request canceled")]
    Canceled,

    #[error("request exceeded its deadline")]
    DeadlineExceeded,

    #[error("another daemon is already running for this workspace")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, DaemonError>;
