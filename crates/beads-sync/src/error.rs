//! Error types for the synchronization engine.

use thiserror::Error;

/// Errors produced by the synchronization engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] beads_storage::error::StorageError),

    #[error(transparent)]
    Git(#[from] beads_git::commands::GitError),

    #[error(transparent)]
    Vc(#[from] beads_git::vc::VcError),

    #[error(transparent)]
    Lock(#[from] beads_lockfile::LockError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;
