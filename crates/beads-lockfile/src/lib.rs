//! Workspace-scoped advisory file locking for the beads system.
//!
//! Three locks are workspace-scoped and advisory (see the core spec, C8):
//! the daemon lock (one daemon per workspace), the sync lock (one three-way
//! sync cycle at a time), and the migration lock (one schema upgrade at a
//! time). All three share the same mechanism: an OS advisory file lock via
//! [`fs2`], with a small JSON blob written alongside for diagnostics. The
//! kernel lock is the source of truth; the JSON contents are informational
//! only, so a crashed holder never leaves the workspace stuck -- closing the
//! file descriptor (including via process death) releases the lock.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default non-blocking acquisition deadline: bounded by a small timeout,
/// configurable via env.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Environment variable overriding [`DEFAULT_TIMEOUT`].
pub const LOCK_TIMEOUT_ENV: &str = "BD_LOCK_TIMEOUT";

/// Errors produced by lock acquisition and release.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock is held by another process.
    #[error("{kind} lock held by {holder}")]
    Locked {
        /// Which of the three locks this is (daemon, sync, migration).
        kind: LockKind,
        /// Best-effort description of the current holder, from the lock
        /// file's informational contents.
        holder: String,
    },

    /// An I/O error occurred opening, locking, or writing the lock file.
    #[error("lock I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The lock file's informational JSON contents could not be serialized.
    #[error("failed to serialize lock info: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result alias for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;

impl LockError {
    /// Returns `true` if this error means "someone else holds the lock",
    /// as opposed to an I/O failure.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

/// Which of the three workspace locks an operation concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// `.beads/daemon.lock` -- held for the daemon's entire lifetime.
    Daemon,
    /// `.beads/.sync.lock` -- held for one three-way sync cycle.
    Sync,
    /// Held while schema migrations apply.
    Migration,
}

impl LockKind {
    /// The lock file name within `.beads/`, relative to the workspace dir.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Daemon => "daemon.lock",
            Self::Sync => ".sync.lock",
            Self::Migration => ".migration.lock",
        }
    }
}

impl std::fmt::Display for LockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Daemon => "daemon",
            Self::Sync => "sync",
            Self::Migration => "migration",
        };
        f.write_str(s)
    }
}

/// Informational contents written to a lock file alongside the OS lock.
///
/// Never consulted for correctness -- the kernel file lock is authoritative.
/// Used only to report a human-readable holder description in
/// [`LockError::Locked`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID of the holder.
    pub pid: u32,
    /// Parent process ID, if known.
    pub parent_pid: Option<u32>,
    /// Path to the database the holder is operating on.
    pub database: Option<String>,
    /// RFC3339 timestamp of when the lock was acquired.
    pub started_at: String,
    /// Version string of the holding process.
    pub version: String,
}

impl LockInfo {
    /// Builds a `LockInfo` describing the current process.
    pub fn current(database: Option<String>) -> Self {
        Self {
            pid: std::process::id(),
            parent_pid: None,
            database,
            started_at: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A held advisory lock. Dropping this releases the OS lock; the holding
/// process exiting unexpectedly (crash, signal) also releases it, since the
/// kernel drops the lock when the file descriptor closes.
pub struct LockGuard {
    kind: LockKind,
    path: PathBuf,
    file: File,
}

impl LockGuard {
    /// Which lock this guard holds.
    pub fn kind(&self) -> LockKind {
        self.kind
    }

    /// Path to the lock file on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Best-effort: an error here just means the kernel will still
        // release the lock when the fd closes after this function returns.
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Reads the best-effort holder description from a lock file's JSON
/// contents. Falls back to a generic description if the file is missing,
/// unreadable, or not valid JSON (e.g. a half-written file from a crash).
fn describe_holder(path: &Path) -> String {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|contents| serde_json::from_str::<LockInfo>(&contents).ok())
        .map(|info| format!("pid {} (started {})", info.pid, info.started_at))
        .unwrap_or_else(|| "unknown process".to_string())
}

/// Manages the three workspace-scoped advisory locks for one `.beads/`
/// directory.
///
/// Every lock, socket, and database path this manager touches is
/// parameterized by the workspace directory passed to [`LockManager::new`];
/// two workspaces never contend with each other, matching §5's
/// no-shared-mutable-globals rule.
pub struct LockManager {
    beads_dir: PathBuf,
    timeout: Duration,
}

impl LockManager {
    /// Creates a lock manager rooted at the given `.beads/` directory.
    ///
    /// The timeout defaults to [`DEFAULT_TIMEOUT`], overridden by the
    /// `BD_LOCK_TIMEOUT` environment variable (seconds, as an integer or
    /// float) if set.
    pub fn new(beads_dir: impl Into<PathBuf>) -> Self {
        let timeout = std::env::var(LOCK_TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .map(Duration::from_secs_f64)
            .unwrap_or(DEFAULT_TIMEOUT);
        Self {
            beads_dir: beads_dir.into(),
            timeout,
        }
    }

    /// Overrides the acquisition timeout (mainly for tests).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn lock_path(&self, kind: LockKind) -> PathBuf {
        self.beads_dir.join(kind.file_name())
    }

    /// Attempts to acquire the given lock without blocking.
    ///
    /// Returns [`LockError::Locked`] immediately if another process holds
    /// it -- this never blocks, matching the "TryLock" semantics in the
    /// spec's C8.
    pub fn try_acquire(&self, kind: LockKind, database: Option<&str>) -> Result<LockGuard> {
        let path = self.lock_path(kind);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                self.write_info(&file, database)?;
                Ok(LockGuard { kind, path, file })
            }
            Err(_) => Err(LockError::Locked {
                kind,
                holder: describe_holder(&path),
            }),
        }
    }

    /// Acquires the given lock, retrying with a short backoff until the
    /// manager's timeout elapses.
    ///
    /// This is the "`AcquireExclusive`" operation: bounded, not indefinite --
    /// a genuinely stuck holder (rather than a momentary race) still
    /// surfaces as [`LockError::Locked`] once the deadline passes.
    pub fn acquire_exclusive(&self, kind: LockKind, database: Option<&str>) -> Result<LockGuard> {
        let deadline = Instant::now() + self.timeout;
        let mut backoff = Duration::from_millis(10);
        loop {
            match self.try_acquire(kind, database) {
                Ok(guard) => return Ok(guard),
                Err(e) if e.is_locked() => {
                    if Instant::now() >= deadline {
                        return Err(e);
                    }
                    std::thread::sleep(backoff.min(deadline.saturating_duration_since(Instant::now())));
                    backoff = (backoff * 2).min(Duration::from_millis(200));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn write_info(&self, file: &File, database: Option<&str>) -> Result<()> {
        let info = LockInfo::current(database.map(str::to_string));
        let json = serde_json::to_string(&info)?;
        let mut file = file;
        file.set_len(0)?;
        use std::io::Seek;
        file.seek(std::io::SeekFrom::Start(0))?;
        file.write_all(json.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LockManager::new(dir.path());
        let guard = mgr.try_acquire(LockKind::Daemon, Some("beads.db")).unwrap();
        assert_eq!(guard.kind(), LockKind::Daemon);
        drop(guard);

        // Released: a second acquisition now succeeds.
        let guard2 = mgr.try_acquire(LockKind::Daemon, None).unwrap();
        drop(guard2);
    }

    #[test]
    fn concurrent_try_acquire_yields_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LockManager::new(dir.path());
        let _first = mgr.try_acquire(LockKind::Daemon, None).unwrap();
        let second = mgr.try_acquire(LockKind::Daemon, None);
        assert!(matches!(second, Err(LockError::Locked { .. })));
    }

    #[test]
    fn locked_error_names_the_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LockManager::new(dir.path());
        let _first = mgr.try_acquire(LockKind::Sync, None).unwrap();
        let err = mgr.try_acquire(LockKind::Sync, None).unwrap_err();
        match err {
            LockError::Locked { kind, .. } => assert_eq!(kind, LockKind::Sync),
            other => panic!("expected Locked, got {other:?}"),
        }
    }

    #[test]
    fn locks_are_independent_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LockManager::new(dir.path());
        let _daemon = mgr.try_acquire(LockKind::Daemon, None).unwrap();
        // Sync lock is a different file -- acquiring it must not contend.
        let sync = mgr.try_acquire(LockKind::Sync, None);
        assert!(sync.is_ok());
    }

    #[test]
    fn locks_are_independent_per_workspace() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let mgr_a = LockManager::new(dir_a.path());
        let mgr_b = LockManager::new(dir_b.path());
        let _a = mgr_a.try_acquire(LockKind::Daemon, None).unwrap();
        let b = mgr_b.try_acquire(LockKind::Daemon, None);
        assert!(b.is_ok());
    }

    #[test]
    fn acquire_exclusive_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LockManager::new(dir.path()).with_timeout(Duration::from_millis(50));
        let _first = mgr.try_acquire(LockKind::Migration, None).unwrap();
        let start = Instant::now();
        let err = mgr.acquire_exclusive(LockKind::Migration, None).unwrap_err();
        assert!(err.is_locked());
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn acquire_exclusive_succeeds_once_released() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LockManager::new(dir.path()).with_timeout(Duration::from_millis(500));
        let first = mgr.try_acquire(LockKind::Migration, None).unwrap();
        let mgr2 = LockManager::new(dir.path()).with_timeout(Duration::from_millis(500));
        let handle = std::thread::spawn(move || mgr2.acquire_exclusive(LockKind::Migration, None));
        std::thread::sleep(Duration::from_millis(50));
        drop(first);
        let result = handle.join().unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn lock_info_roundtrips_through_json() {
        let info = LockInfo::current(Some("beads.db".to_string()));
        let json = serde_json::to_string(&info).unwrap();
        let back: LockInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pid, info.pid);
        assert_eq!(back.database, Some("beads.db".to_string()));
    }
}
