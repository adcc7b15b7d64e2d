//! Exclusive run locks.
//!
//! A lock provider hands out at most one guard per scope. A guard releases
//! its lock when dropped, so every exit path of a command releases it.
//!
//! [`FileLockProvider`] works across processes with advisory file locks
//! (flock/LockFileEx):
//!
//! 1. Open or create `<dir>/<scope>.<hash>.lock`
//! 2. Try an exclusive, non-blocking lock on it
//!    a. lock fails: another holder is running
//!    b. lock succeeds: ours, even if the file was left behind by a crash
//! 3. Check the path still names the locked file (a releasing holder may
//!    have unlinked it in between) and retry otherwise
//! 4. Write our PID, for information only
//! 5. On release: delete the file, then close it
//!
//! The kernel drops the lock when the holding process exits, however it
//! exits, so there is no staleness check.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use crate::error::{Error, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Hex characters of the scope hash kept in lock file names.
const HASH_PREFIX_LEN: usize = 12;

/// Times to reopen a lock file that was unlinked while we were locking it.
const MAX_OPEN_ATTEMPTS: usize = 8;

/// Acquire-or-fail-fast lock source.
pub trait LockProvider {
    type Guard;

    /// Try to take the lock for `scope`.
    ///
    /// Returns `Ok(None)` when another holder has it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lock`] when the lock state cannot be determined.
    fn try_acquire(&self, scope: &str) -> Result<Option<Self::Guard>>;
}

/// Cross-process lock backed by advisory locks on files in a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLockProvider {
    dir: PathBuf,
}

impl FileLockProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the lock file used for `scope`.
    #[must_use]
    pub fn lock_path(&self, scope: &str) -> PathBuf {
        self.dir.join(lock_file_name(scope))
    }

    /// PID recorded by the current or last holder of `scope`, if readable.
    #[must_use]
    pub fn holder_pid(&self, scope: &str) -> Option<u32> {
        fs::read_to_string(self.lock_path(scope))
            .ok()
            .and_then(|content| content.trim().parse().ok())
    }

    /// Open the lock file and try to lock it. `None` when contended.
    fn open_locked(path: &Path, scope: &str) -> Result<Option<File>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::lock(scope, format!("cannot open {}: {e}", path.display())))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(file)),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(Error::lock(scope, format!("cannot lock {}: {e}", path.display()))),
        }
    }

    fn write_owner(file: &mut File, path: &Path, scope: &str) -> Result<()> {
        let pid = std::process::id();
        file.set_len(0)
            .and_then(|()| writeln!(file, "{pid}"))
            .and_then(|()| file.flush())
            .map_err(|e| Error::lock(scope, format!("cannot write {}: {e}", path.display())))
    }
}

impl LockProvider for FileLockProvider {
    type Guard = FileLock;

    fn try_acquire(&self, scope: &str) -> Result<Option<FileLock>> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            Error::lock(scope, format!("cannot create lock dir {}: {e}", self.dir.display()))
        })?;

        let path = self.lock_path(scope);
        for _ in 0..MAX_OPEN_ATTEMPTS {
            let Some(mut file) = Self::open_locked(&path, scope)? else {
                debug!(
                    scope,
                    path = %path.display(),
                    holder = ?self.holder_pid(scope),
                    "lock held elsewhere"
                );
                return Ok(None);
            };

            if !names_same_file(&file, &path) {
                debug!(scope, path = %path.display(), "lock file replaced while locking, retrying");
                continue;
            }

            Self::write_owner(&mut file, &path, scope)?;
            debug!(scope, path = %path.display(), pid = std::process::id(), "lock acquired");
            return Ok(Some(FileLock {
                _handle: file,
                path,
                scope: scope.to_string(),
                released: false,
            }));
        }

        Err(Error::lock(scope, "lock file kept being replaced"))
    }
}

/// Held file lock. The advisory lock lives as long as the open file.
#[derive(Debug)]
pub struct FileLock {
    /// Keeps the advisory lock; never read.
    _handle: File,
    path: PathBuf,
    scope: String,
    released: bool,
}

impl FileLock {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Release explicitly, reporting failures that `Drop` would swallow.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lock`] if the lock file cannot be deleted.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove_lock_file(&self.path).map_err(|e| Error::lock(&self.scope, e.to_string()))
    }
}

impl Drop for FileLock {
    // The file is unlinked while still locked; closing it afterwards drops
    // the advisory lock.
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_lock_file(&self.path) {
            warn!(scope = %self.scope, error = %e, "failed to release lock");
        }
    }
}

fn remove_lock_file(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn is_contended(error: &std::io::Error) -> bool {
    error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
        || error.kind() == ErrorKind::WouldBlock
}

/// Whether `path` still names the open `file`.
#[cfg(unix)]
fn names_same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

/// Whether `path` still names the open `file`. Windows refuses to unlink
/// a file another handle has open, so existence is enough.
#[cfg(not(unix))]
fn names_same_file(_file: &File, path: &Path) -> bool {
    path.exists()
}

/// In-process lock, shared between clones of the provider.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockProvider {
    held: Arc<Mutex<HashSet<String>>>,
}

impl InMemoryLockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `scope` is currently held.
    #[must_use]
    pub fn is_held(&self, scope: &str) -> bool {
        self.held.lock().is_ok_and(|held| held.contains(scope))
    }
}

impl LockProvider for InMemoryLockProvider {
    type Guard = MemoryLock;

    fn try_acquire(&self, scope: &str) -> Result<Option<MemoryLock>> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| Error::lock(scope, "lock registry poisoned"))?;

        if !held.insert(scope.to_string()) {
            return Ok(None);
        }

        Ok(Some(MemoryLock {
            scope: scope.to_string(),
            held: Arc::clone(&self.held),
        }))
    }
}

/// Held in-process lock.
#[derive(Debug)]
pub struct MemoryLock {
    scope: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl MemoryLock {
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Release explicitly.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.scope);
        }
    }
}

/// File name for a scope: sanitized scope plus a hash prefix so that
/// scopes differing only in special characters do not collide.
fn lock_file_name(scope: &str) -> String {
    let sanitized: String = scope
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let digest = Sha256::digest(scope.as_bytes());
    let hash = digest.iter().fold(String::new(), |mut acc, byte| {
        let _ = write!(acc, "{byte:02x}");
        acc
    });
    let hash = hash.get(..HASH_PREFIX_LEN).unwrap_or(&hash);

    format!("{sanitized}.{hash}.lock")
}
