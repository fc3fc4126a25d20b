//! Per-key exclusive locks.
//!
//! The in-process table is authoritative for this `Store`. When advisory
//! locks are enabled every held lock is mirrored by `locks/<hex(key)>.lock`,
//! created with `create_new` so that two processes cannot both take it.
//! Cross-process exclusion is best-effort: a crashed process leaves its
//! files behind until [`LockTable::reset`] removes them.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Extension of advisory lock files.
pub const LOCK_EXT: &str = "lock";

/// Identifier of the handle owning a lock.
pub type HandleId = u64;

#[derive(Debug)]
pub(crate) struct LockTable {
    held: Mutex<HashMap<String, HandleId>>,
    next_id: AtomicU64,
    dir: PathBuf,
    advisory: bool,
}

impl LockTable {
    pub(crate) fn new(dir: PathBuf, advisory: bool) -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            dir,
            advisory,
        }
    }

    pub(crate) fn next_handle_id(&self) -> HandleId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Take the lock on `key` for a new handle, or fail immediately.
    pub(crate) fn acquire(&self, key: &str) -> StoreResult<Lease<'_>> {
        let owner = self.next_handle_id();
        let mut held = self.held.lock().expect("lock poisoned");
        if held.contains_key(key) {
            return Err(StoreError::LockConflict(key.to_string()));
        }
        if self.advisory {
            self.create_lock_file(key, owner)?;
        }
        held.insert(key.to_string(), owner);
        debug!(key, owner, "lock acquired");
        Ok(Lease { table: self, key: key.to_string(), owner })
    }

    fn release(&self, key: &str, owner: HandleId) {
        let mut held = self.held.lock().expect("lock poisoned");
        if held.get(key) != Some(&owner) {
            return;
        }
        held.remove(key);
        if self.advisory {
            if let Err(e) = fs::remove_file(self.lock_path(key)) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(key, error = %e, "failed to remove lock file");
                }
            }
        }
        debug!(key, owner, "lock released");
    }

    /// Held by this process, or by another process via its lock file.
    pub(crate) fn is_locked(&self, key: &str) -> bool {
        if self.held.lock().expect("lock poisoned").contains_key(key) {
            return true;
        }
        self.advisory && self.lock_path(key).exists()
    }

    /// Number of locks held by this process.
    pub(crate) fn held_count(&self) -> usize {
        self.held.lock().expect("lock poisoned").len()
    }

    /// Keys locked by this process, sorted.
    pub(crate) fn held_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.held.lock().expect("lock poisoned").keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Lock files present on disk, from any process.
    pub(crate) fn lock_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == LOCK_EXT) {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Remove lock files not held by this process. Returns how many were
    /// removed.
    pub(crate) fn reset(&self) -> io::Result<usize> {
        let held = self.held.lock().expect("lock poisoned");
        let ours: Vec<PathBuf> = held.keys().map(|k| self.lock_path(k)).collect();
        let mut removed = 0;
        for path in self.lock_files()? {
            if ours.contains(&path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        lock_file_path(&self.dir, key)
    }

    fn create_lock_file(&self, key: &str, owner: HandleId) -> StoreResult<()> {
        let path = self.lock_path(key);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::LockConflict(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = writeln!(file, "{} {owner}", std::process::id()) {
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }
        Ok(())
    }
}

pub(crate) fn lock_file_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.{LOCK_EXT}", hex::encode(key.as_bytes())))
}

/// A held lock. Released when dropped.
#[derive(Debug)]
pub(crate) struct Lease<'t> {
    table: &'t LockTable,
    key: String,
    owner: HandleId,
}

impl Lease<'_> {
    pub(crate) fn owner(&self) -> HandleId {
        self.owner
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.table.release(&self.key, self.owner);
    }
}
