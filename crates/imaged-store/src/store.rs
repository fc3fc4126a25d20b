use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use imaged_image::{io as codec, Color, ImageMeta, ImageView, SampleType};
use memmap2::{Mmap, MmapMut, MmapOptions};
use tracing::{debug, info, warn};

use crate::config::{StoreConfig, SyncMode};
use crate::error::{StoreError, StoreResult};
use crate::handle::Handle;
use crate::iter::Iter;
use crate::lock::LockTable;
use crate::record::{
    self, decode_record, key_from_file_name, record_file_name, Commit, RecordHeader, MAX_KEY_LEN,
    RECORD_EXT, TEMP_EXT,
};

/// Name of the marker file identifying a store root.
pub const MARKER_FILE: &str = "IMAGED";

/// Layout version written to the marker.
pub const LAYOUT_VERSION: u32 = 1;

const MARKER_PREFIX: &str = "imaged-store v";
const ENTRIES_DIR: &str = "entries";
const LOCKS_DIR: &str = "locks";

/// Temp files younger than this are left alone on open unless their writer
/// is known to be gone.
const TEMP_GRACE: Duration = Duration::from_secs(60 * 60);

/// A file-backed mapping from keys to images.
///
/// All methods take `&self`; the store can be shared between threads.
/// Handles and iterators borrow the store, so it cannot be dropped while
/// any of them is alive.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    entries: PathBuf,
    config: StoreConfig,
    locks: LockTable,
    closed: AtomicBool,
}

impl Store {
    /// Open or create a store at `root` with the default configuration.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(root, StoreConfig::default())
    }

    pub fn open_with(root: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        prepare_root(&root).map_err(|reason| StoreError::CannotOpenStore {
            path: root.clone(),
            reason,
        })?;

        let entries = root.join(ENTRIES_DIR);
        let locks_dir = root.join(LOCKS_DIR);
        fs::create_dir_all(&entries)?;
        fs::create_dir_all(&locks_dir)?;

        let store = Self {
            locks: LockTable::new(locks_dir, config.advisory_locks),
            root,
            entries,
            config,
            closed: AtomicBool::new(false),
        };
        let valid = store.scan()?;
        info!(root = %store.root.display(), entries = valid, "store opened");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Create an entry and return a locked handle on it.
    ///
    /// The record is zero-filled unless `data` is given, in which case its
    /// length must equal `meta.num_bytes()`. Entries larger than
    /// [`StoreConfig::max_entry_bytes`] are rejected as invalid metadata.
    pub fn create(&self, key: &str, meta: ImageMeta, data: Option<&[u8]>) -> StoreResult<Handle<'_>> {
        self.ensure_open()?;
        validate_key(key)?;
        meta.validate()?;
        if meta.num_bytes() > self.config.max_entry_bytes {
            return Err(StoreError::InvalidMetadata(format!(
                "{meta} needs {} bytes, limit is {}",
                meta.num_bytes(),
                self.config.max_entry_bytes
            )));
        }
        if let Some(data) = data {
            if data.len() as u64 != meta.num_bytes() {
                return Err(StoreError::InvalidMetadata(format!(
                    "{meta} needs {} bytes, got {}",
                    meta.num_bytes(),
                    data.len()
                )));
            }
        }

        let lease = self.locks.acquire(key)?;
        let path = self.record_path(key);
        if path.exists() {
            return Err(StoreError::KeyExists(key.to_string()));
        }
        record::write_record(&path, key, &meta, data, self.config.sync, Commit::CreateNew).map_err(
            |e| match e.kind() {
                io::ErrorKind::AlreadyExists => StoreError::KeyExists(key.to_string()),
                _ => StoreError::Io(e),
            },
        )?;
        let (map, header) = match self.map_record_private(key) {
            Ok(mapped) => mapped,
            Err(e) => {
                let _ = fs::remove_file(&path);
                return Err(e);
            }
        };
        debug!(key, %meta, "entry created");
        Ok(Handle::locked(self, header.key, header.meta, map, header.data_offset, lease))
    }

    /// Open an existing entry.
    ///
    /// With `require_lock` the handle owns the key's lock and may write;
    /// the call fails with `LockConflict` at once if the lock is held. Without
    /// it the handle is a read-only snapshot of the last released version.
    pub fn get(&self, key: &str, require_lock: bool) -> StoreResult<Handle<'_>> {
        self.ensure_open()?;
        validate_key(key)?;
        if require_lock {
            let lease = self.locks.acquire(key)?;
            let (map, header) = self.map_record_private(key)?;
            Ok(Handle::locked(self, header.key, header.meta, map, header.data_offset, lease))
        } else {
            let (map, header) = self.map_record(key)?;
            Ok(Handle::read_only(self, header.key, header.meta, map, header.data_offset))
        }
    }

    /// Delete an entry. Fails with `LockConflict` while a handle holds it.
    pub fn remove(&self, key: &str) -> StoreResult<()> {
        self.ensure_open()?;
        validate_key(key)?;
        let _lease = self.locks.acquire(key)?;
        let path = self.record_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                if self.config.sync == SyncMode::EveryWrite {
                    record::sync_parent(&path)?;
                }
                debug!(key, "entry removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::KeyNotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `key` is locked by this process or, with advisory locks, by
    /// another one.
    pub fn is_locked(&self, key: &str) -> bool {
        self.locks.is_locked(key)
    }

    /// Number of keys locked by handles of this store.
    pub fn locked_count(&self) -> usize {
        self.locks.held_count()
    }

    /// Whether `key` has a record that passes validation.
    pub fn is_valid_entry(&self, key: &str) -> bool {
        !self.is_closed() && validate_key(key).is_ok() && self.map_record(key).is_ok()
    }

    /// Whether `key` has a record, valid or not.
    pub fn contains(&self, key: &str) -> bool {
        !self.is_closed() && validate_key(key).is_ok() && self.record_path(key).exists()
    }

    /// All keys in ascending order.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.entries)? {
            let entry = entry?;
            if let Some(key) = entry.file_name().to_str().and_then(key_from_file_name) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.keys()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Iterate over every entry in key order, as of now.
    pub fn iter(&self) -> StoreResult<Iter<'_>> {
        Iter::new(self)
    }

    /// Remove lock files left by other processes. Locks held by this store
    /// are kept. Returns how many files were removed.
    pub fn reset_locks(&self) -> StoreResult<usize> {
        self.ensure_open()?;
        let removed = self.locks.reset()?;
        if removed > 0 {
            warn!(removed, "removed stale lock files");
        }
        Ok(removed)
    }

    /// Decode an image file and store it under `key`. `color` and `ty`
    /// select the stored layout; `None` keeps the file's.
    pub fn import(
        &self,
        key: &str,
        path: &Path,
        color: Option<Color>,
        ty: Option<SampleType>,
    ) -> StoreResult<ImageMeta> {
        self.ensure_open()?;
        validate_key(key)?;
        let image = codec::decode(path, color, ty)?;
        let meta = *image.meta();
        self.create(key, meta, Some(image.data()))?.release()?;
        debug!(key, path = %path.display(), %meta, "imported");
        Ok(meta)
    }

    /// Delete every entry and the root directory, then close the store.
    ///
    /// Fails with `LockConflict` if any key is locked, here or by another
    /// process.
    pub fn destroy(&self) -> StoreResult<()> {
        self.ensure_open()?;
        if let Some(key) = self.locks.held_keys().into_iter().next() {
            return Err(StoreError::LockConflict(key));
        }
        if let Some(path) = self.locks.lock_files()?.into_iter().next() {
            let key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| hex::decode(s).ok())
                .and_then(|b| String::from_utf8(b).ok())
                .unwrap_or_else(|| path.display().to_string());
            return Err(StoreError::LockConflict(key));
        }
        fs::remove_dir_all(&self.root)?;
        self.closed.store(true, Ordering::Release);
        info!(root = %self.root.display(), "store destroyed");
        Ok(())
    }

    /// Close the store. Idempotent. Fails with `Busy` while handles hold
    /// locks; afterwards every operation returns `Closed`.
    pub fn close(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        let held = self.locks.held_count();
        if held > 0 {
            return Err(StoreError::Busy(held));
        }
        self.closed.store(true, Ordering::Release);
        debug!(root = %self.root.display(), "store closed");
        Ok(())
    }

    pub(crate) fn record_path(&self, key: &str) -> PathBuf {
        self.entries.join(record_file_name(key))
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Map the committed record for `key` and validate it.
    pub(crate) fn map_record(&self, key: &str) -> StoreResult<(Mmap, RecordHeader)> {
        let file = self.open_record(key)?;
        // SAFETY: committed records are never modified in place. Writers
        // build a temp file and rename it over the path, so this mapping
        // keeps the version that was current when the file was opened.
        let map = unsafe { Mmap::map(&file)? };
        let header = self.check_record(key, &map)?;
        Ok((map, header))
    }

    /// Copy-on-write mapping of the record for a locked handle. Pages are
    /// read lazily and copied only once written; the file is never touched.
    fn map_record_private(&self, key: &str) -> StoreResult<(MmapMut, RecordHeader)> {
        let file = self.open_record(key)?;
        // SAFETY: as in `map_record`. The mapping is private, so writes
        // through it never reach the file.
        let map = unsafe { MmapOptions::new().map_copy(&file)? };
        let header = self.check_record(key, &map)?;
        Ok((map, header))
    }

    fn open_record(&self, key: &str) -> StoreResult<File> {
        let file = match File::open(self.record_path(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::KeyNotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if file.metadata()?.len() == 0 {
            return Err(StoreError::CorruptEntry { key: key.to_string(), reason: "empty record".to_string() });
        }
        Ok(file)
    }

    fn check_record(&self, key: &str, bytes: &[u8]) -> StoreResult<RecordHeader> {
        let corrupt = |reason: String| StoreError::CorruptEntry { key: key.to_string(), reason };
        let header = decode_record(bytes).map_err(corrupt)?;
        if header.key != key {
            return Err(corrupt(format!("record holds key {:?}", header.key)));
        }
        Ok(header)
    }

    /// Count valid records, warn about invalid ones, and delete temp files
    /// left by interrupted writes.
    fn scan(&self) -> StoreResult<usize> {
        let mut valid = 0;
        for entry in fs::read_dir(&self.entries)? {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if path.extension().is_some_and(|ext| ext == TEMP_EXT) {
                if !is_abandoned_temp(&path, name) {
                    debug!(file = name, "keeping temp file of a live writer");
                    continue;
                }
                match fs::remove_file(&path) {
                    Ok(()) => debug!(file = name, "removed stale temp file"),
                    Err(e) => warn!(file = name, error = %e, "failed to remove temp file"),
                }
                continue;
            }
            if !path.extension().is_some_and(|ext| ext == RECORD_EXT) {
                continue;
            }
            let Some(key) = key_from_file_name(name) else {
                warn!(file = name, "skipping record with undecodable name");
                continue;
            };
            match self.map_record(&key) {
                Ok(_) => valid += 1,
                Err(e) => warn!(key, error = %e, "skipping invalid entry"),
            }
        }
        Ok(valid)
    }
}

/// Reject empty and over-long keys.
pub fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("key is empty".to_string()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(StoreError::InvalidKey(format!(
            "key is {} bytes, limit is {MAX_KEY_LEN}",
            key.len()
        )));
    }
    Ok(())
}

/// Whether a temp file was left by an interrupted write: its writer process
/// is gone, or it is older than [`TEMP_GRACE`]. Temp files of this process
/// may belong to another `Store` on the same root and are kept while fresh.
fn is_abandoned_temp(path: &Path, name: &str) -> bool {
    let age = fs::metadata(path).and_then(|m| m.modified()).ok().and_then(|t| t.elapsed().ok());
    if age.is_some_and(|age| age >= TEMP_GRACE) {
        return true;
    }
    match record::temp_owner(name) {
        Some(pid) => pid != std::process::id() && !process_alive(pid),
        None => false,
    }
}

/// Liveness from `/proc`. Without it every process is assumed alive and
/// only the grace period applies.
fn process_alive(pid: u32) -> bool {
    let proc = Path::new("/proc");
    !proc.join("self").exists() || proc.join(pid.to_string()).exists()
}

/// Check or initialise the marker. Errors are reasons for `CannotOpenStore`.
fn prepare_root(root: &Path) -> Result<(), String> {
    let marker = root.join(MARKER_FILE);
    match fs::metadata(root) {
        Ok(meta) if !meta.is_dir() => return Err("path is not a directory".to_string()),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(root).map_err(|e| e.to_string())?;
        }
        Err(e) => return Err(e.to_string()),
    }

    match fs::read_to_string(&marker) {
        Ok(contents) => {
            let version = contents
                .trim()
                .strip_prefix(MARKER_PREFIX)
                .and_then(|v| v.parse::<u32>().ok())
                .ok_or_else(|| format!("unrecognised marker {:?}", contents.trim()))?;
            if version != LAYOUT_VERSION {
                return Err(format!(
                    "unsupported layout version {version}, expected {LAYOUT_VERSION}"
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let mut children = fs::read_dir(root).map_err(|e| e.to_string())?;
            if children.next().is_some() {
                return Err("directory is not empty and has no store marker".to_string());
            }
            fs::write(&marker, format!("{MARKER_PREFIX}{LAYOUT_VERSION}\n")).map_err(|e| e.to_string())
        }
        Err(e) => Err(e.to_string()),
    }
}
