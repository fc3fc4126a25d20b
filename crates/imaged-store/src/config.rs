use serde::{Deserialize, Serialize};

/// Largest entry accepted by default: 64 GiB of samples.
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 1 << 36;

/// Flush strategy for record writes.
///
/// Records are always replaced through a temp file, so a crash never leaves
/// a half-written record in place either way. `OsDefault` may lose the most
/// recent writes, or a recent create or remove, if the machine goes down
/// before the page cache is written back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` every record and its directory before the write returns.
    EveryWrite,
    /// Rely on OS page-cache buffering.
    OsDefault,
}

impl Default for SyncMode {
    fn default() -> Self {
        Self::OsDefault
    }
}

/// Store behaviour knobs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub sync: SyncMode,
    /// Mirror every in-process lock with a lock file under `locks/`, so that
    /// other processes opening the same root see it.
    pub advisory_locks: bool,
    /// Largest sample buffer `create` accepts, in bytes.
    pub max_entry_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync: SyncMode::default(),
            advisory_locks: true,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
        }
    }
}
