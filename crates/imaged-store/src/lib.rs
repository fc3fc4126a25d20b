//! Embedded, file-backed image store.
//!
//! A [`Store`] maps string keys to images: raw pixel buffers plus their
//! [`ImageMeta`](imaged_image::ImageMeta). Each entry is one record file
//! under the store root; see [`record`] for the format.
//!
//! # Access
//!
//! - [`Store::create`] and [`Store::get`] with `require_lock` return a
//!   locked [`Handle`] that may write; changes are committed when it is
//!   released or dropped.
//! - [`Store::get`] without a lock and [`Store::iter`] return read-only
//!   snapshots that never observe a half-written record.
//!
//! # Design Rules
//!
//! 1. Store calls never wait for a lock. A held key fails with
//!    [`StoreError::LockConflict`] immediately; retrying is up to the caller.
//! 2. Records are replaced, never edited in place: write a temp file, then
//!    link or rename it into position.
//! 3. Locks live in a table owned by the `Store`, mirrored by advisory lock
//!    files for other processes. Cross-process exclusion is best-effort.
//! 4. A failed `create` or `remove` leaves the entry set unchanged.

pub mod config;
pub mod error;
pub mod handle;
pub mod iter;
pub mod lock;
pub mod record;
pub mod store;

// Re-export primary types at crate root for ergonomic imports.
pub use config::{StoreConfig, SyncMode, DEFAULT_MAX_ENTRY_BYTES};
pub use error::{StoreError, StoreResult};
pub use handle::Handle;
pub use iter::Iter;
pub use lock::HandleId;
pub use record::MAX_KEY_LEN;
pub use store::{validate_key, Store, LAYOUT_VERSION, MARKER_FILE};
