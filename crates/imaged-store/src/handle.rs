use std::path::Path;

use imaged_image::{io as codec, ImageMeta, ImageMut, ImageRef, ImageView};
use memmap2::{Mmap, MmapMut};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::lock::{HandleId, Lease};
use crate::record::{self, Commit};
use crate::store::Store;

/// Samples behind a handle.
enum Buffer {
    /// Copy-on-write mapping, written back on release.
    Private { map: MmapMut, offset: usize },
    /// Read-only mapping of a committed record.
    Mapped { map: Mmap, offset: usize },
}

impl Buffer {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::Private { map, offset } => &map[*offset..],
            Self::Mapped { map, offset } => &map[*offset..],
        }
    }
}

/// Access to one stored entry.
///
/// A locked handle (from [`Store::create`] or [`Store::get`] with
/// `require_lock`) owns the key's exclusive lock and a private,
/// copy-on-write mapping of the samples: only the pages it writes take
/// memory. Changes made through [`view_mut`](Self::view_mut) are written
/// back atomically when the handle is released or dropped.
///
/// An unlocked handle is a read-only snapshot of the record as it was when
/// the handle was opened.
pub struct Handle<'s> {
    store: &'s Store,
    key: String,
    meta: ImageMeta,
    buffer: Buffer,
    lease: Option<Lease<'s>>,
    dirty: bool,
    closed: bool,
}

impl<'s> Handle<'s> {
    pub(crate) fn locked(
        store: &'s Store,
        key: String,
        meta: ImageMeta,
        map: MmapMut,
        offset: usize,
        lease: Lease<'s>,
    ) -> Self {
        Self {
            store,
            key,
            meta,
            buffer: Buffer::Private { map, offset },
            lease: Some(lease),
            dirty: false,
            closed: false,
        }
    }

    pub(crate) fn read_only(store: &'s Store, key: String, meta: ImageMeta, map: Mmap, offset: usize) -> Self {
        Self {
            store,
            key,
            meta,
            buffer: Buffer::Mapped { map, offset },
            lease: None,
            dirty: false,
            closed: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn meta(&self) -> &ImageMeta {
        &self.meta
    }

    /// Whether this handle holds the key's lock and may write.
    pub fn is_locked(&self) -> bool {
        self.lease.is_some()
    }

    /// Lock owner id, for locked handles.
    pub fn owner(&self) -> Option<HandleId> {
        self.lease.as_ref().map(Lease::owner)
    }

    /// Whether unflushed changes are pending.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Borrow the samples.
    pub fn view(&self) -> ImageRef<'_> {
        self.as_image_ref()
    }

    /// Borrow the samples for writing. Marks the handle dirty.
    pub fn view_mut(&mut self) -> StoreResult<ImageMut<'_>> {
        if self.lease.is_none() {
            return Err(StoreError::ReadOnly(self.key.clone()));
        }
        match &mut self.buffer {
            Buffer::Private { map, offset } => {
                self.dirty = true;
                Ok(ImageMut::new(self.meta, &mut map[*offset..])?)
            }
            Buffer::Mapped { .. } => Err(StoreError::ReadOnly(self.key.clone())),
        }
    }

    /// Write pending changes without giving up the lock.
    pub fn flush(&mut self) -> StoreResult<()> {
        if !self.dirty || self.lease.is_none() {
            return Ok(());
        }
        let path = self.store.record_path(&self.key);
        record::write_record(
            &path,
            &self.key,
            &self.meta,
            Some(self.buffer.bytes()),
            self.store.config().sync,
            Commit::Replace,
        )?;
        self.dirty = false;
        debug!(key = %self.key, "entry flushed");
        Ok(())
    }

    /// Flush pending changes and unlock. The lock is released even if the
    /// flush fails.
    pub fn release(mut self) -> StoreResult<()> {
        self.close()
    }

    /// Encode the entry to an image file; format from the extension.
    pub fn export(&self, path: &Path) -> StoreResult<()> {
        codec::encode(&self.view(), path)?;
        debug!(key = %self.key, path = %path.display(), "exported");
        Ok(())
    }

    /// Encode the entry in memory, e.g. `png` or `jpg`.
    pub fn encode(&self, format: &str) -> StoreResult<Vec<u8>> {
        Ok(codec::encode_to_vec(&self.view(), format)?)
    }

    fn close(&mut self) -> StoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.flush();
        self.lease = None;
        result
    }
}

impl ImageView for Handle<'_> {
    fn meta(&self) -> &ImageMeta {
        &self.meta
    }

    fn data(&self) -> &[u8] {
        self.buffer.bytes()
    }
}

impl Drop for Handle<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(key = %self.key, error = %e, "failed to flush entry on drop");
        }
    }
}

impl std::fmt::Debug for Handle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("key", &self.key)
            .field("meta", &self.meta)
            .field("locked", &self.is_locked())
            .field("dirty", &self.dirty)
            .finish()
    }
}
