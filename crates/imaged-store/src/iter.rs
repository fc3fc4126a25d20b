use imaged_image::{ImageMeta, ImageRef};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::handle::Handle;
use crate::store::Store;

/// Cursor over every entry of a store.
///
/// Keys are snapshotted in ascending order when the iterator is created or
/// [`reset`](Self::reset). Entries removed or damaged since the snapshot are
/// skipped. While positioned, the iterator holds a read-only handle on the
/// current entry, borrowed out through [`current`](Self::current).
///
/// ```ignore
/// let mut it = store.iter()?;
/// while it.next() {
///     let (key, view) = it.current().unwrap();
///     println!("{key}: {}", view.meta());
/// }
/// ```
pub struct Iter<'s> {
    store: &'s Store,
    keys: Vec<String>,
    pos: usize,
    current: Option<Handle<'s>>,
    closed: bool,
}

impl<'s> Iter<'s> {
    pub(crate) fn new(store: &'s Store) -> StoreResult<Self> {
        let keys = store.keys()?;
        Ok(Self { store, keys, pos: 0, current: None, closed: false })
    }

    /// Advance to the next readable entry. Returns `false` at the end.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        self.current = None;
        if self.closed {
            return false;
        }
        while let Some(key) = self.keys.get(self.pos) {
            self.pos += 1;
            match self.store.get(key, false) {
                Ok(handle) => {
                    self.current = Some(handle);
                    return true;
                }
                Err(StoreError::KeyNotFound(_)) => debug!(key, "entry vanished since snapshot"),
                Err(e) => warn!(key, error = %e, "skipping unreadable entry"),
            }
        }
        false
    }

    /// Advance to the next key that still exists, without opening it.
    pub fn next_key(&mut self) -> Option<&str> {
        self.current = None;
        if self.closed {
            return None;
        }
        while self.pos < self.keys.len() {
            self.pos += 1;
            if self.store.contains(&self.keys[self.pos - 1]) {
                return Some(&self.keys[self.pos - 1]);
            }
        }
        None
    }

    /// Key and view of the entry under the cursor.
    pub fn current(&self) -> Option<(&str, ImageRef<'_>)> {
        self.current.as_ref().map(|h| (h.key(), h.view()))
    }

    pub fn current_meta(&self) -> Option<&ImageMeta> {
        self.current.as_ref().map(Handle::meta)
    }

    /// Keys in the snapshot not yet visited.
    pub fn remaining(&self) -> usize {
        self.keys.len().saturating_sub(self.pos)
    }

    /// Rewind and take a fresh snapshot of the keys. Reopens a closed
    /// iterator.
    pub fn reset(&mut self) -> StoreResult<()> {
        self.current = None;
        self.keys = self.store.keys()?;
        self.pos = 0;
        self.closed = false;
        Ok(())
    }

    /// Drop the current entry and the snapshot. Idempotent.
    pub fn close(&mut self) {
        self.current = None;
        self.keys.clear();
        self.pos = 0;
        self.closed = true;
    }
}

impl std::fmt::Debug for Iter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iter")
            .field("pos", &self.pos)
            .field("len", &self.keys.len())
            .field("current", &self.current.as_ref().map(Handle::key))
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imaged_image::{ImageView, SampleType};
    use std::collections::HashSet;

    fn store_with(keys: &[&str]) -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        for key in keys {
            let meta = ImageMeta::new(2, 2, 3, SampleType::U8);
            store.create(key, meta, None).unwrap().release().unwrap();
        }
        (dir, store)
    }

    #[test]
    fn yields_each_key_once_then_stops() {
        let (_dir, store) = store_with(&["b", "c", "a"]);
        let mut it = store.iter().unwrap();
        let mut seen = Vec::new();
        while it.next() {
            let (key, view) = it.current().unwrap();
            assert_eq!(view.num_bytes(), 12);
            seen.push(key.to_string());
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert!(!it.next());
        assert!(it.current().is_none());
    }

    #[test]
    fn skips_entries_removed_after_snapshot() {
        let (_dir, store) = store_with(&["a", "b", "c"]);
        let mut it = store.iter().unwrap();
        store.remove("b").unwrap();

        let mut seen = HashSet::new();
        while it.next() {
            seen.insert(it.current().unwrap().0.to_string());
        }
        assert_eq!(seen, HashSet::from(["a".to_string(), "c".to_string()]));
    }

    #[test]
    fn skips_corrupt_entries() {
        let (_dir, store) = store_with(&["a", "b"]);
        std::fs::write(store.record_path("a"), b"broken").unwrap();
        let mut it = store.iter().unwrap();
        assert!(it.next());
        assert_eq!(it.current().unwrap().0, "b");
        assert!(!it.next());
    }

    #[test]
    fn does_not_take_locks() {
        let (_dir, store) = store_with(&["a"]);
        let held = store.get("a", true).unwrap();
        let mut it = store.iter().unwrap();
        assert!(it.next());
        assert_eq!(it.current_meta().unwrap().width, 2);
        drop(held);
    }

    #[test]
    fn next_key_and_reset() {
        let (_dir, store) = store_with(&["a", "b"]);
        let mut it = store.iter().unwrap();
        assert_eq!(it.next_key(), Some("a"));
        assert!(it.current().is_none());
        assert_eq!(it.remaining(), 1);

        store.create("c", ImageMeta::new(1, 1, 1, SampleType::U8), None).unwrap().release().unwrap();
        assert_eq!(it.next_key(), Some("b"));
        assert_eq!(it.next_key(), None);

        it.reset().unwrap();
        let mut count = 0;
        while it.next() {
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn close_is_idempotent() {
        let (_dir, store) = store_with(&["a"]);
        let mut it = store.iter().unwrap();
        assert!(it.next());
        it.close();
        it.close();
        assert!(it.current().is_none());
        assert!(!it.next());
        assert_eq!(it.next_key(), None);
    }
}
