use std::path::PathBuf;

use imaged_image::ImageError;

/// Errors from store, handle, and iterator operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The root path cannot be used as a store.
    #[error("cannot open store at {}: {reason}", path.display())]
    CannotOpenStore { path: PathBuf, reason: String },

    /// `create` on a key that is already present.
    #[error("key already exists: {0}")]
    KeyExists(String),

    /// The key has no entry.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Another handle holds the key's exclusive lock.
    #[error("key is locked: {0}")]
    LockConflict(String),

    /// Dimensions, channel count, sample type, or data length are invalid.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Empty key, or a key longer than the maximum length.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Mutable access through a handle that does not hold the lock.
    #[error("handle for {0} is read-only")]
    ReadOnly(String),

    /// Close requested while handles still hold locks.
    #[error("store is busy: {0} key(s) locked")]
    Busy(usize),

    /// The store has been closed or destroyed.
    #[error("store is closed")]
    Closed,

    /// An entry on disk failed validation.
    #[error("corrupt entry {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Codec or conversion failure.
    #[error(transparent)]
    Image(ImageError),
}

impl From<ImageError> for StoreError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::InvalidMetadata(_)
            | ImageError::SizeMismatch { .. }
            | ImageError::AllocationFailed(_) => {
                Self::InvalidMetadata(err.to_string())
            }
            ImageError::Io(e) => Self::Io(e),
            other => Self::Image(other),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
