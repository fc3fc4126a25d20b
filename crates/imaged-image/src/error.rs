use thiserror::Error;

/// Errors from pixel buffer operations.
#[derive(Debug, Error)]
pub enum ImageError {
    /// Dimensions, channel count, or sample type are not representable.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Raw data does not match the size implied by the metadata.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// No channel mapping exists for the requested pair.
    #[error("conversion undefined from {from} to {to} channels")]
    ConversionUndefined { from: u8, to: u8 },

    /// The allocator refused a buffer of this many bytes.
    #[error("cannot allocate {0} bytes")]
    AllocationFailed(u64),

    /// The codec could not read the file.
    #[error("decode failed: {0}")]
    DecodeFailed(String),

    /// The codec could not write the file.
    #[error("encode failed: {0}")]
    EncodeFailed(String),

    /// I/O error while reading or writing an image file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for image operations.
pub type ImageResult<T> = Result<T, ImageError>;
