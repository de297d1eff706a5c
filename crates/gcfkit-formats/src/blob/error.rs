//! Blob error types

use thiserror::Error;

/// Blob-specific error type
#[derive(Debug, Error)]
pub enum BlobError {
    /// The leading mode tag is neither the plain nor the compressed magic
    #[error("invalid blob magic: 0x{0:04X}")]
    InvalidMagic(u16),

    /// A size field read as signed came out negative
    #[error("negative {field} in blob header: {value}")]
    NegativeSize {
        /// Name of the offending field
        field: &'static str,
        /// Value as read (signed)
        value: i64,
    },

    /// Fewer bytes remain than a size field declares
    #[error("blob truncated at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        /// Offset where the read started
        offset: u64,
        /// Bytes required
        needed: u64,
        /// Bytes actually present
        available: u64,
    },

    /// Nested trees go deeper than the configured limit
    #[error("blob nesting exceeds depth limit of {limit}")]
    DepthLimitExceeded {
        /// Configured maximum depth
        limit: usize,
    },

    /// Compressed payload failed to inflate
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Compression failed while encoding
    #[error("compression failed: {0}")]
    Compression(String),

    /// Accessor used on the wrong value variant
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Variant the caller asked for
        expected: &'static str,
        /// Variant actually present
        found: &'static str,
    },

    /// Raw value has the wrong width for a numeric accessor
    #[error("value has {actual} bytes, {expected} required")]
    InvalidValueSize {
        /// Required width
        expected: usize,
        /// Actual width
        actual: usize,
    },

    /// Key or value too large to encode
    #[error("{field} of {size} bytes does not fit the blob format")]
    TooLarge {
        /// Name of the field
        field: &'static str,
        /// Size in bytes
        size: usize,
    },

    /// Lookup miss
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

impl BlobError {
    /// Check whether this error is a resource limit rather than malformed input
    pub fn is_resource_error(&self) -> bool {
        matches!(self, Self::DepthLimitExceeded { .. })
    }

    /// Check whether this error describes malformed input bytes
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic(_)
                | Self::NegativeSize { .. }
                | Self::Truncated { .. }
                | Self::Decompression(_)
                | Self::BinRw(_)
        )
    }
}

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;
