//! Error types for cache file operations

use std::fmt;

use thiserror::Error;

/// Cache file operation result type
pub type CacheResult<T> = Result<T, CacheError>;

/// Parse stages, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParseStage {
    /// Fixed 44-byte container header
    Header,
    /// Block allocation table (GCF only)
    BlockTable,
    /// Sector allocation table (GCF only)
    SectorTable,
    /// Manifest and its block map
    Manifest,
    /// Checksum map and signature
    ChecksumMap,
    /// Sector data header (GCF only)
    SectorDataHeader,
    /// In-memory directory tree
    DirectoryBuilt,
}

impl fmt::Display for ParseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Header => "header",
            Self::BlockTable => "block table",
            Self::SectorTable => "sector table",
            Self::Manifest => "manifest",
            Self::ChecksumMap => "checksum map",
            Self::SectorDataHeader => "sector data header",
            Self::DirectoryBuilt => "directory",
        };
        f.write_str(name)
    }
}

/// Broad error classes callers can dispatch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bytes do not parse as the declared structure
    Format,
    /// Well-formed structure with inconsistent fields
    Validation,
    /// Operation not valid for this container
    State,
    /// Stream position outside the file
    OutOfRange,
    /// Path lookup miss
    NotFound,
    /// A declared size exceeds a safety limit
    Resource,
    /// Underlying I/O failure
    Io,
}

/// Error types for cache file operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Section bytes could not be decoded
    #[error("malformed {stage}: {message}")]
    Format {
        /// Stage being parsed
        stage: ParseStage,
        /// What went wrong
        message: String,
    },

    /// A field violates a structural invariant
    #[error("validation failed in {stage}: {field} expected {expected}, got {actual}")]
    Validation {
        /// Stage being validated
        stage: ParseStage,
        /// Name of the offending field
        field: &'static str,
        /// Required value or condition
        expected: String,
        /// Value found
        actual: String,
    },

    /// Operation not supported by this container or handle
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Seek or read outside `[0, size]`
    #[error("position {position} is outside file of {size} bytes")]
    OutOfRange {
        /// Requested position
        position: i128,
        /// Logical file size
        size: u64,
    },

    /// File content is not fully present in the archive
    #[error("content missing at offset {position}: only {available} bytes are stored")]
    Incomplete {
        /// Offset of the first missing byte
        position: u64,
        /// Bytes backed by sectors
        available: u64,
    },

    /// Path lookup miss
    #[error("not found: {0}")]
    NotFound(String),

    /// Declared section size exceeds the safety limit
    #[error("{stage} {field} of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Stage being parsed
        stage: ParseStage,
        /// Name of the size field
        field: &'static str,
        /// Declared size
        size: u64,
        /// Limit
        limit: u64,
    },

    /// Open mode string not understood
    #[error("unsupported open mode: {0:?}")]
    UnsupportedMode(String),

    /// Binary read/write error
    #[error("binary format error: {0}")]
    BinRw(#[from] binrw::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Validation failure for a field that does not match its expected value
    pub fn mismatch(
        stage: ParseStage,
        field: &'static str,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self::Validation {
            stage,
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Format failure with a message
    pub fn format(stage: ParseStage, message: impl Into<String>) -> Self {
        Self::Format {
            stage,
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format { .. } | Self::BinRw(_) => ErrorKind::Format,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::InvalidState(_) | Self::UnsupportedMode(_) => ErrorKind::State,
            Self::OutOfRange { .. } | Self::Incomplete { .. } => ErrorKind::OutOfRange,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::TooLarge { .. } => ErrorKind::Resource,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Stage the error was raised in, for parse errors
    pub fn stage(&self) -> Option<ParseStage> {
        match self {
            Self::Format { stage, .. }
            | Self::Validation { stage, .. }
            | Self::TooLarge { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Field named by a validation error
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } | Self::TooLarge { field, .. } => Some(*field),
            _ => None,
        }
    }

    /// Check if this is a validation error
    pub fn is_validation_error(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Check if this is a format error
    pub fn is_format_error(&self) -> bool {
        self.kind() == ErrorKind::Format
    }

    /// Check if this error leaves the stream usable
    ///
    /// Range and lookup failures only affect the call that raised them.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::OutOfRange | ErrorKind::NotFound)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_stage_and_field() {
        let err = CacheError::mismatch(ParseStage::Header, "sector_count", 0, 4);
        assert_eq!(
            err.to_string(),
            "validation failed in header: sector_count expected 0, got 4"
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.stage(), Some(ParseStage::Header));
        assert_eq!(err.field(), Some("sector_count"));
    }

    #[test]
    fn test_kinds() {
        assert!(CacheError::format(ParseStage::Manifest, "short read").is_format_error());
        assert!(
            CacheError::OutOfRange {
                position: 11,
                size: 10
            }
            .is_recoverable()
        );
        assert_eq!(
            CacheError::NotFound("a\\b".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CacheError::InvalidState("ncf".into()).kind(),
            ErrorKind::State
        );
    }

    #[test]
    fn test_stage_order() {
        assert!(ParseStage::Header < ParseStage::BlockTable);
        assert!(ParseStage::ChecksumMap < ParseStage::SectorDataHeader);
        assert_eq!(ParseStage::SectorDataHeader.to_string(), "sector data header");
    }
}
