//! Parsers and builders for Steam cache archives and blob trees
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Intentional for binary operations
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::doc_markdown)] // Format terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
#![allow(clippy::cast_precision_loss)] // Completeness ratios
#![allow(clippy::return_self_not_must_use)] // Builder patterns
#![allow(clippy::use_self)] // Type clarity
//! This crate reads the two container formats of the Steam content client:
//!
//! - **Blob**: a self-describing nested key/value tree, optionally zlib
//!   compressed, used for catalog records. Decoding and encoding are both
//!   supported.
//! - **Cache files** (GCF and NCF): archives holding a directory manifest
//!   and, for GCF, sector-addressed file content spread over a block table
//!   and a sector allocation table. Cache files are read-only.
//!
//! # Design Principles
//!
//! - **Atomic parsing**: a cache file either parses and validates completely
//!   or fails with an error naming the stage and field
//! - **Arena structures**: directory nodes, blocks and sectors are addressed
//!   by index, matching the on-disk linkage
//! - **Explicit variants**: blob values are either raw bytes or a nested
//!   tree, decided by a pure [`blob::classify`] function
//! - **Injected observation**: advisories go to a caller-provided
//!   [`cache::ParseObserver`], defaulting to `tracing`

#![warn(missing_docs)]

/// Blob nested key/value tree codec
///
/// See the [`blob`] module for the wire layout and lookup conventions.
/// [`blob::Registry`] reads the client registry blob into typed keys and
/// values.
pub mod blob;
/// GCF/NCF cache archive parser
///
/// This module validates every section of a cache file and exposes the
/// directory tree with random-access file streams.
///
/// Key features:
/// - **Staged validation**: header, block table, sector table, manifest,
///   checksum map and sector-data header are checked in order
/// - **Sector chains**: files are resolved to their logical sector order,
///   with cycle detection
/// - **Streams**: [`cache::SectorStream`] implements `Read` and `Seek`
/// - **Extraction**: filtered, report-based extraction to disk
/// - **Content verification**: per-chunk checksums from the checksum map
pub mod cache;

// Test utilities module
#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
pub(crate) mod test_utils;

/// Common format trait implemented by self-contained sections
pub trait SteamFormat: Sized {
    /// Parse from bytes
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>>;

    /// Build to bytes
    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>>;

    /// Verify round-trip correctness
    fn verify_round_trip(data: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
        let parsed = Self::parse(data)?;
        let rebuilt = parsed.build()?;
        if data != rebuilt.as_slice() {
            return Err("Round-trip verification failed".into());
        }
        Ok(())
    }
}
