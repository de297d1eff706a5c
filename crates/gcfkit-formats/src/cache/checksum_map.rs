//! Checksum map and signature
//!
//! Each file with checksums owns a run of entries in a flat checksum
//! array. A file's manifest entry names its run through `checksum_index`,
//! and each checksum covers one `CHECKSUM_CHUNK_SIZE` chunk of content.

use std::io::{Cursor, Read, Seek};

use binrw::{BinRead, BinWrite};

use super::error::{CacheResult, ParseStage};
use super::{read_bytes, read_section, read_u32_array};
use crate::SteamFormat;

/// Size of the trailing signature
pub const SIGNATURE_SIZE: usize = 128;
/// Bytes of content covered by one checksum
pub const CHECKSUM_CHUNK_SIZE: usize = 0x8000;
/// Map is signed
pub const CHECKSUM_FLAG_IS_SIGNED: u32 = 0x0000_0001;

/// Checksum map header (24 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct ChecksumMapHeader {
    /// Header version
    pub header_version: u32,
    /// Bytes following this field up to the end of the signature
    pub checksum_size: u32,
    /// Format flags (see `CHECKSUM_FLAG_IS_SIGNED`)
    pub format_code: u32,
    /// Map version
    pub version: u32,
    /// Number of (count, first index) entries
    pub file_id_count: u32,
    /// Number of checksums
    pub checksum_count: u32,
}

/// Run of checksums owned by one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct ChecksumEntry {
    /// Number of checksums in the run
    pub count: u32,
    /// Index of the first checksum
    pub first_index: u32,
}

/// Parsed checksum map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumMap {
    /// Map header
    pub header: ChecksumMapHeader,
    /// One run per checksum index
    pub entries: Vec<ChecksumEntry>,
    /// Flat checksum array
    pub checksums: Vec<u32>,
    /// Signature over the map
    pub signature: Vec<u8>,
}

impl ChecksumMap {
    /// Build a map from per-file checksum lists; run `i` belongs to checksum index `i`
    pub fn from_files(files: &[Vec<u32>]) -> Self {
        let mut entries = Vec::with_capacity(files.len());
        let mut checksums = Vec::new();
        for file in files {
            entries.push(ChecksumEntry {
                count: file.len() as u32,
                first_index: checksums.len() as u32,
            });
            checksums.extend_from_slice(file);
        }

        let checksum_size = 16 + entries.len() * 8 + checksums.len() * 4 + SIGNATURE_SIZE;
        Self {
            header: ChecksumMapHeader {
                header_version: 1,
                checksum_size: checksum_size as u32,
                format_code: 0x1489_3721,
                version: 1,
                file_id_count: entries.len() as u32,
                checksum_count: checksums.len() as u32,
            },
            entries,
            checksums,
            signature: vec![0; SIGNATURE_SIZE],
        }
    }

    /// Read the header, entries, checksums and signature
    pub fn read<R: Read + Seek>(reader: &mut R) -> CacheResult<Self> {
        let stage = ParseStage::ChecksumMap;
        let header: ChecksumMapHeader = read_section(reader, stage)?;

        let pairs = read_u32_array(reader, header.file_id_count.saturating_mul(2), stage)?;
        let entries = pairs
            .chunks_exact(2)
            .map(|pair| ChecksumEntry {
                count: pair[0],
                first_index: pair[1],
            })
            .collect();
        let checksums = read_u32_array(reader, header.checksum_count, stage)?;
        let signature = read_bytes(reader, SIGNATURE_SIZE as u64, stage)?;

        Ok(Self {
            header,
            entries,
            checksums,
            signature,
        })
    }

    /// Whether the signed flag is set
    pub fn is_signed(&self) -> bool {
        self.header.format_code & CHECKSUM_FLAG_IS_SIGNED != 0
    }

    /// Checksums of the run at `checksum_index`
    ///
    /// Returns `None` for unknown indices and for runs that reach past the
    /// checksum array.
    pub fn checksums_for(&self, checksum_index: u32) -> Option<&[u32]> {
        let entry = self.entries.get(checksum_index as usize)?;
        let start = entry.first_index as usize;
        let end = start.checked_add(entry.count as usize)?;
        self.checksums.get(start..end)
    }

    /// Number of runs reaching past the checksum array
    pub fn dangling_entries(&self) -> usize {
        (0..self.entries.len() as u32)
            .filter(|&i| self.checksums_for(i).is_none())
            .count()
    }
}

/// Checksum of one content chunk: Adler-32 (seed 0) XOR CRC-32
pub fn chunk_checksum(chunk: &[u8]) -> u32 {
    let mut adler = adler2::Adler32::from_checksum(0);
    adler.write_slice(chunk);
    adler.checksum() ^ crc32fast::hash(chunk)
}

impl SteamFormat for ChecksumMap {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::read(&mut Cursor::new(data))?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut cursor = Cursor::new(Vec::new());
        self.header.write(&mut cursor)?;
        for entry in &self.entries {
            entry.write(&mut cursor)?;
        }
        let mut data = cursor.into_inner();
        data.extend(self.checksums.iter().flat_map(|c| c.to_le_bytes()));
        data.extend_from_slice(&self.signature);
        Ok(data)
    }
}
