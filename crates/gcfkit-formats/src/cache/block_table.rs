//! Block allocation table (GCF only)
//!
//! Every file's content is described by a chain of blocks. A block names
//! the first sector of a run of content and links to the next and previous
//! block of the same file. A link index outside the table means "none".

use std::io::{Cursor, Read, Seek};

use binrw::{BinRead, BinWrite};

use super::error::{CacheError, CacheResult, ParseStage};
use super::header::CacheHeader;
use super::read_section;
use crate::SteamFormat;

/// Block carries file data
pub const BLOCK_FLAG_DATA: u16 = 0x8000;
/// Block carries file data (alternate encoding)
pub const BLOCK_FLAG_DATA_2: u16 = 0xC000;
/// Block is allocated but holds no data
pub const BLOCK_FLAG_NO_DATA: u16 = 0x0000;

/// Block table header (28 bytes plus a 4-byte checksum)
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct BlockTableHeader {
    /// Number of entries; must equal the header's sector count
    pub block_count: u32,
    /// Entries in use
    pub blocks_used: u32,
    /// Index of the last entry in use
    pub last_block_used: u32,
    /// Reserved
    pub dummy: [u32; 4],
    /// Wrapping sum of the seven preceding fields
    pub checksum: u32,
}

impl BlockTableHeader {
    /// Serialized size including the checksum
    pub const SIZE: usize = 32;

    /// Wrapping sum of the header fields
    pub fn compute_checksum(&self) -> u32 {
        [self.block_count, self.blocks_used, self.last_block_used]
            .into_iter()
            .chain(self.dummy)
            .fold(0u32, u32::wrapping_add)
    }
}

/// Block table entry (28 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct BlockEntry {
    /// Entry flags (see `BLOCK_FLAG_*`)
    pub flags: u16,
    /// Reserved
    pub dummy: u16,
    /// Offset of this run within the file
    pub file_data_offset: u32,
    /// Bytes of file content in this run
    pub file_data_size: u32,
    /// First sector of the run
    pub first_sector_index: u32,
    /// Next block of the same file
    pub next_block_index: u32,
    /// Previous block of the same file
    pub prev_block_index: u32,
    /// Manifest entry owning this block
    pub manifest_index: u32,
}

impl BlockEntry {
    /// Serialized size
    pub const SIZE: usize = 28;

    /// Create a data block with no links; `no_link` is usually the table length
    pub fn data(
        manifest_index: u32,
        file_data_offset: u32,
        file_data_size: u32,
        first_sector_index: u32,
        no_link: u32,
    ) -> Self {
        Self {
            flags: BLOCK_FLAG_DATA,
            dummy: 0,
            file_data_offset,
            file_data_size,
            first_sector_index,
            next_block_index: no_link,
            prev_block_index: no_link,
            manifest_index,
        }
    }

    /// Whether the block holds file data
    pub fn has_data(&self) -> bool {
        self.flags & BLOCK_FLAG_DATA != 0
    }
}

/// Parsed block allocation table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTable {
    /// Table header
    pub header: BlockTableHeader,
    /// Entries in index order
    pub entries: Vec<BlockEntry>,
}

impl BlockTable {
    /// Build a table around entries, filling in the header and checksum
    pub fn new(entries: Vec<BlockEntry>) -> Self {
        let used = entries.iter().filter(|e| e.has_data()).count() as u32;
        let last = entries
            .iter()
            .rposition(BlockEntry::has_data)
            .map_or(0, |i| i as u32);
        let mut header = BlockTableHeader {
            block_count: entries.len() as u32,
            blocks_used: used,
            last_block_used: last,
            dummy: [0; 4],
            checksum: 0,
        };
        header.checksum = header.compute_checksum();
        Self { header, entries }
    }

    /// Read the header and `block_count` entries
    pub fn read<R: Read + Seek>(reader: &mut R) -> CacheResult<Self> {
        let header: BlockTableHeader = read_section(reader, ParseStage::BlockTable)?;
        let mut entries = Vec::with_capacity(header.block_count.min(0x1_0000) as usize);
        for _ in 0..header.block_count {
            entries.push(read_section(reader, ParseStage::BlockTable)?);
        }
        Ok(Self { header, entries })
    }

    /// Validate the table against the container header
    ///
    /// Only the entry count is checked here; see [`Self::checksum_matches`].
    pub fn validate(&self, container: &CacheHeader) -> CacheResult<()> {
        if self.header.block_count != container.sector_count {
            return Err(CacheError::mismatch(
                ParseStage::BlockTable,
                "block_count",
                container.sector_count,
                self.header.block_count,
            ));
        }
        Ok(())
    }

    /// Whether the stored header checksum matches the computed one
    ///
    /// Shipped archives are known to fail this check.
    pub fn checksum_matches(&self) -> bool {
        self.header.checksum == self.header.compute_checksum()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`, or `None` for the "no link" sentinel
    pub fn get(&self, index: u32) -> Option<&BlockEntry> {
        self.entries.get(index as usize)
    }

    /// Indices of a file's blocks, starting from `first`
    ///
    /// Fails when the chain revisits a block.
    pub fn chain(&self, first: u32) -> CacheResult<Vec<u32>> {
        let mut chain = Vec::new();
        let mut current = first;
        while let Some(entry) = self.get(current) {
            if chain.len() >= self.entries.len() {
                return Err(CacheError::mismatch(
                    ParseStage::BlockTable,
                    "next_block_index",
                    "acyclic block chain",
                    format!("cycle through block {current}"),
                ));
            }
            chain.push(current);
            current = entry.next_block_index;
        }
        Ok(chain)
    }
}

impl SteamFormat for BlockTable {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::read(&mut Cursor::new(data))?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut cursor = Cursor::new(Vec::with_capacity(
            BlockTableHeader::SIZE + self.entries.len() * BlockEntry::SIZE,
        ));
        self.header.write(&mut cursor)?;
        for entry in &self.entries {
            entry.write(&mut cursor)?;
        }
        Ok(cursor.into_inner())
    }
}
