//! Sector allocation table (GCF only)
//!
//! A flat array mapping each sector to the next sector of the same run.
//! A run ends at the terminator, which is `0xFFFF` or `0xFFFFFFFF`
//! depending on the header's `is_long_terminator` flag.

use std::io::{Cursor, Read, Seek};

use binrw::{BinRead, BinWrite};

use super::error::{CacheError, CacheResult, ParseStage};
use super::header::CacheHeader;
use super::{read_section, read_u32_array};
use crate::SteamFormat;

/// Terminator when `is_long_terminator` is 0
pub const SHORT_TERMINATOR: u32 = 0xFFFF;
/// Terminator when `is_long_terminator` is 1
pub const LONG_TERMINATOR: u32 = 0xFFFF_FFFF;

/// Sector table header (12 bytes plus a 4-byte checksum)
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct SectorTableHeader {
    /// Number of entries; must equal the header's sector count
    pub sector_count: u32,
    /// First entry not in use
    pub first_unused_entry: u32,
    /// 1 when runs end with `0xFFFFFFFF`, otherwise `0xFFFF`
    pub is_long_terminator: u32,
    /// Wrapping sum of the three preceding fields
    pub checksum: u32,
}

impl SectorTableHeader {
    /// Serialized size including the checksum
    pub const SIZE: usize = 16;

    /// Wrapping sum of the header fields
    pub fn compute_checksum(&self) -> u32 {
        self.sector_count
            .wrapping_add(self.first_unused_entry)
            .wrapping_add(self.is_long_terminator)
    }
}

/// Parsed sector allocation table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorTable {
    /// Table header
    pub header: SectorTableHeader,
    /// Next-sector link per sector
    pub entries: Vec<u32>,
}

impl SectorTable {
    /// Build a table around entries, filling in the header and checksum
    pub fn new(entries: Vec<u32>, long_terminator: bool) -> Self {
        let mut header = SectorTableHeader {
            sector_count: entries.len() as u32,
            first_unused_entry: entries.len() as u32,
            is_long_terminator: u32::from(long_terminator),
            checksum: 0,
        };
        header.checksum = header.compute_checksum();
        Self { header, entries }
    }

    /// Read the header and `sector_count` entries
    pub fn read<R: Read + Seek>(reader: &mut R) -> CacheResult<Self> {
        let header: SectorTableHeader = read_section(reader, ParseStage::SectorTable)?;
        let entries = read_u32_array(reader, header.sector_count, ParseStage::SectorTable)?;
        Ok(Self { header, entries })
    }

    /// Validate the entry count and checksum
    ///
    /// Unlike the block table, a checksum mismatch here is fatal.
    pub fn validate(&self, container: &CacheHeader) -> CacheResult<()> {
        let stage = ParseStage::SectorTable;
        if self.header.sector_count != container.sector_count {
            return Err(CacheError::mismatch(
                stage,
                "sector_count",
                container.sector_count,
                self.header.sector_count,
            ));
        }

        let computed = self.header.compute_checksum();
        if self.header.checksum != computed {
            return Err(CacheError::mismatch(
                stage,
                "checksum",
                computed,
                self.header.checksum,
            ));
        }
        Ok(())
    }

    /// Value marking the end of a run
    pub fn terminator(&self) -> u32 {
        if self.header.is_long_terminator == 1 {
            LONG_TERMINATOR
        } else {
            SHORT_TERMINATOR
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Link stored for `sector`, or `None` past the end of the table
    pub fn get(&self, sector: u32) -> Option<u32> {
        self.entries.get(sector as usize).copied()
    }

    /// Sectors of the run starting at `first`, in logical order
    ///
    /// Fails when the run leaves the table or loops back on itself.
    pub fn chain(&self, first: u32) -> CacheResult<Vec<u32>> {
        let terminator = self.terminator();
        let mut chain = Vec::new();
        let mut current = first;

        while current != terminator {
            let Some(next) = self.get(current) else {
                return Err(CacheError::mismatch(
                    ParseStage::SectorTable,
                    "sector_index",
                    format!("below {}", self.entries.len()),
                    current,
                ));
            };
            if chain.len() >= self.entries.len() {
                return Err(CacheError::mismatch(
                    ParseStage::SectorTable,
                    "sector_chain",
                    "terminated sector chain",
                    format!("cycle through sector {current}"),
                ));
            }
            chain.push(current);
            current = next;
        }
        Ok(chain)
    }

    /// Whether the run starting at `first` skips over sectors
    ///
    /// A run is contiguous when its first link points at the following
    /// sector, or when it ends immediately.
    pub fn is_fragmented(&self, first: u32) -> bool {
        match self.get(first) {
            Some(next) => next != self.terminator() && next.wrapping_sub(first) != 1,
            None => false,
        }
    }
}

impl SteamFormat for SectorTable {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::read(&mut Cursor::new(data))?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut cursor = Cursor::new(Vec::with_capacity(
            SectorTableHeader::SIZE + self.entries.len() * 4,
        ));
        self.header.write(&mut cursor)?;
        let mut data = cursor.into_inner();
        for entry in &self.entries {
            data.extend_from_slice(&entry.to_le_bytes());
        }
        Ok(data)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::le_words;

    #[test]
    fn test_chain_in_logical_order() {
        // 2 -> 0 -> 1 -> end
        let table = SectorTable::new(vec![1, LONG_TERMINATOR, 0], true);
        assert_eq!(table.chain(2).unwrap(), vec![2, 0, 1]);
        assert_eq!(table.chain(LONG_TERMINATOR).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn test_short_terminator() {
        let table = SectorTable::new(vec![1, SHORT_TERMINATOR], false);
        assert_eq!(table.terminator(), SHORT_TERMINATOR);
        assert_eq!(table.chain(0).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_cycle_is_detected() {
        let table = SectorTable::new(vec![1, 2, 0], true);
        let err = table.chain(0).unwrap_err();
        assert!(err.is_validation_error());
        assert_eq!(err.field(), Some("sector_chain"));
    }

    #[test]
    fn test_out_of_table_link() {
        let table = SectorTable::new(vec![7, LONG_TERMINATOR], true);
        let err = table.chain(0).unwrap_err();
        assert_eq!(err.field(), Some("sector_index"));
    }

    #[test]
    fn test_fragmentation() {
        let table = SectorTable::new(vec![1, LONG_TERMINATOR, 0, LONG_TERMINATOR], true);
        assert!(!table.is_fragmented(0));
        assert!(!table.is_fragmented(1));
        assert!(table.is_fragmented(2));
        assert!(!table.is_fragmented(3));
    }

    #[test]
    fn test_checksum_mismatch_is_fatal() {
        let container = CacheHeader::new_gcf(1, 1, 512, 2);
        let mut table = SectorTable::new(vec![1, LONG_TERMINATOR], true);
        table.validate(&container).unwrap();

        table.header.checksum += 1;
        let err = table.validate(&container).unwrap_err();
        assert_eq!(err.field(), Some("checksum"));
    }

    #[test]
    fn test_count_mismatch() {
        let container = CacheHeader::new_gcf(1, 1, 512, 3);
        let table = SectorTable::new(vec![1, LONG_TERMINATOR], true);
        let err = table.validate(&container).unwrap_err();
        assert_eq!(err.field(), Some("sector_count"));
    }

    #[test]
    fn test_parse_layout() {
        let data = le_words(&[2, 2, 1, 5, 1, LONG_TERMINATOR]);
        let table = <SectorTable as SteamFormat>::parse(&data).unwrap();
        assert_eq!(table.entries, vec![1, LONG_TERMINATOR]);
        assert_eq!(table.header.first_unused_entry, 2);
        SectorTable::verify_round_trip(&data).unwrap();
    }
}
