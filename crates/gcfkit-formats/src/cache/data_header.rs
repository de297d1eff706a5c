//! Sector data header (GCF only)

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use super::error::{CacheError, CacheResult, ParseStage};
use super::header::CacheHeader;
use crate::SteamFormat;

/// Header preceding the sector data (24 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct DataHeader {
    /// Must match the container's application version
    pub application_version: u32,
    /// Must match the container's sector count
    pub sector_count: u32,
    /// Must match the container's sector size
    pub sector_size: u32,
    /// Absolute offset of sector 0
    pub first_sector_offset: u32,
    /// Sectors holding data
    pub sectors_used: u32,
    /// Wrapping sum of the four fields after the application version
    pub checksum: u32,
}

impl DataHeader {
    /// Serialized size
    pub const SIZE: usize = 24;

    /// Create a header matching a container, with a valid checksum
    pub fn for_container(
        container: &CacheHeader,
        first_sector_offset: u32,
        sectors_used: u32,
    ) -> Self {
        let mut header = Self {
            application_version: container.application_version,
            sector_count: container.sector_count,
            sector_size: container.sector_size,
            first_sector_offset,
            sectors_used,
            checksum: 0,
        };
        header.checksum = header.compute_checksum();
        header
    }

    /// Wrapping sum of sector count, sector size, first offset and sectors used
    pub fn compute_checksum(&self) -> u32 {
        self.sector_count
            .wrapping_add(self.sector_size)
            .wrapping_add(self.first_sector_offset)
            .wrapping_add(self.sectors_used)
    }

    /// Validate against the container header
    pub fn validate(&self, container: &CacheHeader) -> CacheResult<()> {
        let stage = ParseStage::SectorDataHeader;
        for (field, expected, actual) in [
            (
                "application_version",
                container.application_version,
                self.application_version,
            ),
            ("sector_count", container.sector_count, self.sector_count),
            ("sector_size", container.sector_size, self.sector_size),
            ("checksum", self.compute_checksum(), self.checksum),
        ] {
            if expected != actual {
                return Err(CacheError::mismatch(stage, field, expected, actual));
            }
        }
        Ok(())
    }

    /// Absolute offset of `sector`
    pub fn sector_offset(&self, sector: u32) -> u64 {
        u64::from(self.first_sector_offset) + u64::from(sector) * u64::from(self.sector_size)
    }
}

impl SteamFormat for DataHeader {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::read(&mut Cursor::new(data))?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut cursor = Cursor::new(Vec::with_capacity(Self::SIZE));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}
