//! Cache file header

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use super::error::{CacheError, CacheResult, ParseStage};
use crate::SteamFormat;

/// Header version every cache file carries
pub const HEADER_VERSION: u32 = 1;
/// Format version of GCF archives
pub const GCF_FORMAT_VERSION: u32 = 6;
/// Format version of NCF archives
pub const NCF_FORMAT_VERSION: u32 = 1;

/// Container variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheType {
    /// Content stored as sectors inside the archive
    Gcf,
    /// Metadata only; content lives in a directory on disk
    Ncf,
}

impl CacheType {
    /// On-disk discriminant
    pub const fn code(self) -> u32 {
        match self {
            Self::Gcf => 1,
            Self::Ncf => 2,
        }
    }

    /// Format version required for this variant
    pub const fn format_version(self) -> u32 {
        match self {
            Self::Gcf => GCF_FORMAT_VERSION,
            Self::Ncf => NCF_FORMAT_VERSION,
        }
    }
}

impl TryFrom<u32> for CacheType {
    type Error = CacheError;

    fn try_from(value: u32) -> CacheResult<Self> {
        match value {
            1 => Ok(Self::Gcf),
            2 => Ok(Self::Ncf),
            other => Err(CacheError::mismatch(
                ParseStage::Header,
                "cache_type",
                "1 (GCF) or 2 (NCF)",
                other,
            )),
        }
    }
}

/// Cache file header (44 bytes, 11 little-endian u32 fields)
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct CacheHeader {
    /// Header version (always 1)
    pub header_version: u32,
    /// 1 for GCF, 2 for NCF
    pub cache_type: u32,
    /// 6 for GCF, 1 for NCF
    pub format_version: u32,
    /// Application the archive belongs to
    pub application_id: u32,
    /// Application version the archive was built for
    pub application_version: u32,
    /// Non-zero while the client has the archive mounted
    pub is_mounted: u32,
    /// Reserved
    pub dummy: u32,
    /// Total archive size in bytes (GCF only)
    pub file_size: u32,
    /// Bytes per sector (GCF only)
    pub sector_size: u32,
    /// Number of sectors (GCF only)
    pub sector_count: u32,
    /// Byte sum of the preceding 40 bytes
    pub checksum: u32,
}

impl CacheHeader {
    /// Serialized size
    pub const SIZE: usize = 44;

    /// Create a GCF header with a valid checksum
    pub fn new_gcf(
        application_id: u32,
        application_version: u32,
        sector_size: u32,
        sector_count: u32,
    ) -> Self {
        Self {
            header_version: HEADER_VERSION,
            cache_type: CacheType::Gcf.code(),
            format_version: GCF_FORMAT_VERSION,
            application_id,
            application_version,
            is_mounted: 0,
            dummy: 0,
            file_size: 0,
            sector_size,
            sector_count,
            checksum: 0,
        }
        .with_checksum()
    }

    /// Create an NCF header with a valid checksum
    pub fn new_ncf(application_id: u32, application_version: u32) -> Self {
        Self {
            header_version: HEADER_VERSION,
            cache_type: CacheType::Ncf.code(),
            format_version: NCF_FORMAT_VERSION,
            application_id,
            application_version,
            is_mounted: 0,
            dummy: 0,
            file_size: 0,
            sector_size: 0,
            sector_count: 0,
            checksum: 0,
        }
        .with_checksum()
    }

    /// Set the total archive size, refreshing the checksum
    #[must_use]
    pub fn with_file_size(mut self, file_size: u32) -> Self {
        self.file_size = file_size;
        self.with_checksum()
    }

    /// Replace the checksum with the computed value
    #[must_use]
    pub fn with_checksum(mut self) -> Self {
        self.checksum = self.compute_checksum();
        self
    }

    /// Container variant, failing on unknown discriminants
    pub fn cache_type(&self) -> CacheResult<CacheType> {
        CacheType::try_from(self.cache_type)
    }

    /// Unsigned sum of the first 40 serialized bytes
    pub fn compute_checksum(&self) -> u32 {
        [
            self.header_version,
            self.cache_type,
            self.format_version,
            self.application_id,
            self.application_version,
            self.is_mounted,
            self.dummy,
            self.file_size,
            self.sector_size,
            self.sector_count,
        ]
        .iter()
        .flat_map(|field| field.to_le_bytes())
        .map(u32::from)
        .sum()
    }

    /// Validate header invariants
    ///
    /// The mount flag is not checked; shipped archives have it set.
    pub fn validate(&self) -> CacheResult<()> {
        let stage = ParseStage::Header;
        if self.header_version != HEADER_VERSION {
            return Err(CacheError::mismatch(
                stage,
                "header_version",
                HEADER_VERSION,
                self.header_version,
            ));
        }

        let cache_type = self.cache_type()?;
        if self.format_version != cache_type.format_version() {
            return Err(CacheError::mismatch(
                stage,
                "format_version",
                cache_type.format_version(),
                self.format_version,
            ));
        }

        match cache_type {
            CacheType::Ncf => {
                for (field, value) in [
                    ("file_size", self.file_size),
                    ("sector_size", self.sector_size),
                    ("sector_count", self.sector_count),
                ] {
                    if value != 0 {
                        return Err(CacheError::mismatch(stage, field, 0, value));
                    }
                }
            }
            CacheType::Gcf => {
                if self.sector_size == 0 && self.sector_count != 0 {
                    return Err(CacheError::mismatch(stage, "sector_size", "non-zero", 0));
                }
            }
        }

        let computed = self.compute_checksum();
        if self.checksum != computed {
            return Err(CacheError::mismatch(
                stage,
                "checksum",
                computed,
                self.checksum,
            ));
        }

        Ok(())
    }
}

impl SteamFormat for CacheHeader {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::read(&mut Cursor::new(data))?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut cursor = Cursor::new(Vec::with_capacity(Self::SIZE));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}
