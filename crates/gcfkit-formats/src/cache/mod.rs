//! GCF and NCF cache files
//!
//! A cache file is a sequence of sections, each validated before the next
//! is read:
//!
//! ```text
//! header (44 bytes)
//! block table         GCF only
//! sector table        GCF only
//! manifest + block map
//! checksum map + signature
//! sector data header  GCF only
//! sector data         GCF only
//! ```
//!
//! GCF archives store file content in fixed-size sectors. A file owns a
//! chain of blocks, and each block owns a chain of sectors; the sectors
//! can be anywhere in the archive. NCF archives only carry the directory
//! tree, and their content is read from a [`FilesystemMirror`].
//!
//! Parsing is all-or-nothing: [`CacheFile::parse`] either returns a fully
//! validated archive with its directory tree built, or an error naming the
//! stage and field that failed.

pub mod block_table;
pub mod checksum_map;
mod config;
pub mod data_header;
mod directory;
mod error;
mod extract;
pub mod header;
pub mod manifest;
mod mirror;
mod observer;
pub mod sector_table;
mod stream;

pub use block_table::{BlockEntry, BlockTable};
pub use checksum_map::{CHECKSUM_CHUNK_SIZE, ChecksumMap, chunk_checksum};
pub use config::{CacheOptions, DEFAULT_NCF_FOLDER_PATTERN};
pub use data_header::DataHeader;
pub use directory::{
    DirectoryNode, DirectoryTree, FileInfo, NodeId, NodeKind, PATH_SEPARATOR,
};
pub use error::{CacheError, CacheResult, ErrorKind, ParseStage};
pub use extract::{ExtractFailure, ExtractReport, FileFilter};
pub use header::{CacheHeader, CacheType};
pub use manifest::{DirectoryFlags, Manifest, ManifestBuilder};
pub use mirror::{DirectoryMirror, FilesystemMirror, MirrorStat};
pub use observer::{Advisory, CollectingObserver, ParseObserver, TracingObserver};
pub use sector_table::SectorTable;
pub use stream::{FileHandle, OpenMode, SectorStream};

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use binrw::BinRead;
use binrw::meta::ReadEndian;
use tracing::debug;

use manifest::NO_INDEX;

/// Result of checking a file against its stored checksums
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileValidation {
    /// Every chunk matches
    Ok,
    /// The chunk at this index does not match
    Corrupt {
        /// Zero-based chunk index
        chunk: usize,
    },
    /// Part of the content is not stored in the archive
    Incomplete,
    /// The file has no checksums to compare against
    NoChecksums,
}

/// A parsed cache file
pub struct CacheFile<R> {
    reader: R,
    header: CacheHeader,
    cache_type: CacheType,
    block_table: Option<BlockTable>,
    sector_table: Option<SectorTable>,
    manifest: Manifest,
    checksum_map: ChecksumMap,
    data_header: Option<DataHeader>,
    tree: DirectoryTree,
    options: CacheOptions,
    mirror: Option<Box<dyn FilesystemMirror>>,
}

impl<R: Read + Seek> CacheFile<R> {
    /// Parse with default options, reporting through `tracing`
    pub fn parse(reader: R) -> CacheResult<Self> {
        Self::parse_with(reader, CacheOptions::default())
    }

    /// Parse with custom options, reporting through `tracing`
    pub fn parse_with(reader: R, options: CacheOptions) -> CacheResult<Self> {
        Self::parse_with_observer(reader, options, &mut TracingObserver)
    }

    /// Parse, reporting stages and advisories to `observer`
    pub fn parse_with_observer(
        mut reader: R,
        options: CacheOptions,
        observer: &mut dyn ParseObserver,
    ) -> CacheResult<Self> {
        reader.seek(SeekFrom::Start(0))?;

        let header: CacheHeader = read_section(&mut reader, ParseStage::Header)?;
        header.validate()?;
        let cache_type = header.cache_type()?;
        observer.stage_completed(ParseStage::Header);

        let (block_table, sector_table) = match cache_type {
            CacheType::Gcf => {
                let blocks = Self::read_block_table(&mut reader, &header, &options, observer)?;
                let sectors = SectorTable::read(&mut reader)?;
                sectors.validate(&header)?;
                observer.stage_completed(ParseStage::SectorTable);
                (Some(blocks), Some(sectors))
            }
            CacheType::Ncf => (None, None),
        };

        let manifest = Manifest::read(&mut reader)?;
        manifest.validate(&header)?;
        if options.verify_manifest_checksum {
            let computed = manifest.compute_checksum()?;
            if computed != manifest.header.checksum {
                observer.advisory(
                    ParseStage::Manifest,
                    &format!(
                        "checksum expected {computed:#010x}, got {:#010x}",
                        manifest.header.checksum
                    ),
                );
            }
        }
        observer.stage_completed(ParseStage::Manifest);

        let checksum_map = ChecksumMap::read(&mut reader)?;
        let dangling = checksum_map.dangling_entries();
        if dangling > 0 {
            observer.advisory(
                ParseStage::ChecksumMap,
                &format!("{dangling} entries reference checksums past the end of the map"),
            );
        }
        observer.stage_completed(ParseStage::ChecksumMap);

        let data_header = if cache_type == CacheType::Gcf {
            let data_header: DataHeader = read_section(&mut reader, ParseStage::SectorDataHeader)?;
            data_header.validate(&header)?;
            observer.stage_completed(ParseStage::SectorDataHeader);
            Some(data_header)
        } else {
            None
        };

        let content = block_table.as_ref().zip(sector_table.as_ref());
        let tree = DirectoryTree::build(&manifest, content)?;
        observer.stage_completed(ParseStage::DirectoryBuilt);

        debug!(
            "Parsed {:?} cache for application {} version {}: {} entries",
            cache_type,
            header.application_id,
            header.application_version,
            tree.len()
        );

        Ok(Self {
            reader,
            header,
            cache_type,
            block_table,
            sector_table,
            manifest,
            checksum_map,
            data_header,
            tree,
            options,
            mirror: None,
        })
    }

    fn read_block_table(
        reader: &mut R,
        header: &CacheHeader,
        options: &CacheOptions,
        observer: &mut dyn ParseObserver,
    ) -> CacheResult<BlockTable> {
        let stage = ParseStage::BlockTable;
        let blocks = BlockTable::read(reader)?;
        blocks.validate(header)?;

        if !blocks.checksum_matches() {
            let expected = blocks.header.compute_checksum();
            let actual = blocks.header.checksum;
            if options.strict_block_checksum {
                return Err(CacheError::mismatch(stage, "checksum", expected, actual));
            }
            observer.advisory(
                stage,
                &format!("checksum expected {expected:#010x}, got {actual:#010x}"),
            );
        }
        observer.stage_completed(stage);
        Ok(blocks)
    }

    /// Container header
    pub fn header(&self) -> &CacheHeader {
        &self.header
    }

    /// Archive variant
    pub fn cache_type(&self) -> CacheType {
        self.cache_type
    }

    /// Whether this is a GCF archive
    pub fn is_gcf(&self) -> bool {
        self.cache_type == CacheType::Gcf
    }

    /// Whether this is an NCF archive
    pub fn is_ncf(&self) -> bool {
        self.cache_type == CacheType::Ncf
    }

    /// Directory tree
    pub fn tree(&self) -> &DirectoryTree {
        &self.tree
    }

    /// Manifest
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Block table (GCF only)
    pub fn block_table(&self) -> Option<&BlockTable> {
        self.block_table.as_ref()
    }

    /// Sector table (GCF only)
    pub fn sector_table(&self) -> Option<&SectorTable> {
        self.sector_table.as_ref()
    }

    /// Checksum map
    pub fn checksum_map(&self) -> &ChecksumMap {
        &self.checksum_map
    }

    /// Sector data header (GCF only)
    pub fn data_header(&self) -> Option<&DataHeader> {
        self.data_header.as_ref()
    }

    /// Options used for parsing
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Use `mirror` to serve NCF file content
    pub fn attach_mirror(&mut self, mirror: impl FilesystemMirror + 'static) {
        self.mirror = Some(Box::new(mirror));
    }

    /// Attached mirror, if any
    pub fn mirror(&self) -> Option<&dyn FilesystemMirror> {
        self.mirror.as_deref()
    }

    /// Give back the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Open a file by archive path
    ///
    /// Paths use `\` or `/` between segments. `mode` must be a read mode
    /// such as `"rb"` or `"r"`; text modes drop carriage returns.
    pub fn open(&mut self, path: &str, mode: &str) -> CacheResult<FileHandle<'_, R>> {
        let mode: OpenMode = mode.parse()?;
        let id = self.tree.find(path)?;
        self.open_node(id, mode)
    }

    /// Open a file node
    pub fn open_node(&mut self, id: NodeId, mode: OpenMode) -> CacheResult<FileHandle<'_, R>> {
        match self.cache_type {
            CacheType::Gcf => Ok(FileHandle::Sector(self.stream(id, mode)?)),
            CacheType::Ncf => {
                self.file_info(id)?;
                let mirror = self.mirror.as_ref().ok_or_else(|| {
                    CacheError::InvalidState(
                        "no content folder is attached to this NCF".to_string(),
                    )
                })?;
                let reader = mirror.open(&self.tree.path(id))?;
                Ok(FileHandle::Mirror(reader, mode))
            }
        }
    }

    /// Sector stream over a GCF file
    pub fn stream(&mut self, id: NodeId, mode: OpenMode) -> CacheResult<SectorStream<'_, R>> {
        let data_header = self.require_gcf("sector streams")?;
        let info = Self::info_of(&self.tree, id)?;
        let item_size = u64::from(self.tree[id].item_size);
        Ok(SectorStream::new(
            &mut self.reader,
            &info.sectors,
            &data_header,
            item_size,
            mode,
        ))
    }

    /// Fraction of declared file bytes stored in the archive
    ///
    /// An archive declaring no file bytes is complete.
    pub fn completeness(&self) -> CacheResult<f64> {
        self.require_gcf("completeness")?;
        let total = self.tree.size(NodeId::ROOT);
        if total == 0 {
            return Ok(1.0);
        }
        Ok(self.tree.available_size() as f64 / total as f64)
    }

    /// Check a file's content against the checksum map
    pub fn verify(&mut self, path: &str) -> CacheResult<FileValidation> {
        let id = self.tree.find(path)?;
        self.verify_node(id)
    }

    /// Check a file node's content against the checksum map
    pub fn verify_node(&mut self, id: NodeId) -> CacheResult<FileValidation> {
        let data_header = self.require_gcf("verification")?;
        let info = Self::info_of(&self.tree, id)?;
        if info.checksum_index == NO_INDEX {
            return Ok(FileValidation::NoChecksums);
        }
        let Some(expected) = self.checksum_map.checksums_for(info.checksum_index) else {
            return Ok(FileValidation::NoChecksums);
        };

        let item_size = u64::from(self.tree[id].item_size);
        let mut stream = SectorStream::new(
            &mut self.reader,
            &info.sectors,
            &data_header,
            item_size,
            OpenMode::Binary,
        );

        let mut chunk = 0;
        while stream.position() < item_size {
            let len = (item_size - stream.position()).min(CHECKSUM_CHUNK_SIZE as u64);
            let data = match stream.read_bytes(len as usize) {
                Ok(data) => data,
                Err(CacheError::Incomplete { .. }) => return Ok(FileValidation::Incomplete),
                Err(e) => return Err(e),
            };
            if expected.get(chunk) != Some(&chunk_checksum(&data)) {
                return Ok(FileValidation::Corrupt { chunk });
            }
            chunk += 1;
        }
        Ok(FileValidation::Ok)
    }

    /// Data header, or a state error for NCF archives
    fn require_gcf(&self, operation: &str) -> CacheResult<DataHeader> {
        match (self.cache_type, self.data_header) {
            (CacheType::Gcf, Some(data_header)) => Ok(data_header),
            _ => Err(CacheError::InvalidState(format!(
                "{operation} requires a GCF archive, this one is {:?}",
                self.cache_type
            ))),
        }
    }

    fn file_info(&self, id: NodeId) -> CacheResult<&FileInfo> {
        Self::info_of(&self.tree, id)
    }

    fn info_of(tree: &DirectoryTree, id: NodeId) -> CacheResult<&FileInfo> {
        let node = tree
            .get(id)
            .ok_or_else(|| CacheError::NotFound(format!("node {}", id.index())))?;
        node.file()
            .ok_or_else(|| CacheError::InvalidState(format!("{:?} is a folder", tree.path(id))))
    }
}

impl CacheFile<BufReader<File>> {
    /// Open and parse an archive on disk
    ///
    /// The file name becomes the options' `source_name` unless one is set.
    /// For NCF archives a [`DirectoryMirror`] is attached when the folder
    /// named by `ncf_folder_pattern` exists.
    pub fn open_path(path: impl AsRef<Path>, options: CacheOptions) -> CacheResult<Self> {
        Self::open_path_with_observer(path, options, &mut TracingObserver)
    }

    /// Open and parse an archive on disk, reporting progress to `observer`
    pub fn open_path_with_observer(
        path: impl AsRef<Path>,
        mut options: CacheOptions,
        observer: &mut dyn ParseObserver,
    ) -> CacheResult<Self> {
        let path = path.as_ref();
        if options.source_name.is_none() {
            options.source_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        }

        let file = File::open(path)?;
        let mut cache = Self::parse_with_observer(BufReader::new(file), options, observer)?;

        if cache.is_ncf()
            && let Some(folder) = cache.options.ncf_folder()
        {
            let folder = PathBuf::from(folder);
            let folder = match path.parent() {
                Some(parent) if folder.is_relative() => parent.join(folder),
                _ => folder,
            };
            match DirectoryMirror::new(&folder) {
                Ok(mirror) => cache.attach_mirror(mirror),
                Err(e) => debug!("No NCF content at {}: {e}", folder.display()),
            }
        }
        Ok(cache)
    }
}

impl<R> fmt::Debug for CacheFile<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheFile")
            .field("header", &self.header)
            .field("cache_type", &self.cache_type)
            .field("entries", &self.tree.len())
            .field("mirror", &self.mirror)
            .finish_non_exhaustive()
    }
}

/// Read one fixed-size little-endian section
pub(crate) fn read_section<T, R>(reader: &mut R, stage: ParseStage) -> CacheResult<T>
where
    T: for<'a> BinRead<Args<'a> = ()> + ReadEndian,
    R: Read + Seek,
{
    T::read(reader).map_err(|e| {
        if e.is_eof() {
            CacheError::format(stage, "unexpected end of data")
        } else if let binrw::Error::Io(io) = e {
            CacheError::Io(io)
        } else {
            CacheError::format(stage, e.to_string())
        }
    })
}

/// Read exactly `len` bytes
pub(crate) fn read_bytes<R: Read>(
    reader: &mut R,
    len: u64,
    stage: ParseStage,
) -> CacheResult<Vec<u8>> {
    let mut data = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut data)?;
    if (data.len() as u64) < len {
        return Err(CacheError::format(
            stage,
            format!("expected {len} bytes, found {}", data.len()),
        ));
    }
    Ok(data)
}

/// Read `count` little-endian u32 values
pub(crate) fn read_u32_array<R: Read>(
    reader: &mut R,
    count: u32,
    stage: ParseStage,
) -> CacheResult<Vec<u32>> {
    let data = read_bytes(reader, u64::from(count) * 4, stage)?;
    Ok(data
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_helpers() {
        let mut cursor = Cursor::new(vec![1, 0, 0, 0, 2, 0, 0, 0, 9]);
        let values = read_u32_array(&mut cursor, 2, ParseStage::Manifest).unwrap();
        assert_eq!(values, vec![1, 2]);

        let err = read_bytes(&mut cursor, 2, ParseStage::Manifest).unwrap_err();
        assert!(err.is_format_error());
        assert_eq!(err.stage(), Some(ParseStage::Manifest));
    }

    #[test]
    fn test_short_section() {
        let mut cursor = Cursor::new(vec![0u8; CacheHeader::SIZE - 1]);
        let err = read_section::<CacheHeader, _>(&mut cursor, ParseStage::Header).unwrap_err();
        assert!(err.is_format_error());
        assert_eq!(err.stage(), Some(ParseStage::Header));
    }

    #[test]
    fn test_empty_input() {
        let err = CacheFile::parse(Cursor::new(Vec::new())).unwrap_err();
        assert!(err.is_format_error());
    }
}
