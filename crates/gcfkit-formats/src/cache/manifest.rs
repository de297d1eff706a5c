//! Manifest: the directory tree of a cache file
//!
//! The manifest stores one fixed-size record per file or folder. Records
//! form a first-child/next-sibling tree and name themselves through offsets
//! into a shared table of NUL-terminated names. Auxiliary arrays list the
//! minimum-footprint and user-config entries, and a map after the manifest
//! gives each entry's first block in the block table.
//!
//! ```text
//! header            56 bytes (14 x u32)
//! entries           node_count x 28 bytes
//! name table        name_size bytes
//! hash table keys   hash_table_key_count x u32
//! hash indices      node_count x u32
//! minimum footprint num_of_minimum_footprint_files x u32
//! user config       num_of_user_config_files x u32
//! ---- binary_size ends here ----
//! map header        version (1), dummy (0)
//! first blocks      node_count x u32
//! ```

use std::borrow::Cow;
use std::fmt;
use std::io::{Cursor, Read, Seek};
use std::ops::BitOr;

use binrw::{BinRead, BinWrite};

use super::error::{CacheError, CacheResult, ParseStage};
use super::header::CacheHeader;
use super::{read_bytes, read_section, read_u32_array};
use crate::SteamFormat;

/// Upper bound on `binary_size`
pub const MAX_MANIFEST_SIZE: u64 = 256 * 1024 * 1024;

/// Manifest was written by a build tool
pub const MANIFEST_FLAG_BUILD_MODE: u32 = 0x0000_0001;
/// Client purges all files on update
pub const MANIFEST_FLAG_IS_PURGE_ALL: u32 = 0x0000_0002;
/// Long roll
pub const MANIFEST_FLAG_IS_LONG_ROLL: u32 = 0x0000_0004;
/// Depot key bits
pub const MANIFEST_FLAG_DEPOT_KEY: u32 = 0xFFFF_FF00;

/// Sentinel for "no child" / "no sibling" / "no parent"
pub const NO_INDEX: u32 = 0xFFFF_FFFF;

/// Per-entry directory flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DirectoryFlags(pub u32);

impl DirectoryFlags {
    /// Entry is a file rather than a folder
    pub const IS_FILE: Self = Self(0x0000_4000);
    /// Executable
    pub const IS_EXECUTABLE: Self = Self(0x0000_0800);
    /// Hidden
    pub const IS_HIDDEN: Self = Self(0x0000_0400);
    /// Read-only
    pub const IS_READ_ONLY: Self = Self(0x0000_0200);
    /// Content is encrypted
    pub const IS_ENCRYPTED: Self = Self(0x0000_0100);
    /// Removed on update
    pub const IS_PURGE_FILE: Self = Self(0x0000_0080);
    /// Back up before overwriting
    pub const BACKUP_BEFORE_OVERWRITE: Self = Self(0x0000_0040);
    /// Not cached
    pub const IS_NO_CACHE: Self = Self(0x0000_0020);
    /// Locked
    pub const IS_LOCKED: Self = Self(0x0000_0008);
    /// Launch target
    pub const IS_LAUNCH: Self = Self(0x0000_0002);
    /// User configuration file
    pub const IS_USER_CONFIG: Self = Self(0x0000_0001);

    const NAMED: [(Self, &'static str); 11] = [
        (Self::IS_FILE, "file"),
        (Self::IS_EXECUTABLE, "executable"),
        (Self::IS_HIDDEN, "hidden"),
        (Self::IS_READ_ONLY, "read-only"),
        (Self::IS_ENCRYPTED, "encrypted"),
        (Self::IS_PURGE_FILE, "purge"),
        (Self::BACKUP_BEFORE_OVERWRITE, "backup"),
        (Self::IS_NO_CACHE, "no-cache"),
        (Self::IS_LOCKED, "locked"),
        (Self::IS_LAUNCH, "launch"),
        (Self::IS_USER_CONFIG, "user-config"),
    ];

    /// Whether every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Names of the set flags, file bit excluded
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| *flag != Self::IS_FILE && self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for DirectoryFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for DirectoryFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(","))
    }
}

/// Manifest header (56 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct ManifestHeader {
    /// Header version
    pub header_version: u32,
    /// Application id; must match the container
    pub application_id: u32,
    /// Application version; must match the container
    pub application_version: u32,
    /// Number of entries
    pub node_count: u32,
    /// Number of file entries
    pub file_count: u32,
    /// Block size used for content checksums
    pub compression_block_size: u32,
    /// Bytes from the start of this header to the end of the user-config array
    pub binary_size: u32,
    /// Bytes in the name table
    pub name_size: u32,
    /// Entries in the hash table key array
    pub hash_table_key_count: u32,
    /// Entries in the minimum-footprint array
    pub num_of_minimum_footprint_files: u32,
    /// Entries in the user-config array
    pub num_of_user_config_files: u32,
    /// Flags and depot key (see `MANIFEST_FLAG_*`)
    pub depot_info: u32,
    /// Fingerprint
    pub fingerprint: u32,
    /// Adler-32 (seed 0) of the manifest with fingerprint and checksum zeroed
    pub checksum: u32,
}

impl ManifestHeader {
    /// Serialized size
    pub const SIZE: usize = 56;

    /// Built by a build tool
    pub fn is_build_mode(&self) -> bool {
        self.depot_info & MANIFEST_FLAG_BUILD_MODE != 0
    }

    /// Purge-all update policy
    pub fn is_purge_all(&self) -> bool {
        self.depot_info & MANIFEST_FLAG_IS_PURGE_ALL != 0
    }

    /// Long roll
    pub fn is_long_roll(&self) -> bool {
        self.depot_info & MANIFEST_FLAG_IS_LONG_ROLL != 0
    }

    /// Depot key bits of `depot_info`
    pub fn depot_key(&self) -> u32 {
        self.depot_info & MANIFEST_FLAG_DEPOT_KEY
    }
}

/// Manifest entry (28 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct ManifestEntry {
    /// Offset of the entry's name in the name table
    pub name_offset: u32,
    /// File size in bytes
    pub item_size: u32,
    /// Index into the checksum map, or `NO_INDEX`
    pub checksum_index: u32,
    /// Directory flags
    #[br(map = DirectoryFlags)]
    #[bw(map = |flags: &DirectoryFlags| flags.0)]
    pub directory_flags: DirectoryFlags,
    /// Parent entry
    pub parent_index: u32,
    /// Next sibling
    pub next_index: u32,
    /// First child (folders)
    pub child_index: u32,
}

impl ManifestEntry {
    /// Serialized size
    pub const SIZE: usize = 28;

    /// Whether the entry is a file
    pub fn is_file(&self) -> bool {
        self.directory_flags.contains(DirectoryFlags::IS_FILE)
    }

    /// Whether the entry is a folder
    pub fn is_folder(&self) -> bool {
        !self.is_file()
    }

    /// Executable flag
    pub fn is_executable(&self) -> bool {
        self.directory_flags.contains(DirectoryFlags::IS_EXECUTABLE)
    }

    /// Hidden flag
    pub fn is_hidden(&self) -> bool {
        self.directory_flags.contains(DirectoryFlags::IS_HIDDEN)
    }

    /// Read-only flag
    pub fn is_read_only(&self) -> bool {
        self.directory_flags.contains(DirectoryFlags::IS_READ_ONLY)
    }

    /// Encrypted flag
    pub fn is_encrypted(&self) -> bool {
        self.directory_flags.contains(DirectoryFlags::IS_ENCRYPTED)
    }

    /// Launch flag
    pub fn is_launch(&self) -> bool {
        self.directory_flags.contains(DirectoryFlags::IS_LAUNCH)
    }
}

/// Header of the block map that follows the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct ManifestMapHeader {
    /// Must be 1
    pub version: u32,
    /// Must be 0
    pub dummy: u32,
}

impl Default for ManifestMapHeader {
    fn default() -> Self {
        Self {
            version: 1,
            dummy: 0,
        }
    }
}

/// Parsed manifest and block map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Manifest header
    pub header: ManifestHeader,
    /// Entries; index 0 is the root folder
    pub entries: Vec<ManifestEntry>,
    /// NUL-terminated names
    pub names: Vec<u8>,
    /// Hash table keys
    pub hash_table_keys: Vec<u32>,
    /// Hash table indices, one per entry
    pub hash_table_indices: Vec<u32>,
    /// Entries installed in a minimum-footprint install
    pub minimum_footprint: Vec<u32>,
    /// Entries holding user configuration
    pub user_config: Vec<u32>,
    /// Bytes inside `binary_size` after the known arrays
    pub trailing: Vec<u8>,
    /// Block map header
    pub map_header: ManifestMapHeader,
    /// First block per entry; values outside the block table mean none
    pub first_blocks: Vec<u32>,
}

impl Manifest {
    /// Read the manifest and the block map after it
    pub fn read<R: Read + Seek>(reader: &mut R) -> CacheResult<Self> {
        let stage = ParseStage::Manifest;
        let header: ManifestHeader = read_section(reader, stage)?;

        let binary_size = u64::from(header.binary_size);
        if binary_size < ManifestHeader::SIZE as u64 {
            return Err(CacheError::mismatch(
                stage,
                "binary_size",
                format!("at least {}", ManifestHeader::SIZE),
                binary_size,
            ));
        }
        if binary_size > MAX_MANIFEST_SIZE {
            return Err(CacheError::TooLarge {
                stage,
                field: "binary_size",
                size: binary_size,
                limit: MAX_MANIFEST_SIZE,
            });
        }

        let body = read_bytes(reader, binary_size - ManifestHeader::SIZE as u64, stage)?;
        let node_table = u64::from(header.node_count) * ManifestEntry::SIZE as u64;
        if node_table > body.len() as u64 {
            return Err(CacheError::format(
                stage,
                format!(
                    "{} entries need {node_table} bytes, manifest body has {}",
                    header.node_count,
                    body.len()
                ),
            ));
        }

        let mut cursor = Cursor::new(body.as_slice());
        let mut entries = Vec::with_capacity(header.node_count as usize);
        for _ in 0..header.node_count {
            entries.push(read_section::<ManifestEntry, _>(&mut cursor, stage)?);
        }
        let names = read_bytes(&mut cursor, u64::from(header.name_size), stage)?;
        let hash_table_keys = read_u32_array(&mut cursor, header.hash_table_key_count, stage)?;
        let hash_table_indices = read_u32_array(&mut cursor, header.node_count, stage)?;
        let minimum_footprint =
            read_u32_array(&mut cursor, header.num_of_minimum_footprint_files, stage)?;
        let user_config = read_u32_array(&mut cursor, header.num_of_user_config_files, stage)?;
        let consumed = cursor.position() as usize;
        let trailing = body[consumed..].to_vec();

        let map_header: ManifestMapHeader = read_section(reader, stage)?;
        let first_blocks = read_u32_array(reader, header.node_count, stage)?;

        Ok(Self {
            header,
            entries,
            names,
            hash_table_keys,
            hash_table_indices,
            minimum_footprint,
            user_config,
            trailing,
            map_header,
            first_blocks,
        })
    }

    /// Validate against the container header
    pub fn validate(&self, container: &CacheHeader) -> CacheResult<()> {
        let stage = ParseStage::Manifest;
        if self.entries.is_empty() {
            return Err(CacheError::mismatch(stage, "node_count", "at least 1", 0));
        }
        if self.header.application_id != container.application_id {
            return Err(CacheError::mismatch(
                stage,
                "application_id",
                container.application_id,
                self.header.application_id,
            ));
        }
        if self.header.application_version != container.application_version {
            return Err(CacheError::mismatch(
                stage,
                "application_version",
                container.application_version,
                self.header.application_version,
            ));
        }
        if self.map_header.version != 1 {
            return Err(CacheError::mismatch(
                stage,
                "map_header.version",
                1,
                self.map_header.version,
            ));
        }
        if self.map_header.dummy != 0 {
            return Err(CacheError::mismatch(
                stage,
                "map_header.dummy",
                0,
                self.map_header.dummy,
            ));
        }
        Ok(())
    }

    /// Name of entry `index`
    pub fn name(&self, index: u32) -> CacheResult<Cow<'_, str>> {
        let entry = self.entry(index)?;
        let start = entry.name_offset as usize;
        let Some(tail) = self.names.get(start..) else {
            return Err(CacheError::mismatch(
                ParseStage::DirectoryBuilt,
                "name_offset",
                format!("at most {}", self.names.len()),
                start,
            ));
        };
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Ok(String::from_utf8_lossy(&tail[..end]))
    }

    /// Entry at `index`
    pub fn entry(&self, index: u32) -> CacheResult<&ManifestEntry> {
        self.entries.get(index as usize).ok_or_else(|| {
            CacheError::mismatch(
                ParseStage::DirectoryBuilt,
                "manifest_index",
                format!("below {}", self.entries.len()),
                index,
            )
        })
    }

    /// Sum of `item_size` over all file entries
    pub fn total_file_size(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.is_file())
            .map(|e| u64::from(e.item_size))
            .sum()
    }

    /// Adler-32 (seed 0) of the manifest with fingerprint and checksum zeroed
    pub fn compute_checksum(&self) -> CacheResult<u32> {
        let mut header = self.header;
        header.fingerprint = 0;
        header.checksum = 0;

        let mut adler = adler2::Adler32::from_checksum(0);
        adler.write_slice(&write_binrw(&header)?);
        adler.write_slice(&self.body()?);
        Ok(adler.checksum())
    }

    /// Whether the stored checksum matches the computed one
    pub fn checksum_matches(&self) -> CacheResult<bool> {
        Ok(self.compute_checksum()? == self.header.checksum)
    }

    fn body(&self) -> CacheResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        for entry in &self.entries {
            entry.write(&mut cursor)?;
        }
        let mut body = cursor.into_inner();
        body.extend_from_slice(&self.names);
        for array in [
            &self.hash_table_keys,
            &self.hash_table_indices,
            &self.minimum_footprint,
            &self.user_config,
        ] {
            body.extend(array.iter().flat_map(|v| v.to_le_bytes()));
        }
        body.extend_from_slice(&self.trailing);
        Ok(body)
    }
}

fn write_binrw<T>(value: &T) -> CacheResult<Vec<u8>>
where
    T: binrw::meta::WriteEndian + for<'a> BinWrite<Args<'a> = ()>,
{
    let mut cursor = Cursor::new(Vec::new());
    value.write(&mut cursor)?;
    Ok(cursor.into_inner())
}

impl SteamFormat for Manifest {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::read(&mut Cursor::new(data))?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut data = write_binrw(&self.header)?;
        data.extend(self.body()?);
        data.extend(write_binrw(&self.map_header)?);
        data.extend(self.first_blocks.iter().flat_map(|v| v.to_le_bytes()));
        Ok(data)
    }
}

#[derive(Debug)]
struct PendingNode {
    name: String,
    parent: u32,
    flags: DirectoryFlags,
    item_size: u32,
    checksum_index: u32,
    children: Vec<u32>,
}

/// Builder producing a consistent manifest
///
/// Entry 0 is the unnamed root folder. Indices returned by the `add_*`
/// methods are manifest indices.
#[derive(Debug)]
pub struct ManifestBuilder {
    application_id: u32,
    application_version: u32,
    depot_info: u32,
    compression_block_size: u32,
    nodes: Vec<PendingNode>,
    minimum_footprint: Vec<u32>,
    user_config: Vec<u32>,
    first_blocks: Vec<Option<u32>>,
}

impl ManifestBuilder {
    /// Start a manifest for an application
    pub fn new(application_id: u32, application_version: u32) -> Self {
        Self {
            application_id,
            application_version,
            depot_info: 0,
            compression_block_size: 0x8000,
            nodes: vec![PendingNode {
                name: String::new(),
                parent: NO_INDEX,
                flags: DirectoryFlags::default(),
                item_size: 0,
                checksum_index: NO_INDEX,
                children: Vec::new(),
            }],
            minimum_footprint: Vec::new(),
            user_config: Vec::new(),
            first_blocks: vec![None],
        }
    }

    /// Set `depot_info`
    #[must_use]
    pub fn with_depot_info(mut self, depot_info: u32) -> Self {
        self.depot_info = depot_info;
        self
    }

    /// Add a folder under `parent`
    pub fn add_folder(&mut self, parent: u32, name: &str) -> u32 {
        self.push(parent, name, DirectoryFlags::default(), 0)
    }

    /// Add a file under `parent`; the file flag is added to `flags`
    pub fn add_file(
        &mut self,
        parent: u32,
        name: &str,
        item_size: u32,
        flags: DirectoryFlags,
    ) -> u32 {
        let index = self.push(parent, name, flags | DirectoryFlags::IS_FILE, item_size);
        if flags.contains(DirectoryFlags::IS_USER_CONFIG) {
            self.user_config.push(index);
        }
        index
    }

    /// Set an entry's checksum map index
    pub fn set_checksum_index(&mut self, index: u32, checksum_index: u32) {
        if let Some(node) = self.nodes.get_mut(index as usize) {
            node.checksum_index = checksum_index;
        }
    }

    /// Mark an entry as part of the minimum footprint
    pub fn mark_minimum_footprint(&mut self, index: u32) {
        self.minimum_footprint.push(index);
    }

    /// Set an entry's first block
    pub fn set_first_block(&mut self, index: u32, block: u32) {
        if let Some(slot) = self.first_blocks.get_mut(index as usize) {
            *slot = Some(block);
        }
    }

    fn push(&mut self, parent: u32, name: &str, flags: DirectoryFlags, item_size: u32) -> u32 {
        let index = self.nodes.len() as u32;
        self.nodes.push(PendingNode {
            name: name.to_string(),
            parent,
            flags,
            item_size,
            checksum_index: NO_INDEX,
            children: Vec::new(),
        });
        self.first_blocks.push(None);
        if let Some(parent) = self.nodes.get_mut(parent as usize) {
            parent.children.push(index);
        }
        index
    }

    /// Assemble the manifest; entries without a first block get `no_block`
    pub fn build(self, no_block: u32) -> Manifest {
        let mut names = Vec::new();
        let mut entries = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let name_offset = names.len() as u32;
            names.extend_from_slice(node.name.as_bytes());
            names.push(0);

            entries.push(ManifestEntry {
                name_offset,
                item_size: node.item_size,
                checksum_index: node.checksum_index,
                directory_flags: node.flags,
                parent_index: node.parent,
                next_index: 0,
                child_index: node.children.first().copied().unwrap_or(0),
            });
        }
        for node in &self.nodes {
            for pair in node.children.windows(2) {
                entries[pair[0] as usize].next_index = pair[1];
            }
        }

        let node_count = entries.len() as u32;
        let file_count = entries.iter().filter(|e| e.is_file()).count() as u32;
        let binary_size = ManifestHeader::SIZE
            + entries.len() * ManifestEntry::SIZE
            + names.len()
            + 4 * (entries.len() + self.minimum_footprint.len() + self.user_config.len());

        let mut manifest = Manifest {
            header: ManifestHeader {
                header_version: 4,
                application_id: self.application_id,
                application_version: self.application_version,
                node_count,
                file_count,
                compression_block_size: self.compression_block_size,
                binary_size: binary_size as u32,
                name_size: names.len() as u32,
                hash_table_key_count: 0,
                num_of_minimum_footprint_files: self.minimum_footprint.len() as u32,
                num_of_user_config_files: self.user_config.len() as u32,
                depot_info: self.depot_info,
                fingerprint: 0,
                checksum: 0,
            },
            entries,
            names,
            hash_table_keys: Vec::new(),
            hash_table_indices: (0..node_count).collect(),
            minimum_footprint: self.minimum_footprint,
            user_config: self.user_config,
            trailing: Vec::new(),
            map_header: ManifestMapHeader::default(),
            first_blocks: self
                .first_blocks
                .into_iter()
                .map(|block| block.unwrap_or(no_block))
                .collect(),
        };
        if let Ok(checksum) = manifest.compute_checksum() {
            manifest.header.checksum = checksum;
        }
        manifest
    }
}
