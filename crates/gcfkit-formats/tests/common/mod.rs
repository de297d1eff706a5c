//! Synthetic GCF and NCF archives for integration tests
#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::io::Cursor;

use gcfkit_formats::SteamFormat;
use gcfkit_formats::cache::block_table::BLOCK_FLAG_NO_DATA;
use gcfkit_formats::cache::manifest::NO_INDEX;
use gcfkit_formats::cache::sector_table::LONG_TERMINATOR;
use gcfkit_formats::cache::{
    BlockEntry, BlockTable, CHECKSUM_CHUNK_SIZE, CacheFile, CacheHeader, CacheOptions,
    ChecksumMap, DataHeader, DirectoryFlags, Manifest, ManifestBuilder, SectorTable,
    chunk_checksum,
};

pub const APP_ID: u32 = 220;
pub const APP_VERSION: u32 = 7;

/// Archive sections, editable before serializing
pub struct Sections {
    pub header: CacheHeader,
    pub blocks: Option<BlockTable>,
    pub sectors: Option<SectorTable>,
    pub manifest: Manifest,
    pub checksums: ChecksumMap,
    pub sector_data: Vec<u8>,
}

impl Sections {
    /// Serialize in archive order; GCF archives get a matching data header
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(blocks) = &self.blocks {
            body.extend(blocks.build().unwrap());
        }
        if let Some(sectors) = &self.sectors {
            body.extend(sectors.build().unwrap());
        }
        body.extend(self.manifest.build().unwrap());
        body.extend(self.checksums.build().unwrap());

        let mut data = self.header.build().unwrap();
        data.extend(body);
        if self.blocks.is_some() {
            let first_sector_offset = (data.len() + DataHeader::SIZE) as u32;
            let data_header = DataHeader::for_container(
                &self.header,
                first_sector_offset,
                self.header.sector_count,
            );
            data.extend(data_header.build().unwrap());
            data.extend_from_slice(&self.sector_data);
        }
        data
    }

    /// Parse the serialized archive with default options
    pub fn parse(&self) -> CacheFile<Cursor<Vec<u8>>> {
        CacheFile::parse(Cursor::new(self.to_bytes())).unwrap()
    }

    /// Parse the serialized archive with custom options
    pub fn parse_with(
        &self,
        options: CacheOptions,
    ) -> gcfkit_formats::cache::CacheResult<CacheFile<Cursor<Vec<u8>>>> {
        CacheFile::parse_with(Cursor::new(self.to_bytes()), options)
    }
}

/// Lays out files into blocks and sectors
pub struct GcfBuilder {
    pub manifest: ManifestBuilder,
    sector_size: u32,
    sector_count: u32,
    links: Vec<u32>,
    data: Vec<u8>,
    blocks: Vec<BlockEntry>,
    checksums: Vec<Vec<u32>>,
    next_sector: u32,
}

impl GcfBuilder {
    pub fn new(sector_size: u32, sector_count: u32) -> Self {
        Self {
            manifest: ManifestBuilder::new(APP_ID, APP_VERSION),
            sector_size,
            sector_count,
            links: vec![LONG_TERMINATOR; sector_count as usize],
            data: vec![0; (sector_size * sector_count) as usize],
            blocks: Vec::new(),
            checksums: Vec::new(),
            next_sector: 0,
        }
    }

    pub fn folder(&mut self, parent: u32, name: &str) -> u32 {
        self.manifest.add_folder(parent, name)
    }

    /// Add a file stored in the next free sectors
    pub fn file(&mut self, parent: u32, name: &str, content: &[u8]) -> u32 {
        self.file_with(parent, name, content, DirectoryFlags::default())
    }

    /// Add a file with extra directory flags, stored in the next free sectors
    pub fn file_with(
        &mut self,
        parent: u32,
        name: &str,
        content: &[u8],
        flags: DirectoryFlags,
    ) -> u32 {
        let count = content.len().div_ceil(self.sector_size as usize) as u32;
        let run: Vec<u32> = (self.next_sector..self.next_sector + count).collect();
        self.next_sector += count;
        let runs = if run.is_empty() { vec![] } else { vec![run] };
        self.file_in_runs(parent, name, content, flags, &runs)
    }

    /// Add a file whose content fills `runs` in order, one block per run
    ///
    /// Content that does not fit in the runs is declared but not stored.
    pub fn file_in_runs(
        &mut self,
        parent: u32,
        name: &str,
        content: &[u8],
        flags: DirectoryFlags,
        runs: &[Vec<u32>],
    ) -> u32 {
        let index = self
            .manifest
            .add_file(parent, name, content.len() as u32, flags);

        let sums = content
            .chunks(CHECKSUM_CHUNK_SIZE)
            .map(chunk_checksum)
            .collect();
        self.manifest
            .set_checksum_index(index, self.checksums.len() as u32);
        self.checksums.push(sums);

        let sector_size = self.sector_size as usize;
        let mut offset = 0usize;
        let mut previous: Option<usize> = None;
        for run in runs {
            for pair in run.windows(2) {
                self.links[pair[0] as usize] = pair[1];
            }
            self.links[*run.last().unwrap() as usize] = LONG_TERMINATOR;

            let size = (run.len() * sector_size).min(content.len() - offset);
            for (i, &sector) in run.iter().enumerate() {
                let start = offset + i * sector_size;
                let end = (start + sector_size).min(offset + size);
                if start >= end {
                    break;
                }
                let dst = sector as usize * sector_size;
                self.data[dst..dst + end - start].copy_from_slice(&content[start..end]);
            }

            let block_index = self.blocks.len();
            let mut block = BlockEntry::data(
                index,
                offset as u32,
                size as u32,
                run[0],
                self.sector_count,
            );
            match previous {
                Some(prev) => {
                    self.blocks[prev].next_block_index = block_index as u32;
                    block.prev_block_index = prev as u32;
                }
                None => self.manifest.set_first_block(index, block_index as u32),
            }
            self.blocks.push(block);
            previous = Some(block_index);
            offset += size;
        }
        index
    }

    pub fn finish(self) -> Sections {
        let mut blocks = self.blocks;
        while blocks.len() < self.sector_count as usize {
            blocks.push(BlockEntry {
                flags: BLOCK_FLAG_NO_DATA,
                dummy: 0,
                file_data_offset: 0,
                file_data_size: 0,
                first_sector_index: 0,
                next_block_index: self.sector_count,
                prev_block_index: self.sector_count,
                manifest_index: NO_INDEX,
            });
        }

        Sections {
            header: CacheHeader::new_gcf(
                APP_ID,
                APP_VERSION,
                self.sector_size,
                self.sector_count,
            ),
            blocks: Some(BlockTable::new(blocks)),
            sectors: Some(SectorTable::new(self.links, true)),
            manifest: self.manifest.build(self.sector_count),
            checksums: ChecksumMap::from_files(&self.checksums),
            sector_data: self.data,
        }
    }
}

/// NCF sections around a manifest
pub fn ncf_sections(manifest: ManifestBuilder) -> Sections {
    Sections {
        header: CacheHeader::new_ncf(APP_ID, APP_VERSION),
        blocks: None,
        sectors: None,
        manifest: manifest.build(NO_INDEX),
        checksums: ChecksumMap::from_files(&[]),
        sector_data: Vec::new(),
    }
}

/// A small game layout:
///
/// ```text
/// readme.txt           "hello"
/// config.cfg           user config, minimum footprint
/// bin\engine.dll       minimum footprint, spans several sectors
/// maps\de_dust.bsp
/// maps\empty\
/// ```
pub fn sample_gcf() -> Sections {
    let mut builder = GcfBuilder::new(8, 16);
    builder.file(0, "readme.txt", b"hello");
    let cfg = builder.file_with(
        0,
        "config.cfg",
        b"sensitivity 2\r\n",
        DirectoryFlags::IS_USER_CONFIG,
    );
    builder.manifest.mark_minimum_footprint(cfg);

    let bin = builder.folder(0, "bin");
    let engine = builder.file_with(
        bin,
        "engine.dll",
        b"MZ engine binary contents",
        DirectoryFlags::IS_EXECUTABLE,
    );
    builder.manifest.mark_minimum_footprint(engine);

    let maps = builder.folder(0, "maps");
    builder.file(maps, "de_dust.bsp", b"BSP level data");
    builder.folder(maps, "empty");
    builder.finish()
}
