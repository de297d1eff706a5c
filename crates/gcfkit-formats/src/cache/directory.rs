//! In-memory directory tree
//!
//! Nodes live in a single arena and refer to each other by [`NodeId`].
//! The tree is built once from the manifest; for GCF archives each file
//! also carries its resolved sector sequence.

use std::collections::HashSet;
use std::ops::Index;
use std::path::PathBuf;

use super::block_table::BlockTable;
use super::error::{CacheError, CacheResult, ParseStage};
use super::manifest::{DirectoryFlags, Manifest, NO_INDEX};
use super::sector_table::SectorTable;

/// Separator of archive paths
pub const PATH_SEPARATOR: char = '\\';

/// Index of a node in a [`DirectoryTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The root folder
    pub const ROOT: Self = Self(0);

    /// Arena index
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Content information of a file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    /// Sector indices in logical order, across all blocks
    pub sectors: Vec<u32>,
    /// Number of blocks in the file's chain
    pub block_count: usize,
    /// Sum of `file_data_size` over the file's blocks
    pub available_size: u64,
    /// Whether any block's sectors are not contiguous
    pub is_fragmented: bool,
    /// Listed in the manifest's user-config array
    pub is_user_config: bool,
    /// Listed in the manifest's minimum-footprint array
    pub is_minimum_footprint: bool,
    /// Index into the checksum map
    pub checksum_index: u32,
}

/// File or folder payload of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Folder with its children in manifest order
    Folder(Vec<NodeId>),
    /// File
    File(FileInfo),
}

/// A file or folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryNode {
    /// Name within the parent folder
    pub name: String,
    /// Parent folder; `None` for the root
    pub parent: Option<NodeId>,
    /// Index of the manifest entry
    pub manifest_index: u32,
    /// Manifest flags
    pub flags: DirectoryFlags,
    /// Declared size in bytes (files)
    pub item_size: u32,
    /// File or folder payload
    pub kind: NodeKind,
}

impl DirectoryNode {
    /// Whether this is a file
    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File(_))
    }

    /// Whether this is a folder
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder(_))
    }

    /// File information, for files
    pub fn file(&self) -> Option<&FileInfo> {
        match &self.kind {
            NodeKind::File(info) => Some(info),
            NodeKind::Folder(_) => None,
        }
    }

    /// Children, empty for files
    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Folder(children) => children,
            NodeKind::File(_) => &[],
        }
    }

    /// User-config flag from the manifest arrays
    pub fn is_user_config(&self) -> bool {
        self.file().is_some_and(|f| f.is_user_config)
    }

    /// Minimum-footprint flag from the manifest arrays
    pub fn is_minimum_footprint(&self) -> bool {
        self.file().is_some_and(|f| f.is_minimum_footprint)
    }
}

/// Directory tree of a cache file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTree {
    nodes: Vec<DirectoryNode>,
}

impl DirectoryTree {
    /// Build the tree from a manifest
    ///
    /// With `content`, every file resolves its block chain and sector
    /// sequence. Each manifest entry may be reached once; a revisit means
    /// the sibling or child links loop.
    pub fn build(
        manifest: &Manifest,
        content: Option<(&BlockTable, &SectorTable)>,
    ) -> CacheResult<Self> {
        let stage = ParseStage::DirectoryBuilt;
        let root_entry = manifest.entry(0)?;
        let minimum: HashSet<u32> = manifest.minimum_footprint.iter().copied().collect();
        let user: HashSet<u32> = manifest.user_config.iter().copied().collect();

        let mut nodes = vec![DirectoryNode {
            name: manifest.name(0)?.into_owned(),
            parent: None,
            manifest_index: 0,
            flags: root_entry.directory_flags,
            item_size: root_entry.item_size,
            kind: NodeKind::Folder(Vec::new()),
        }];
        let mut visited = vec![false; manifest.entries.len()];
        visited[0] = true;

        let mut pending = vec![(NodeId::ROOT, 0u32)];
        while let Some((folder, folder_index)) = pending.pop() {
            let mut link = ("child_index", manifest.entry(folder_index)?.child_index);

            while link.1 != NO_INDEX && link.1 != 0 {
                let index = link.1;
                let entry = manifest.entry(index)?;
                if visited[index as usize] {
                    return Err(CacheError::mismatch(
                        stage,
                        link.0,
                        "each entry reached once",
                        format!("entry {index} revisited"),
                    ));
                }
                visited[index as usize] = true;

                let name = manifest.name(index)?.into_owned();
                if !is_safe_name(&name) {
                    return Err(CacheError::mismatch(
                        stage,
                        "name",
                        "a plain file name",
                        format!("{name:?}"),
                    ));
                }

                let kind = if entry.is_file() {
                    let mut info = FileInfo {
                        is_user_config: user.contains(&index),
                        is_minimum_footprint: minimum.contains(&index),
                        checksum_index: entry.checksum_index,
                        ..FileInfo::default()
                    };
                    if let Some((blocks, sectors)) = content {
                        resolve_content(&mut info, manifest, index, blocks, sectors)?;
                    }
                    NodeKind::File(info)
                } else {
                    NodeKind::Folder(Vec::new())
                };

                let id = NodeId(nodes.len());
                let is_folder = matches!(kind, NodeKind::Folder(_));
                nodes.push(DirectoryNode {
                    name,
                    parent: Some(folder),
                    manifest_index: index,
                    flags: entry.directory_flags,
                    item_size: entry.item_size,
                    kind,
                });
                if let NodeKind::Folder(children) = &mut nodes[folder.0].kind {
                    children.push(id);
                }
                if is_folder {
                    pending.push((id, index));
                }

                link = ("next_index", entry.next_index);
            }
        }

        Ok(Self { nodes })
    }

    /// The root folder
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a tree has at least its root
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node by id
    pub fn get(&self, id: NodeId) -> Option<&DirectoryNode> {
        self.nodes.get(id.0)
    }

    /// All nodes with their ids
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &DirectoryNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    /// Children of a folder; empty for files
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map_or(&[] as &[NodeId], DirectoryNode::children)
    }

    /// Child of a folder by name
    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .rev()
            .copied()
            .find(|&child| self[child].name == name)
    }

    /// Resolve a path from the root
    ///
    /// Both `\` and `/` separate segments; empty segments are ignored, so a
    /// leading separator is allowed and an empty path names the root.
    pub fn find(&self, path: &str) -> CacheResult<NodeId> {
        self.find_from(NodeId::ROOT, path)
    }

    /// Resolve a path relative to a folder
    pub fn find_from(&self, start: NodeId, path: &str) -> CacheResult<NodeId> {
        let mut current = start;
        for segment in path.split(['\\', '/']).filter(|s| !s.is_empty()) {
            current = self.child(current, segment).ok_or_else(|| {
                CacheError::NotFound(format!(
                    "'{}' has no entry '{}' (looking up '{}')",
                    self.path(current),
                    segment,
                    path
                ))
            })?;
        }
        Ok(current)
    }

    /// Archive path, segments joined with `\`; empty for the root
    pub fn path(&self, id: NodeId) -> String {
        let names = self.ancestry(id);
        let mut path = String::new();
        for (i, name) in names.iter().rev().enumerate() {
            if i > 0 {
                path.push(PATH_SEPARATOR);
            }
            path.push_str(name);
        }
        path
    }

    /// Path relative to an extraction root, using the platform separator
    pub fn sys_path(&self, id: NodeId) -> PathBuf {
        self.ancestry(id).iter().rev().collect()
    }

    fn ancestry(&self, id: NodeId) -> Vec<&str> {
        let mut names = Vec::new();
        let mut current = self.get(id);
        while let Some(node) = current {
            let Some(parent) = node.parent else {
                break;
            };
            names.push(node.name.as_str());
            current = self.get(parent);
        }
        names
    }

    /// Files below a node, depth first in manifest order; a file yields itself
    pub fn all_files(&self, id: NodeId) -> Vec<NodeId> {
        let mut files = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            match &node.kind {
                NodeKind::File(_) => files.push(current),
                NodeKind::Folder(children) => stack.extend(children.iter().rev()),
            }
        }
        files
    }

    /// Size of a file, or the sum of the files below a folder
    pub fn size(&self, id: NodeId) -> u64 {
        self.all_files(id)
            .into_iter()
            .map(|file| u64::from(self[file].item_size))
            .sum()
    }

    /// Sum of `available_size` over all files
    pub fn available_size(&self) -> u64 {
        self.nodes
            .iter()
            .filter_map(DirectoryNode::file)
            .map(|info| info.available_size)
            .sum()
    }
}

impl Index<NodeId> for DirectoryTree {
    type Output = DirectoryNode;

    fn index(&self, id: NodeId) -> &DirectoryNode {
        &self.nodes[id.0]
    }
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['\\', '/', '\0'])
}

fn resolve_content(
    info: &mut FileInfo,
    manifest: &Manifest,
    index: u32,
    blocks: &BlockTable,
    sectors: &SectorTable,
) -> CacheResult<()> {
    let first = manifest
        .first_blocks
        .get(index as usize)
        .copied()
        .unwrap_or(NO_INDEX);

    for block_index in blocks.chain(first)? {
        let block = &blocks.entries[block_index as usize];
        info.block_count += 1;
        info.available_size += u64::from(block.file_data_size);
        info.is_fragmented |= sectors.is_fragmented(block.first_sector_index);
        info.sectors.extend(sectors.chain(block.first_sector_index)?);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::block_table::BlockEntry;
    use crate::cache::manifest::ManifestBuilder;
    use crate::cache::sector_table::LONG_TERMINATOR;
    use pretty_assertions::assert_eq;

    fn sample_manifest() -> Manifest {
        let mut builder = ManifestBuilder::new(1, 1);
        let maps = builder.add_folder(0, "maps");
        builder.add_file(maps, "de_dust.bsp", 10, DirectoryFlags::default());
        builder.add_file(maps, "cs_office.bsp", 6, DirectoryFlags::default());
        let cfg = builder.add_file(0, "config.cfg", 3, DirectoryFlags::IS_USER_CONFIG);
        builder.mark_minimum_footprint(cfg);
        builder.add_folder(0, "empty");
        builder.build(0)
    }

    #[test]
    fn test_navigation() {
        let tree = DirectoryTree::build(&sample_manifest(), None).unwrap();
        let root = tree.root();
        assert_eq!(tree.children(root).len(), 3);

        let bsp = tree.find("maps\\de_dust.bsp").unwrap();
        assert_eq!(tree.find("/maps/de_dust.bsp").unwrap(), bsp);
        assert_eq!(tree.find("\\maps\\de_dust.bsp").unwrap(), bsp);
        assert_eq!(tree.find("").unwrap(), root);
        assert_eq!(tree.path(bsp), "maps\\de_dust.bsp");
        assert_eq!(tree.sys_path(bsp), PathBuf::from("maps").join("de_dust.bsp"));
        assert_eq!(tree.path(root), "");

        let maps = tree.child(root, "maps").unwrap();
        assert_eq!(tree[bsp].parent, Some(maps));
        assert_eq!(tree.size(maps), 16);
        assert_eq!(tree.size(root), 19);
        assert_eq!(tree.size(bsp), 10);
        assert!(tree[maps].is_folder());
        assert!(tree[bsp].is_file());
    }

    #[test]
    fn test_find_missing_segment() {
        let tree = DirectoryTree::build(&sample_manifest(), None).unwrap();
        let err = tree.find("maps\\missing.bsp").unwrap_err();
        assert!(matches!(err, CacheError::NotFound(_)));
        assert!(tree.find("config.cfg\\x").is_err());
    }

    #[test]
    fn test_all_files_in_order() {
        let tree = DirectoryTree::build(&sample_manifest(), None).unwrap();
        let names: Vec<_> = tree
            .all_files(tree.root())
            .into_iter()
            .map(|id| tree.path(id))
            .collect();
        assert_eq!(
            names,
            vec!["maps\\de_dust.bsp", "maps\\cs_office.bsp", "config.cfg"]
        );
        let empty = tree.find("empty").unwrap();
        assert!(tree.all_files(empty).is_empty());
    }

    #[test]
    fn test_index_arrays() {
        let tree = DirectoryTree::build(&sample_manifest(), None).unwrap();
        let cfg = &tree[tree.find("config.cfg").unwrap()];
        assert!(cfg.is_user_config());
        assert!(cfg.is_minimum_footprint());
        let bsp = &tree[tree.find("maps/cs_office.bsp").unwrap()];
        assert!(!bsp.is_user_config());
        assert!(!bsp.is_minimum_footprint());
    }

    #[test]
    fn test_sibling_loop_is_rejected() {
        let mut manifest = sample_manifest();
        // maps -> config.cfg -> empty -> maps
        manifest.entries[5].next_index = 1;
        let err = DirectoryTree::build(&manifest, None).unwrap_err();
        assert!(err.is_validation_error());
        assert_eq!(err.field(), Some("next_index"));
    }

    #[test]
    fn test_unsafe_names_are_rejected() {
        let mut builder = ManifestBuilder::new(1, 1);
        builder.add_file(0, "..", 1, DirectoryFlags::default());
        let err = DirectoryTree::build(&builder.build(0), None).unwrap_err();
        assert_eq!(err.field(), Some("name"));
    }

    #[test]
    fn test_content_across_blocks() {
        let mut builder = ManifestBuilder::new(1, 1);
        let file = builder.add_file(0, "a.bin", 12, DirectoryFlags::default());
        builder.set_first_block(file, 0);
        let manifest = builder.build(2);

        let mut first = BlockEntry::data(file, 0, 8, 3, 2);
        first.next_block_index = 1;
        let mut second = BlockEntry::data(file, 8, 4, 0, 2);
        second.prev_block_index = 0;
        let blocks = BlockTable::new(vec![first, second]);
        // Block 0: 3 -> 1, block 1: 0
        let sectors = SectorTable::new(vec![LONG_TERMINATOR, LONG_TERMINATOR, 0, 1], true);

        let tree = DirectoryTree::build(&manifest, Some((&blocks, &sectors))).unwrap();
        let info = tree[tree.find("a.bin").unwrap()].file().unwrap().clone();
        assert_eq!(info.sectors, vec![3, 1, 0]);
        assert_eq!(info.block_count, 2);
        assert_eq!(info.available_size, 12);
        assert!(info.is_fragmented);
        assert_eq!(tree.available_size(), 12);
    }
}
