//! Blob nested key/value tree format
//!
//! Blobs are the self-describing binary trees the content client uses for
//! its catalog records. A tree is a sequence of nodes; each node has a key
//! and a value, and a value is either opaque bytes or a tree of its own.
//! There is no type tag: a value is treated as nested when its leading two
//! bytes carry one of the mode magics (see [`classify`]).
//!
//! # Layout
//!
//! ```text
//! u16 mode                     0x5001 plain, 0x4301 compressed
//! plain:      i32 length       total length including mode and header
//!             u32 padding      zero bytes following the children
//!             node*            u16 key_size, u32 value_size, key, value
//!             padding bytes
//! compressed: i32 compressed_len, 4 reserved,
//!             i32 decompressed_len, 6 reserved,
//!             zlib payload     inflates to a plain blob
//! ```
//!
//! # Example
//!
//! ```
//! use gcfkit_formats::blob::{Blob, BlobNode};
//!
//! let mut inner = Blob::new();
//! inner.push(BlobNode::raw(*b"1", [0x2A]));
//!
//! let mut root = Blob::new();
//! root.push(BlobNode::raw(*b"A", *b"hello"));
//! root.push(BlobNode::nested(*b"B", inner));
//!
//! let data = root.build(false).unwrap();
//! let decoded = Blob::parse(&data).unwrap();
//! assert_eq!(decoded.lookup(&["B", "1"]).unwrap().as_bytes().unwrap(), &[0x2A]);
//! ```

mod builder;
mod error;
mod node;
mod parser;
mod registry;

pub use builder::encode;
pub use error::{BlobError, BlobResult};
pub use node::{BlobNode, BlobValue};
pub use parser::{
    BlobOptions, Classification, DEFAULT_MAX_DEPTH, MAX_DECOMPRESSION_SIZE, classify, decode,
    decode_with,
};
pub use registry::{
    Registry, RegistryKey, RegistryValue, TOP_KEY, TYPE_BINARY, TYPE_DWORD, TYPE_STRING,
};

use crate::SteamFormat;

/// Mode tag of an uncompressed blob
pub const PLAIN_MAGIC: u16 = 0x5001;

/// Mode tag of a zlib-compressed blob
pub const COMPRESSED_MAGIC: u16 = 0x4301;

/// A decoded blob tree
///
/// Nodes keep their on-disk order. Keys are not required to be unique; keyed
/// lookups return the last node with a matching key, so a later entry
/// overrides an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blob {
    nodes: Vec<BlobNode>,
    /// Number of zero bytes written after the children
    pub padding: u32,
}

impl Blob {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trailing padding
    #[must_use]
    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    /// Append a node
    pub fn push(&mut self, node: BlobNode) {
        self.nodes.push(node);
    }

    /// Number of direct children
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no children
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over direct children in order
    pub fn iter(&self) -> std::slice::Iter<'_, BlobNode> {
        self.nodes.iter()
    }

    /// Direct children in order
    pub fn nodes(&self) -> &[BlobNode] {
        &self.nodes
    }

    /// Look up a child by its raw key bytes
    pub fn get(&self, key: &[u8]) -> Option<&BlobNode> {
        self.nodes.iter().rev().find(|node| node.key == key)
    }

    /// Alias of [`Self::get`]
    pub fn get_by_bytes_key(&self, key: &[u8]) -> Option<&BlobNode> {
        self.get(key)
    }

    /// Look up a child by name
    ///
    /// Names are compared against [`BlobNode::smart_key`], so `"7"` finds a
    /// node whose key is the little-endian integer 7 as well as a node whose
    /// key is the text `7`.
    pub fn get_by_name(&self, name: &str) -> Option<&BlobNode> {
        self.nodes
            .iter()
            .rev()
            .find(|node| node.smart_key().as_ref() == name.as_bytes())
    }

    /// Look up a child keyed by a little-endian 32-bit integer
    pub fn get_by_int(&self, key: i32) -> Option<&BlobNode> {
        self.get(&key.to_le_bytes())
    }

    /// Child at a position in insertion order
    pub fn get_by_ordinal_index(&self, index: usize) -> Option<&BlobNode> {
        self.nodes.get(index)
    }

    /// Look up a child by name, failing when it is missing
    pub fn require(&self, name: &str) -> BlobResult<&BlobNode> {
        self.get_by_name(name)
            .ok_or_else(|| BlobError::KeyNotFound(name.to_string()))
    }

    /// Follow a path of names through nested trees
    ///
    /// Every segment but the last must name a nested value.
    pub fn lookup(&self, path: &[&str]) -> BlobResult<&BlobNode> {
        let Some((last, parents)) = path.split_last() else {
            return Err(BlobError::KeyNotFound(String::new()));
        };

        let mut current = self;
        for segment in parents {
            current = current.require(segment)?.as_blob()?;
        }
        current.require(last)
    }

    /// Decode with default options
    pub fn parse(data: &[u8]) -> BlobResult<Self> {
        decode(data)
    }

    /// Decode with explicit options
    pub fn parse_with(data: &[u8], options: &BlobOptions) -> BlobResult<Self> {
        decode_with(data, options)
    }

    /// Encode, optionally compressing the outermost tree
    pub fn build(&self, compress: bool) -> BlobResult<Vec<u8>> {
        encode(self, compress)
    }
}

impl<'a> IntoIterator for &'a Blob {
    type Item = &'a BlobNode;
    type IntoIter = std::slice::Iter<'a, BlobNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl FromIterator<BlobNode> for Blob {
    fn from_iter<I: IntoIterator<Item = BlobNode>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
            padding: 0,
        }
    }
}

impl SteamFormat for Blob {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(decode(data)?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        Ok(encode(self, false)?)
    }
}
