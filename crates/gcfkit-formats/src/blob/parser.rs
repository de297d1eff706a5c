//! Blob decoding

use std::io::{Cursor, Read};

use binrw::{BinRead, BinWrite};
use flate2::read::ZlibDecoder;
use tracing::warn;

use super::error::{BlobError, BlobResult};
use super::{Blob, BlobNode, BlobValue, COMPRESSED_MAGIC, PLAIN_MAGIC};

/// Maximum allowed size of an inflated blob payload (256 MB)
///
/// Catalog blobs are a few megabytes at most. The limit stops a crafted
/// compressed header from inflating without bound.
pub const MAX_DECOMPRESSION_SIZE: usize = 256 * 1024 * 1024;

/// Default nesting limit for recursive decoding
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Smallest value that may hold a plain nested tree (tag + length + padding)
const MIN_PLAIN_LEN: usize = 10;

/// Smallest value that may hold a compressed nested tree (tag + 18 header bytes)
const MIN_COMPRESSED_LEN: usize = 20;

/// Size of the per-node header (key size + value size)
const NODE_HEADER_LEN: i64 = 6;

/// Header following the plain mode tag
#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[brw(little)]
pub(crate) struct PlainHeader {
    /// Total serialized length including the tag and this header
    pub length: i32,
    /// Zero bytes appended after the children
    pub padding: u32,
}

/// Header following the compressed mode tag (18 bytes)
#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[brw(little)]
pub(crate) struct CompressedHeader {
    /// Length of the deflate payload that follows
    pub compressed_len: i32,
    /// Length of the inflated payload
    #[brw(pad_before = 4, pad_after = 6)]
    pub decompressed_len: i32,
}

/// Header preceding every node's key and value
#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[brw(little)]
pub(crate) struct NodeHeader {
    pub key_size: u16,
    pub value_size: u32,
}

/// Options controlling decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobOptions {
    /// Decode values that look like trees as nested blobs
    pub recurse: bool,
    /// Maximum nesting depth before decoding fails
    pub max_depth: usize,
}

impl Default for BlobOptions {
    fn default() -> Self {
        Self {
            recurse: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl BlobOptions {
    /// Enable or disable nested decoding
    #[must_use]
    pub const fn with_recurse(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }

    /// Set the nesting limit
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Result of sniffing a node value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Value is opaque bytes
    Raw,
    /// Value should be decoded as a nested tree
    Nested,
}

/// Decide whether a value holds a nested tree.
///
/// A value is nested when recursion is enabled, it is at least 10 bytes and
/// its first two bytes are the plain magic, or they are the compressed magic
/// and the value is at least 20 bytes.
pub fn classify(value: &[u8], recurse: bool) -> Classification {
    if !recurse || value.len() < MIN_PLAIN_LEN {
        return Classification::Raw;
    }
    match u16::from_le_bytes([value[0], value[1]]) {
        PLAIN_MAGIC => Classification::Nested,
        COMPRESSED_MAGIC if value.len() >= MIN_COMPRESSED_LEN => Classification::Nested,
        _ => Classification::Raw,
    }
}

/// Decode a blob with default options
pub fn decode(data: &[u8]) -> BlobResult<Blob> {
    decode_with(data, &BlobOptions::default())
}

/// Decode a blob
pub fn decode_with(data: &[u8], options: &BlobOptions) -> BlobResult<Blob> {
    let mut cursor = Cursor::new(data);
    read_blob(&mut cursor, options, 0)
}

fn read_blob(cursor: &mut Cursor<&[u8]>, options: &BlobOptions, depth: usize) -> BlobResult<Blob> {
    if depth > options.max_depth {
        return Err(BlobError::DepthLimitExceeded {
            limit: options.max_depth,
        });
    }

    let tag = take(cursor, 2)?;
    match u16::from_le_bytes([tag[0], tag[1]]) {
        PLAIN_MAGIC => read_plain(cursor, options, depth),
        COMPRESSED_MAGIC => {
            ensure_available(cursor, 18)?;
            let header = CompressedHeader::read(cursor)?;
            let compressed_len = non_negative("compressed_len", header.compressed_len)?;
            let decompressed_len = non_negative("decompressed_len", header.decompressed_len)?;

            let payload = take(cursor, compressed_len)?;
            let inflated = inflate(payload)?;
            if inflated.len() != decompressed_len {
                warn!(
                    "compressed blob declares {} inflated bytes, got {}",
                    decompressed_len,
                    inflated.len()
                );
            }

            let mut inner = Cursor::new(inflated.as_slice());
            read_blob(&mut inner, options, depth + 1)
        }
        other => Err(BlobError::InvalidMagic(other)),
    }
}

fn read_plain(cursor: &mut Cursor<&[u8]>, options: &BlobOptions, depth: usize) -> BlobResult<Blob> {
    ensure_available(cursor, 8)?;
    let header = PlainHeader::read(cursor)?;
    let mut remaining = i64::from(header.length) - MIN_PLAIN_LEN as i64;
    if remaining < 0 {
        return Err(BlobError::NegativeSize {
            field: "length",
            value: remaining,
        });
    }

    let mut blob = Blob::new().with_padding(header.padding);
    while remaining >= NODE_HEADER_LEN {
        let (node, consumed) = read_node(cursor, options, depth)?;
        blob.push(node);
        remaining -= consumed;
    }

    // Padding is skipped as far as the data allows
    let data_len = cursor.get_ref().len() as u64;
    let skip = u64::from(header.padding).min(data_len.saturating_sub(cursor.position()));
    cursor.set_position(cursor.position() + skip);

    Ok(blob)
}

fn read_node(
    cursor: &mut Cursor<&[u8]>,
    options: &BlobOptions,
    depth: usize,
) -> BlobResult<(BlobNode, i64)> {
    ensure_available(cursor, NODE_HEADER_LEN as usize)?;
    let header = NodeHeader::read(cursor)?;
    let value_size = non_negative("value_size", header.value_size as i32)?;

    let key = take(cursor, usize::from(header.key_size))?.to_vec();
    let raw = take(cursor, value_size)?;

    let value = match classify(raw, options.recurse) {
        Classification::Nested => {
            let mut nested = Cursor::new(raw);
            BlobValue::Nested(read_blob(&mut nested, options, depth + 1)?)
        }
        Classification::Raw => BlobValue::Raw(raw.to_vec()),
    };

    let consumed = NODE_HEADER_LEN + i64::from(header.key_size) + value_size as i64;
    Ok((BlobNode { key, value }, consumed))
}

fn non_negative(field: &'static str, value: i32) -> BlobResult<usize> {
    usize::try_from(value).map_err(|_| BlobError::NegativeSize {
        field,
        value: i64::from(value),
    })
}

fn ensure_available(cursor: &Cursor<&[u8]>, needed: usize) -> BlobResult<()> {
    let available = (cursor.get_ref().len() as u64).saturating_sub(cursor.position());
    if (needed as u64) > available {
        return Err(BlobError::Truncated {
            offset: cursor.position(),
            needed: needed as u64,
            available,
        });
    }
    Ok(())
}

fn take<'a>(cursor: &mut Cursor<&'a [u8]>, len: usize) -> BlobResult<&'a [u8]> {
    ensure_available(cursor, len)?;
    let data: &'a [u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    cursor.set_position((start + len) as u64);
    Ok(&data[start..start + len])
}

fn inflate(payload: &[u8]) -> BlobResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(payload);
    let mut inflated = Vec::new();

    // Read in chunks to enforce the size limit
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = decoder
            .read(&mut buffer)
            .map_err(|e| BlobError::Decompression(e.to_string()))?;
        if bytes_read == 0 {
            break;
        }
        if inflated.len() + bytes_read > MAX_DECOMPRESSION_SIZE {
            return Err(BlobError::Decompression(format!(
                "inflated size exceeds limit of {MAX_DECOMPRESSION_SIZE} bytes"
            )));
        }
        inflated.extend_from_slice(&buffer[..bytes_read]);
    }

    Ok(inflated)
}
