//! Blob encoding

use std::io::{Cursor, Write};

use binrw::BinWrite;
use binrw::meta::WriteEndian;
use flate2::Compression;
use flate2::write::ZlibEncoder;

use super::error::{BlobError, BlobResult};
use super::parser::{CompressedHeader, NodeHeader, PlainHeader};
use super::{Blob, BlobNode, BlobValue, COMPRESSED_MAGIC, PLAIN_MAGIC};

/// Encode a blob.
///
/// Children are written in insertion order followed by `padding` zero
/// bytes. With `compress` set the plain encoding is deflated and wrapped in
/// the compressed header; nested trees are always written plain.
pub fn encode(blob: &Blob, compress: bool) -> BlobResult<Vec<u8>> {
    let plain = encode_plain(blob)?;
    if !compress {
        return Ok(plain);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&plain)
        .map_err(|e| BlobError::Compression(e.to_string()))?;
    let deflated = encoder
        .finish()
        .map_err(|e| BlobError::Compression(e.to_string()))?;

    let header = CompressedHeader {
        compressed_len: to_i32("compressed payload", deflated.len())?,
        decompressed_len: to_i32("decompressed payload", plain.len())?,
    };

    let mut out = Vec::with_capacity(20 + deflated.len());
    out.extend_from_slice(&COMPRESSED_MAGIC.to_le_bytes());
    out.extend_from_slice(&header_bytes(&header)?);
    out.extend_from_slice(&deflated);
    Ok(out)
}

fn encode_plain(blob: &Blob) -> BlobResult<Vec<u8>> {
    let mut body = Vec::new();
    for node in blob.iter() {
        write_node(&mut body, node)?;
    }

    let header = PlainHeader {
        length: to_i32("blob", body.len() + 10)?,
        padding: blob.padding,
    };

    let mut out = Vec::with_capacity(10 + body.len() + blob.padding as usize);
    out.extend_from_slice(&PLAIN_MAGIC.to_le_bytes());
    out.extend_from_slice(&header_bytes(&header)?);
    out.extend_from_slice(&body);
    out.resize(out.len() + blob.padding as usize, 0);
    Ok(out)
}

fn write_node(out: &mut Vec<u8>, node: &BlobNode) -> BlobResult<()> {
    let nested;
    let value: &[u8] = match &node.value {
        BlobValue::Raw(data) => data,
        BlobValue::Nested(child) => {
            nested = encode_plain(child)?;
            &nested
        }
    };

    let header = NodeHeader {
        key_size: u16::try_from(node.key.len()).map_err(|_| BlobError::TooLarge {
            field: "key",
            size: node.key.len(),
        })?,
        value_size: to_i32("value", value.len())? as u32,
    };

    out.extend_from_slice(&header_bytes(&header)?);
    out.extend_from_slice(&node.key);
    out.extend_from_slice(value);
    Ok(())
}

fn header_bytes<T>(header: &T) -> BlobResult<Vec<u8>>
where
    T: WriteEndian + for<'a> BinWrite<Args<'a> = ()>,
{
    let mut cursor = Cursor::new(Vec::new());
    header.write(&mut cursor)?;
    Ok(cursor.into_inner())
}

fn to_i32(field: &'static str, size: usize) -> BlobResult<i32> {
    i32::try_from(size).map_err(|_| BlobError::TooLarge { field, size })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::blob::decode;

    #[test]
    fn test_plain_layout() {
        let mut blob = Blob::new().with_padding(2);
        blob.push(BlobNode::raw(*b"A", *b"hi"));

        let data = encode(&blob, false).unwrap();
        assert_eq!(&data[..2], &PLAIN_MAGIC.to_le_bytes());
        // 10 header bytes + 6 node header + 1 key + 2 value
        assert_eq!(i32::from_le_bytes(data[2..6].try_into().unwrap()), 19);
        assert_eq!(u32::from_le_bytes(data[6..10].try_into().unwrap()), 2);
        assert_eq!(data.len(), 21);
        assert_eq!(&data[19..], &[0, 0]);
    }

    #[test]
    fn test_compressed_layout() {
        let mut blob = Blob::new();
        blob.push(BlobNode::raw(*b"payload", vec![0x41; 256]));

        let data = encode(&blob, true).unwrap();
        assert_eq!(&data[..2], &COMPRESSED_MAGIC.to_le_bytes());
        let compressed_len = i32::from_le_bytes(data[2..6].try_into().unwrap());
        let decompressed_len = i32::from_le_bytes(data[10..14].try_into().unwrap());
        assert_eq!(&data[6..10], &[0; 4]);
        assert_eq!(&data[14..20], &[0; 6]);
        assert_eq!(data.len(), 20 + compressed_len as usize);
        assert_eq!(decompressed_len as usize, encode(&blob, false).unwrap().len());

        assert_eq!(decode(&data).unwrap(), blob);
    }

    #[test]
    fn test_nested_tree_is_written_plain() {
        let mut child = Blob::new();
        child.push(BlobNode::raw(*b"x", vec![0x55; 64]));
        let mut blob = Blob::new();
        blob.push(BlobNode::nested(*b"child", child));

        let data = encode(&blob, false).unwrap();
        // Node value starts after tag(2) + header(8) + node header(6) + key(5)
        assert_eq!(&data[21..23], &PLAIN_MAGIC.to_le_bytes());
    }

    #[test]
    fn test_oversized_key_rejected() {
        let mut blob = Blob::new();
        blob.push(BlobNode::raw(vec![0u8; 70_000], vec![]));
        assert!(matches!(
            encode(&blob, false),
            Err(BlobError::TooLarge { field: "key", .. })
        ));
    }
}
