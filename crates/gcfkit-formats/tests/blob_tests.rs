#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Integration tests for the blob tree codec

use gcfkit_formats::blob::{
    Blob, BlobNode, BlobOptions, BlobValue, Classification, classify, decode, decode_with,
    encode,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn node_bytes(key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend((key.len() as u16).to_le_bytes());
    out.extend((value.len() as u32).to_le_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(value);
    out
}

fn plain_bytes(nodes: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = nodes.concat();
    let mut out = Vec::new();
    out.extend(0x5001u16.to_le_bytes());
    out.extend(((body.len() + 10) as i32).to_le_bytes());
    out.extend(0u32.to_le_bytes());
    out.extend(body);
    out
}

// --- Wire format ---

#[test]
fn blob_decodes_handwritten_tree() {
    let inner = plain_bytes(&[node_bytes(b"1", &[0x2A])]);
    let data = plain_bytes(&[node_bytes(b"A", b"hello"), node_bytes(b"B", &inner)]);

    let tree = decode(&data).unwrap();
    assert_eq!(tree.len(), 2);
    assert_eq!(tree.get_by_name("A").unwrap().as_bytes().unwrap(), b"hello");
    assert_eq!(
        tree.lookup(&["B", "1"]).unwrap().as_bytes().unwrap(),
        &[0x2A]
    );
    assert_eq!(tree.get_by_ordinal_index(1).unwrap().key, b"B");

    // Re-encoding reproduces the input exactly
    assert_eq!(encode(&tree, false).unwrap(), data);
}

#[test]
fn blob_without_recursion_keeps_bytes() {
    let inner = plain_bytes(&[node_bytes(b"1", &[0x2A])]);
    let data = plain_bytes(&[node_bytes(b"B", &inner)]);

    let tree = decode_with(&data, &BlobOptions::default().with_recurse(false)).unwrap();
    assert_eq!(tree.get_by_name("B").unwrap().as_bytes().unwrap(), inner);
}

#[test]
fn blob_integer_keys() {
    let mut tree = Blob::new();
    tree.push(BlobNode::with_int_key(7, BlobValue::Raw(b"seven".to_vec())));
    tree.push(BlobNode::raw(*b"title", *b"Counter-Strike\0"));

    let decoded = decode(&encode(&tree, false).unwrap()).unwrap();
    assert_eq!(decoded.get_by_int(7).unwrap().as_bytes().unwrap(), b"seven");
    assert_eq!(decoded.get_by_name("7").unwrap().as_bytes().unwrap(), b"seven");
    assert_eq!(
        decoded.get_by_name("title").unwrap().as_str().unwrap(),
        "Counter-Strike"
    );
}

#[test]
fn blob_depth_limit_is_resource_error() {
    let mut data = plain_bytes(&[node_bytes(b"x", b"leaf")]);
    for _ in 0..8 {
        data = plain_bytes(&[node_bytes(b"n", &data)]);
    }

    assert!(decode(&data).is_ok());
    let err = decode_with(&data, &BlobOptions::default().with_max_depth(4)).unwrap_err();
    assert!(err.is_resource_error());
    assert!(!err.is_format_error());
}

// --- Properties ---

fn leaf_value() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..48)
        .prop_filter("value must not look like a tree", |v| {
            classify(v, true) == Classification::Raw
        })
}

fn raw_tree() -> impl Strategy<Value = Blob> {
    prop::collection::vec(
        (prop::collection::vec(any::<u8>(), 0..12), leaf_value()),
        0..8,
    )
    .prop_map(|nodes| {
        nodes
            .into_iter()
            .map(|(key, value)| BlobNode::raw(key, value))
            .collect()
    })
}

fn nested_tree() -> impl Strategy<Value = Blob> {
    raw_tree().prop_recursive(3, 32, 4, |inner| {
        prop::collection::vec(
            (
                prop::collection::vec(any::<u8>(), 1..6),
                prop_oneof![
                    leaf_value().prop_map(BlobValue::Raw),
                    inner.prop_map(BlobValue::Nested),
                ],
            ),
            0..4,
        )
        .prop_map(|nodes| {
            nodes
                .into_iter()
                .map(|(key, value)| BlobNode { key, value })
                .collect()
        })
    })
}

proptest! {
    #[test]
    fn blob_plain_round_trip(tree in raw_tree(), padding in 0u32..16) {
        let tree = tree.with_padding(padding);
        let data = encode(&tree, false).unwrap();
        prop_assert_eq!(decode(&data).unwrap(), tree);
    }

    #[test]
    fn blob_compressed_round_trip(tree in nested_tree()) {
        let data = encode(&tree, true).unwrap();
        prop_assert_eq!(decode(&data).unwrap(), tree);
    }

    #[test]
    fn blob_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode(&data);
    }

    #[test]
    fn blob_decode_garbage_after_magic(tail in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut data = 0x5001u16.to_le_bytes().to_vec();
        data.extend(tail);
        let _ = decode(&data);
    }
}
