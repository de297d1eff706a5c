use std::fmt::Write as _;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use gcfkit_formats::blob::{Blob, BlobNode, BlobOptions, BlobValue, decode_with};

use crate::OutputFormat;

/// Bytes of a raw value shown in the text dump
const PREVIEW_LEN: usize = 32;

pub fn handle(
    file: &Path,
    recurse: bool,
    max_depth: usize,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let options = BlobOptions::default()
        .with_recurse(recurse)
        .with_max_depth(max_depth);
    let blob = decode_with(&data, &options)
        .with_context(|| format!("decoding blob {}", file.display()))?;

    if format.is_json() {
        println!("{}", format.render_json(&to_json(&blob))?);
    } else {
        let mut out = String::new();
        dump(&blob, 0, &mut out);
        print!("{out}");
    }
    Ok(ExitCode::SUCCESS)
}

fn key_label(node: &BlobNode) -> String {
    let key = node.smart_key();
    if is_printable(&key) {
        String::from_utf8_lossy(&key).into_owned()
    } else {
        format!("0x{}", hex::encode(&key))
    }
}

/// Printable text with optional trailing NUL bytes
fn text_value(data: &[u8]) -> Option<&str> {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let text = &data[..end];
    if text.is_empty() || !is_printable(text) {
        return None;
    }
    std::str::from_utf8(text).ok()
}

fn is_printable(data: &[u8]) -> bool {
    data.iter()
        .all(|&b| b.is_ascii_graphic() || b == b' ' || b == b'\t')
}

/// Four-byte values are read as integers before text
fn describe(data: &[u8]) -> String {
    if let Ok(bytes) = <[u8; 4]>::try_from(data) {
        return format!("{} (0x{})", u32::from_le_bytes(bytes), hex::encode(data));
    }
    if let Some(text) = text_value(data) {
        return format!("{text:?}");
    }
    let shown = &data[..data.len().min(PREVIEW_LEN)];
    let ellipsis = if data.len() > PREVIEW_LEN { "..." } else { "" };
    format!("[{} bytes] {}{ellipsis}", data.len(), hex::encode(shown))
}

fn dump(blob: &Blob, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    for node in blob {
        match &node.value {
            BlobValue::Raw(data) => {
                let _ = writeln!(out, "{indent}{}: {}", key_label(node), describe(data));
            }
            BlobValue::Nested(child) => {
                let _ = writeln!(out, "{indent}{}/ ({} nodes)", key_label(node), child.len());
                dump(child, depth + 1, out);
            }
        }
    }
}

fn raw_json(data: &[u8]) -> serde_json::Value {
    if let Ok(bytes) = <[u8; 4]>::try_from(data) {
        return serde_json::json!({ "u32": u32::from_le_bytes(bytes) });
    }
    match text_value(data) {
        Some(text) => serde_json::json!({ "text": text }),
        None => serde_json::json!({ "hex": hex::encode(data) }),
    }
}

fn to_json(blob: &Blob) -> serde_json::Value {
    serde_json::Value::Array(
        blob.iter()
            .map(|node| {
                let value = match &node.value {
                    BlobValue::Raw(data) => raw_json(data),
                    BlobValue::Nested(child) => to_json(child),
                };
                serde_json::json!({ "key": key_label(node), "value": value })
            })
            .collect(),
    )
}
