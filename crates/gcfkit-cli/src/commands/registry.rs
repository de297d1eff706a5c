use std::fmt::Write as _;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use gcfkit_formats::blob::{Registry, RegistryKey, RegistryValue};

use crate::OutputFormat;

pub fn handle(file: &Path, path: Option<&str>, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let registry = Registry::parse(&data)
        .with_context(|| format!("reading registry {}", file.display()))?;

    let segments: Vec<&str> = path
        .unwrap_or_default()
        .split(['\\', '/'])
        .filter(|s| !s.is_empty())
        .collect();
    let key = registry
        .root()
        .lookup(&segments)
        .with_context(|| format!("registry has no key '{}'", segments.join("\\")))?;

    if format.is_json() {
        println!("{}", format.render_json(&key_json(key))?);
    } else {
        let mut out = String::new();
        dump(key, 0, &mut out);
        print!("{out}");
    }
    Ok(ExitCode::SUCCESS)
}

fn describe(value: &RegistryValue) -> String {
    match value {
        RegistryValue::String(text) => format!("{text:?}"),
        RegistryValue::Dword(word) => format!("{word} (dword)"),
        RegistryValue::Binary(bytes) => format!("[{} bytes] {}", bytes.len(), hex::encode(bytes)),
        RegistryValue::Blob(blob) => format!("blob ({} nodes)", blob.len()),
    }
}

fn dump(key: &RegistryKey, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    for (name, value) in key.values() {
        let _ = writeln!(out, "{indent}{name} = {}", describe(value));
    }
    for subkey in key.subkeys() {
        let _ = writeln!(out, "{indent}{}\\", subkey.name);
        dump(subkey, depth + 1, out);
    }
}

fn value_json(value: &RegistryValue) -> serde_json::Value {
    match value {
        RegistryValue::String(text) => serde_json::json!({ "type": "string", "value": text }),
        RegistryValue::Dword(word) => serde_json::json!({ "type": "dword", "value": word }),
        RegistryValue::Binary(bytes) => {
            serde_json::json!({ "type": "binary", "value": hex::encode(bytes) })
        }
        RegistryValue::Blob(blob) => serde_json::json!({ "type": "blob", "nodes": blob.len() }),
    }
}

fn key_json(key: &RegistryKey) -> serde_json::Value {
    let values: serde_json::Map<String, serde_json::Value> = key
        .values()
        .map(|(name, value)| (name.to_string(), value_json(value)))
        .collect();
    serde_json::json!({
        "name": key.name,
        "values": values,
        "subkeys": key.subkeys().iter().map(key_json).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_values() {
        assert_eq!(
            describe(&RegistryValue::String("english".into())),
            "\"english\""
        );
        assert_eq!(describe(&RegistryValue::Dword(7)), "7 (dword)");
        assert_eq!(
            describe(&RegistryValue::Binary(vec![0xca, 0xfe])),
            "[2 bytes] cafe"
        );
        assert_eq!(
            value_json(&RegistryValue::Binary(vec![0xca, 0xfe])),
            serde_json::json!({ "type": "binary", "value": "cafe" })
        );
    }
}
