//! Client registry view
//!
//! The client keeps its settings in a blob tree shaped like a registry. A
//! key node holds its subkeys under child `1` and its values under child
//! `2`. A value node holds its type code under `1` and its data under `2`.
//! Child keys are usually stored as integers, so lookups go through
//! [`Blob::get_by_name`], which matches both forms.

use std::borrow::Cow;

use tracing::trace;

use super::error::{BlobError, BlobResult};
use super::{Blob, BlobNode, BlobValue};

/// Name of the root key node
pub const TOP_KEY: &str = "TopKey";

/// Type code of a text value
pub const TYPE_STRING: i32 = 0;
/// Type code of a 32-bit integer value
pub const TYPE_DWORD: i32 = 1;
/// Type code of a binary value
pub const TYPE_BINARY: i32 = 2;

const SUBKEYS: &str = "1";
const VALUES: &str = "2";
const VALUE_TYPE: &str = "1";
const VALUE_DATA: &str = "2";

/// Data of a registry value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryValue {
    /// Text, cut at the first NUL
    String(String),
    /// Little-endian 32-bit integer
    Dword(u32),
    /// Opaque bytes
    Binary(Vec<u8>),
    /// Binary data that decoded as a blob tree
    Blob(Blob),
}

impl RegistryValue {
    /// On-disk type code
    pub fn type_code(&self) -> i32 {
        match self {
            Self::String(_) => TYPE_STRING,
            Self::Dword(_) => TYPE_DWORD,
            Self::Binary(_) | Self::Blob(_) => TYPE_BINARY,
        }
    }

    /// Text of a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    /// Integer of a dword value
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Dword(value) => Some(*value),
            _ => None,
        }
    }

    /// Decode a value node
    ///
    /// Unknown type codes are read as binary. Dword data longer than four
    /// bytes is truncated.
    pub fn from_node(node: &BlobNode) -> BlobResult<Self> {
        let fields = node.as_blob()?;
        let type_code = fields.require(VALUE_TYPE)?.as_i32()?;
        let data = fields.require(VALUE_DATA)?;

        match type_code {
            TYPE_STRING => Ok(Self::String(until_nul(data.as_bytes()?).into_owned())),
            TYPE_DWORD => {
                let bytes = data.as_bytes()?;
                let word = bytes
                    .first_chunk::<4>()
                    .ok_or(BlobError::InvalidValueSize {
                        expected: 4,
                        actual: bytes.len(),
                    })?;
                Ok(Self::Dword(u32::from_le_bytes(*word)))
            }
            other => {
                if other != TYPE_BINARY {
                    trace!(
                        "registry value {} has type {other}, reading as binary",
                        node_name(node)
                    );
                }
                Ok(match &data.value {
                    BlobValue::Raw(bytes) => Self::Binary(bytes.clone()),
                    BlobValue::Nested(blob) => Self::Blob(blob.clone()),
                })
            }
        }
    }
}

/// A registry key with its subkeys and values in stored order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryKey {
    /// Key name
    pub name: String,
    subkeys: Vec<RegistryKey>,
    values: Vec<(String, RegistryValue)>,
}

impl RegistryKey {
    /// Decode a key node and everything below it
    ///
    /// A missing or empty subkey or value section means the key has none.
    pub fn from_node(node: &BlobNode) -> BlobResult<Self> {
        let fields = node.as_blob()?;
        let mut key = Self {
            name: node_name(node),
            ..Self::default()
        };
        for child in section(fields, SUBKEYS)? {
            key.subkeys.push(Self::from_node(child)?);
        }
        for child in section(fields, VALUES)? {
            key.values.push((node_name(child), RegistryValue::from_node(child)?));
        }
        Ok(key)
    }

    /// Subkeys in stored order
    pub fn subkeys(&self) -> &[RegistryKey] {
        &self.subkeys
    }

    /// Values with their names in stored order
    pub fn values(&self) -> impl Iterator<Item = (&str, &RegistryValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Subkey by name; a later duplicate wins
    pub fn subkey(&self, name: &str) -> Option<&Self> {
        self.subkeys.iter().rev().find(|key| key.name == name)
    }

    /// Value by name; a later duplicate wins
    pub fn value(&self, name: &str) -> Option<&RegistryValue> {
        self.values
            .iter()
            .rev()
            .find(|(value_name, _)| value_name == name)
            .map(|(_, value)| value)
    }

    /// Follow a path of subkey names
    pub fn lookup(&self, path: &[&str]) -> Option<&Self> {
        path.iter().try_fold(self, |key, name| key.subkey(name))
    }

    /// Number of subkeys and values
    pub fn len(&self) -> usize {
        self.subkeys.len() + self.values.len()
    }

    /// Whether the key has neither subkeys nor values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Typed view of a client registry blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    root: RegistryKey,
}

impl Registry {
    /// Read the registry below the root key of `blob`
    ///
    /// The root is the `TopKey` node. Without one, the node keyed by the
    /// integer 0 is used, and failing that the first node.
    pub fn from_blob(blob: &Blob) -> BlobResult<Self> {
        let top = blob
            .get_by_name(TOP_KEY)
            .or_else(|| blob.get_by_name("0"))
            .or_else(|| blob.get_by_ordinal_index(0))
            .ok_or_else(|| BlobError::KeyNotFound(TOP_KEY.to_string()))?;
        Ok(Self {
            root: RegistryKey::from_node(top)?,
        })
    }

    /// Decode a blob and read its registry
    pub fn parse(data: &[u8]) -> BlobResult<Self> {
        Self::from_blob(&Blob::parse(data)?)
    }

    /// The root key
    pub fn root(&self) -> &RegistryKey {
        &self.root
    }

    /// Value at a key path, e.g. `["Software", "Valve", "Steam"]` and `"Language"`
    pub fn get(&self, path: &[&str], value: &str) -> Option<&RegistryValue> {
        self.root.lookup(path)?.value(value)
    }
}

/// Nodes of a subkey or value section
fn section<'a>(fields: &'a Blob, name: &str) -> BlobResult<&'a [BlobNode]> {
    match fields.get_by_name(name).map(|node| &node.value) {
        None => Ok(&[]),
        Some(BlobValue::Nested(blob)) => Ok(blob.nodes()),
        Some(BlobValue::Raw(data)) if data.is_empty() => Ok(&[]),
        Some(other) => Err(BlobError::TypeMismatch {
            expected: "nested blob",
            found: other.variant_name(),
        }),
    }
}

fn node_name(node: &BlobNode) -> String {
    until_nul(&node.key).into_owned()
}

fn until_nul(data: &[u8]) -> Cow<'_, str> {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end])
}
