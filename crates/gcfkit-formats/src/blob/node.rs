//! Blob node and value types

use std::borrow::Cow;

use super::Blob;
use super::error::{BlobError, BlobResult};

/// Value carried by a blob node
///
/// The format has no type tag: whether a value is a nested tree is decided
/// by sniffing its leading magic during decoding (see [`super::classify`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobValue {
    /// Opaque payload bytes
    Raw(Vec<u8>),
    /// Payload that decoded as a tree of its own
    Nested(Blob),
}

impl BlobValue {
    pub(crate) fn variant_name(&self) -> &'static str {
        match self {
            Self::Raw(_) => "raw bytes",
            Self::Nested(_) => "nested blob",
        }
    }
}

/// A single key/value entry of a [`Blob`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobNode {
    /// Key bytes as stored
    pub key: Vec<u8>,
    /// Node value
    pub value: BlobValue,
}

impl BlobNode {
    /// Create a node with a raw payload
    pub fn raw(key: impl Into<Vec<u8>>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: BlobValue::Raw(data.into()),
        }
    }

    /// Create a node holding a nested tree
    pub fn nested(key: impl Into<Vec<u8>>, blob: Blob) -> Self {
        Self {
            key: key.into(),
            value: BlobValue::Nested(blob),
        }
    }

    /// Create a node keyed by a little-endian 32-bit integer
    pub fn with_int_key(key: i32, value: BlobValue) -> Self {
        Self {
            key: key.to_le_bytes().to_vec(),
            value,
        }
    }

    /// Whether the value is a nested tree
    pub fn is_nested(&self) -> bool {
        matches!(self.value, BlobValue::Nested(_))
    }

    /// Raw payload, failing if the value is a nested tree
    pub fn as_bytes(&self) -> BlobResult<&[u8]> {
        match &self.value {
            BlobValue::Raw(data) => Ok(data),
            other @ BlobValue::Nested(_) => Err(BlobError::TypeMismatch {
                expected: "raw bytes",
                found: other.variant_name(),
            }),
        }
    }

    /// Nested tree, failing if the value is raw bytes
    pub fn as_blob(&self) -> BlobResult<&Blob> {
        match &self.value {
            BlobValue::Nested(blob) => Ok(blob),
            other @ BlobValue::Raw(_) => Err(BlobError::TypeMismatch {
                expected: "nested blob",
                found: other.variant_name(),
            }),
        }
    }

    /// Payload interpreted as a little-endian `u32`
    pub fn as_u32(&self) -> BlobResult<u32> {
        Ok(u32::from_le_bytes(fixed::<4>(self.as_bytes()?)?))
    }

    /// Payload interpreted as a little-endian `i32`
    pub fn as_i32(&self) -> BlobResult<i32> {
        Ok(i32::from_le_bytes(fixed::<4>(self.as_bytes()?)?))
    }

    /// Payload interpreted as a little-endian `u16`
    pub fn as_u16(&self) -> BlobResult<u16> {
        Ok(u16::from_le_bytes(fixed::<2>(self.as_bytes()?)?))
    }

    /// Payload interpreted as a single byte
    pub fn as_u8(&self) -> BlobResult<u8> {
        Ok(fixed::<1>(self.as_bytes()?)?[0])
    }

    /// Payload as text with trailing NUL bytes removed
    pub fn as_str(&self) -> BlobResult<Cow<'_, str>> {
        let data = self.as_bytes()?;
        let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        Ok(String::from_utf8_lossy(&data[..end]))
    }

    /// Key interpreted as a little-endian `i32`, when it is exactly four bytes
    pub fn key_as_i32(&self) -> Option<i32> {
        <[u8; 4]>::try_from(self.key.as_slice())
            .ok()
            .map(i32::from_le_bytes)
    }

    /// Key as used for name lookups
    ///
    /// Four-byte keys are integers and render as their decimal text; any
    /// other key is returned as stored.
    pub fn smart_key(&self) -> Cow<'_, [u8]> {
        match self.key_as_i32() {
            Some(n) => Cow::Owned(n.to_string().into_bytes()),
            None => Cow::Borrowed(&self.key),
        }
    }

    /// Number of children for nested values, payload length otherwise
    pub fn len(&self) -> usize {
        match &self.value {
            BlobValue::Raw(data) => data.len(),
            BlobValue::Nested(blob) => blob.len(),
        }
    }

    /// Whether [`Self::len`] is zero
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn fixed<const N: usize>(data: &[u8]) -> BlobResult<[u8; N]> {
    <[u8; N]>::try_from(data).map_err(|_| BlobError::InvalidValueSize {
        expected: N,
        actual: data.len(),
    })
}
