//! Value model for delta encoding.
//!
//! Per DELTA_FORMAT.md §1: scalar primitives and their arrays, object
//! references, class references, and character strings in three binary
//! forms (raw, compressed, either one interned).

use std::io::{self, Read};
use std::sync::Arc;

use flate2::read::DeflateDecoder;

use crate::oid::ObjectId;

use super::resolver::TypeDescriptor;

/// A type name plus its defining-loader description, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassSpec {
    pub name: String,
    pub loader_desc: String,
}

impl ClassSpec {
    pub fn new(name: impl Into<String>, loader_desc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            loader_desc: loader_desc.into(),
        }
    }
}

/// Metadata carried alongside a compressed string so consumers can validate
/// it without decompressing. Per DELTA_FORMAT.md §2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedMeta {
    /// Length of the UTF-8 encoding before compression.
    pub uncompressed_len: u32,
    /// Number of characters in the original string.
    pub char_count: u32,
    /// CRC32 of the uncompressed UTF-8 bytes.
    pub hash: u32,
}

/// Opaque string holder produced by the storage-mode decoder.
///
/// Defers interning and decompression to the consumer; a holder re-encodes
/// to exactly the bytes it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utf8Bytes {
    bytes: Vec<u8>,
    compressed: Option<CompressedMeta>,
    interned: bool,
}

impl Utf8Bytes {
    pub fn raw(bytes: Vec<u8>, interned: bool) -> Self {
        Self {
            bytes,
            compressed: None,
            interned,
        }
    }

    pub fn compressed(bytes: Vec<u8>, meta: CompressedMeta, interned: bool) -> Self {
        Self {
            bytes,
            compressed: Some(meta),
            interned,
        }
    }

    /// The stored bytes: UTF-8 for the raw form, DEFLATE output for the
    /// compressed form.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn compression(&self) -> Option<&CompressedMeta> {
        self.compressed.as_ref()
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed.is_some()
    }

    pub fn is_interned(&self) -> bool {
        self.interned
    }

    /// Decode into the final string, inflating and validating if needed.
    pub fn materialize(&self) -> io::Result<String> {
        match &self.compressed {
            None => String::from_utf8(self.bytes.clone())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Some(meta) => {
                let mut inflated = Vec::with_capacity(meta.uncompressed_len as usize);
                DeflateDecoder::new(&self.bytes[..]).read_to_end(&mut inflated)?;
                if inflated.len() != meta.uncompressed_len as usize {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "inflated string length {} does not match recorded {}",
                            inflated.len(),
                            meta.uncompressed_len
                        ),
                    ));
                }
                if crc32fast::hash(&inflated) != meta.hash {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "inflated string content hash mismatch",
                    ));
                }
                let text = String::from_utf8(inflated)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                if text.chars().count() != meta.char_count as usize {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "inflated string character count mismatch",
                    ));
                }
                Ok(text)
            }
        }
    }
}

/// One encodable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value. Encoded as a reference to [`ObjectId::NULL`].
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Char(char),
    /// Reference to another shared object.
    Ref(ObjectId),
    /// Materialized string (applicator-mode decode result).
    String { text: Arc<str>, interned: bool },
    /// Opaque holder (storage-mode decode result).
    StringBytes(Utf8Bytes),
    /// Unresolved class reference (storage-mode decode result).
    ClassRef(ClassSpec),
    /// Resolved class reference (applicator-mode decode result).
    Class(Arc<TypeDescriptor>),
    Array(ArrayValue),
}

impl Value {
    pub fn string(text: impl AsRef<str>) -> Value {
        Value::String {
            text: Arc::from(text.as_ref()),
            interned: false,
        }
    }

    pub fn interned_string(text: impl AsRef<str>) -> Value {
        Value::String {
            text: Arc::from(text.as_ref()),
            interned: true,
        }
    }

    /// The referenced object, when this value is a non-null reference.
    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Value::Ref(id) if !id.is_null() => Some(*id),
            _ => None,
        }
    }
}

/// A homogeneous array value. Length-prefixed on the wire; zero-length
/// arrays are legal and decode without touching the stream again.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    Bool(Vec<bool>),
    Bytes(Vec<u8>),
    Chars(Vec<char>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// Non-primitive elements, each a full tagged value.
    Values(Vec<Value>),
}

impl ArrayValue {
    pub fn len(&self) -> usize {
        match self {
            ArrayValue::Bool(v) => v.len(),
            ArrayValue::Bytes(v) => v.len(),
            ArrayValue::Chars(v) => v.len(),
            ArrayValue::I16(v) => v.len(),
            ArrayValue::I32(v) => v.len(),
            ArrayValue::I64(v) => v.len(),
            ArrayValue::F32(v) => v.len(),
            ArrayValue::F64(v) => v.len(),
            ArrayValue::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
