//! Tagged binary value codec.
//!
//! Per DELTA_FORMAT.md §1-§3. Tag assignments follow the historical wire
//! protocol; gaps in the numbering are deliberate and must not be reused.
//!
//! Two decoder policies share one wire format:
//! - **Storage**: never materializes strings or resolves types. Strings come
//!   back as opaque [`Utf8Bytes`] holders, class references as
//!   [`ClassSpec`]s. Used on the server, where payloads are routed, not
//!   interpreted.
//! - **Applicator**: materializes strings (honoring the interned flag
//!   through the injected interner) and resolves class references through
//!   the injected resolver. Used where mutations are applied to live
//!   objects.

use std::io::{self, Read, Write};
use std::sync::Arc;

use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::oid::ObjectId;

use super::resolver::{
    FailingResolver, PassthroughInterner, StringInterner, TypeResolver,
};
use super::value::{ArrayValue, ClassSpec, CompressedMeta, Utf8Bytes, Value};

pub const TAG_REFERENCE: u8 = 1;
pub const TAG_BOOLEAN: u8 = 2;
pub const TAG_BYTE: u8 = 3;
pub const TAG_CHAR: u8 = 4;
pub const TAG_DOUBLE: u8 = 5;
pub const TAG_FLOAT: u8 = 6;
pub const TAG_INT: u8 = 7;
pub const TAG_LONG: u8 = 10;
pub const TAG_SHORT: u8 = 11;
pub const TAG_STRING: u8 = 12;
pub const TAG_STRING_BYTES: u8 = 13;
pub const TAG_ARRAY: u8 = 14;
pub const TAG_CLASS: u8 = 15;
pub const TAG_STRING_COMPRESSED: u8 = 25;
pub const TAG_STRING_INTERNED: u8 = 26;
pub const TAG_STRING_COMPRESSED_INTERNED: u8 = 27;

const ARRAY_KIND_PRIMITIVE: u8 = 1;
const ARRAY_KIND_VALUES: u8 = 2;

/// Byte length at or above which strings are compressed.
pub const DEFAULT_STRING_COMPRESSION_MIN: usize = 512;

/// Decoder policy. See module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecMode {
    Storage,
    Applicator,
}

/// Encoder/decoder for tagged values.
pub struct DeltaCodec {
    mode: CodecMode,
    resolver: Arc<dyn TypeResolver>,
    interner: Arc<dyn StringInterner>,
    compression_min: usize,
}

impl DeltaCodec {
    /// Storage-mode codec: holders in, holders out, no resolution.
    pub fn storage() -> Self {
        Self {
            mode: CodecMode::Storage,
            resolver: Arc::new(FailingResolver),
            interner: Arc::new(PassthroughInterner),
            compression_min: DEFAULT_STRING_COMPRESSION_MIN,
        }
    }

    /// Applicator-mode codec with explicit collaborators.
    pub fn applicator(
        resolver: Arc<dyn TypeResolver>,
        interner: Arc<dyn StringInterner>,
    ) -> Self {
        Self {
            mode: CodecMode::Applicator,
            resolver,
            interner,
            compression_min: DEFAULT_STRING_COMPRESSION_MIN,
        }
    }

    /// Override the compression threshold (bytes).
    pub fn with_compression_min(mut self, min: usize) -> Self {
        self.compression_min = min;
        self
    }

    pub fn mode(&self) -> CodecMode {
        self.mode
    }

    // === Encoding ===

    pub fn encode<W: Write>(&self, value: &Value, out: &mut W) -> io::Result<()> {
        match value {
            // Absent values travel as the null object reference.
            Value::Null => {
                out.write_all(&[TAG_REFERENCE])?;
                out.write_all(&ObjectId::NULL.raw().to_le_bytes())
            }
            Value::Ref(id) => {
                out.write_all(&[TAG_REFERENCE])?;
                out.write_all(&id.raw().to_le_bytes())
            }
            Value::Bool(v) => {
                out.write_all(&[TAG_BOOLEAN])?;
                out.write_all(&[u8::from(*v)])
            }
            Value::I8(v) => {
                out.write_all(&[TAG_BYTE])?;
                out.write_all(&v.to_le_bytes())
            }
            Value::I16(v) => {
                out.write_all(&[TAG_SHORT])?;
                out.write_all(&v.to_le_bytes())
            }
            Value::I32(v) => {
                out.write_all(&[TAG_INT])?;
                out.write_all(&v.to_le_bytes())
            }
            Value::I64(v) => {
                out.write_all(&[TAG_LONG])?;
                out.write_all(&v.to_le_bytes())
            }
            Value::F32(v) => {
                out.write_all(&[TAG_FLOAT])?;
                out.write_all(&v.to_bits().to_le_bytes())
            }
            Value::F64(v) => {
                out.write_all(&[TAG_DOUBLE])?;
                out.write_all(&v.to_bits().to_le_bytes())
            }
            Value::Char(c) => {
                out.write_all(&[TAG_CHAR])?;
                out.write_all(&(*c as u32).to_le_bytes())
            }
            Value::String { text, interned } => self.encode_string(text, *interned, out),
            Value::StringBytes(holder) => encode_holder(holder, out),
            Value::ClassRef(spec) => encode_class(spec, out),
            Value::Class(ty) => encode_class(&self.resolver.describe(ty), out),
            Value::Array(array) => self.encode_array(array, out),
        }
    }

    fn encode_string<W: Write>(&self, text: &str, interned: bool, out: &mut W) -> io::Result<()> {
        let utf8 = text.as_bytes();
        if utf8.len() >= self.compression_min {
            let tag = if interned {
                TAG_STRING_COMPRESSED_INTERNED
            } else {
                TAG_STRING_COMPRESSED
            };
            out.write_all(&[tag])?;
            out.write_all(&(utf8.len() as u32).to_le_bytes())?;
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(utf8)?;
            let deflated = encoder.finish()?;
            write_byte_array(&deflated, out)?;
            // String metadata so consumers can validate without inflating.
            out.write_all(&(text.chars().count() as u32).to_le_bytes())?;
            out.write_all(&crc32fast::hash(utf8).to_le_bytes())
        } else {
            let tag = if interned { TAG_STRING_INTERNED } else { TAG_STRING };
            out.write_all(&[tag])?;
            write_byte_array(utf8, out)
        }
    }

    pub fn encode_array<W: Write>(&self, array: &ArrayValue, out: &mut W) -> io::Result<()> {
        out.write_all(&[TAG_ARRAY])?;
        out.write_all(&(array.len() as i32).to_le_bytes())?;

        match array {
            ArrayValue::Values(values) => {
                out.write_all(&[ARRAY_KIND_VALUES])?;
                for value in values {
                    self.encode(value, out)?;
                }
                Ok(())
            }
            primitive => {
                out.write_all(&[ARRAY_KIND_PRIMITIVE])?;
                encode_primitive_elements(primitive, out)
            }
        }
    }

    // === Decoding ===

    pub fn decode<R: Read>(&self, input: &mut R) -> io::Result<Value> {
        let tag = read_u8(input)?;
        match tag {
            TAG_REFERENCE => {
                let id = ObjectId::new(read_i64(input)?);
                if id.is_null() {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Ref(id))
                }
            }
            TAG_BOOLEAN => Ok(Value::Bool(read_u8(input)? != 0)),
            TAG_BYTE => Ok(Value::I8(read_u8(input)? as i8)),
            TAG_SHORT => Ok(Value::I16(read_i16(input)?)),
            TAG_INT => Ok(Value::I32(read_i32(input)?)),
            TAG_LONG => Ok(Value::I64(read_i64(input)?)),
            TAG_FLOAT => Ok(Value::F32(f32::from_bits(read_u32(input)?))),
            TAG_DOUBLE => Ok(Value::F64(f64::from_bits(read_u64(input)?))),
            TAG_CHAR => Ok(Value::Char(read_char(input)?)),
            TAG_STRING | TAG_STRING_BYTES | TAG_STRING_INTERNED => {
                let interned = tag == TAG_STRING_INTERNED;
                let bytes = read_byte_array(input)?;
                self.finish_string(Utf8Bytes::raw(bytes, interned))
            }
            TAG_STRING_COMPRESSED | TAG_STRING_COMPRESSED_INTERNED => {
                let interned = tag == TAG_STRING_COMPRESSED_INTERNED;
                let uncompressed_len = read_u32(input)?;
                let bytes = read_byte_array(input)?;
                let char_count = read_u32(input)?;
                let hash = read_u32(input)?;
                let meta = CompressedMeta {
                    uncompressed_len,
                    char_count,
                    hash,
                };
                self.finish_string(Utf8Bytes::compressed(bytes, meta, interned))
            }
            TAG_CLASS => {
                let name = read_string(input)?;
                let loader_desc = read_string(input)?;
                let spec = ClassSpec { name, loader_desc };
                match self.mode {
                    CodecMode::Storage => Ok(Value::ClassRef(spec)),
                    CodecMode::Applicator => Ok(Value::Class(self.resolver.resolve(&spec)?)),
                }
            }
            TAG_ARRAY => self.decode_array(input),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown value tag: {}", other),
            )),
        }
    }

    fn finish_string(&self, holder: Utf8Bytes) -> io::Result<Value> {
        match self.mode {
            CodecMode::Storage => Ok(Value::StringBytes(holder)),
            CodecMode::Applicator => {
                let interned = holder.is_interned();
                let text = holder.materialize()?;
                let text = if interned {
                    self.interner.intern(&text)
                } else {
                    Arc::from(text.as_str())
                };
                Ok(Value::String { text, interned })
            }
        }
    }

    fn decode_array<R: Read>(&self, input: &mut R) -> io::Result<Value> {
        let len = read_i32(input)?;
        if len < 0 {
            return Ok(Value::Null);
        }
        let len = len as usize;

        let kind = read_u8(input)?;
        match kind {
            ARRAY_KIND_VALUES => {
                let mut values = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    values.push(self.decode(input)?);
                }
                Ok(Value::Array(ArrayValue::Values(values)))
            }
            ARRAY_KIND_PRIMITIVE => Ok(Value::Array(decode_primitive_elements(len, input)?)),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown array kind: {}", other),
            )),
        }
    }
}

fn encode_class<W: Write>(spec: &ClassSpec, out: &mut W) -> io::Result<()> {
    out.write_all(&[TAG_CLASS])?;
    write_byte_array(spec.name.as_bytes(), out)?;
    write_byte_array(spec.loader_desc.as_bytes(), out)
}

/// Re-emit a holder in exactly the form it was decoded from, so storage
/// nodes forward strings without re-encoding.
fn encode_holder<W: Write>(holder: &Utf8Bytes, out: &mut W) -> io::Result<()> {
    match holder.compression() {
        Some(meta) => {
            let tag = if holder.is_interned() {
                TAG_STRING_COMPRESSED_INTERNED
            } else {
                TAG_STRING_COMPRESSED
            };
            out.write_all(&[tag])?;
            out.write_all(&meta.uncompressed_len.to_le_bytes())?;
            write_byte_array(holder.bytes(), out)?;
            out.write_all(&meta.char_count.to_le_bytes())?;
            out.write_all(&meta.hash.to_le_bytes())
        }
        None => {
            let tag = if holder.is_interned() {
                TAG_STRING_INTERNED
            } else {
                TAG_STRING
            };
            out.write_all(&[tag])?;
            write_byte_array(holder.bytes(), out)
        }
    }
}

fn encode_primitive_elements<W: Write>(array: &ArrayValue, out: &mut W) -> io::Result<()> {
    match array {
        ArrayValue::Bool(v) => {
            out.write_all(&[TAG_BOOLEAN])?;
            for b in v {
                out.write_all(&[u8::from(*b)])?;
            }
        }
        ArrayValue::Bytes(v) => {
            out.write_all(&[TAG_BYTE])?;
            out.write_all(v)?;
        }
        ArrayValue::Chars(v) => {
            out.write_all(&[TAG_CHAR])?;
            for c in v {
                out.write_all(&(*c as u32).to_le_bytes())?;
            }
        }
        ArrayValue::I16(v) => {
            out.write_all(&[TAG_SHORT])?;
            for x in v {
                out.write_all(&x.to_le_bytes())?;
            }
        }
        ArrayValue::I32(v) => {
            out.write_all(&[TAG_INT])?;
            for x in v {
                out.write_all(&x.to_le_bytes())?;
            }
        }
        ArrayValue::I64(v) => {
            out.write_all(&[TAG_LONG])?;
            for x in v {
                out.write_all(&x.to_le_bytes())?;
            }
        }
        ArrayValue::F32(v) => {
            out.write_all(&[TAG_FLOAT])?;
            for x in v {
                out.write_all(&x.to_bits().to_le_bytes())?;
            }
        }
        ArrayValue::F64(v) => {
            out.write_all(&[TAG_DOUBLE])?;
            for x in v {
                out.write_all(&x.to_bits().to_le_bytes())?;
            }
        }
        ArrayValue::Values(_) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "value arrays are not primitive",
            ));
        }
    }
    Ok(())
}

fn decode_primitive_elements<R: Read>(len: usize, input: &mut R) -> io::Result<ArrayValue> {
    let elem = read_u8(input)?;
    match elem {
        TAG_BOOLEAN => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(read_u8(input)? != 0);
            }
            Ok(ArrayValue::Bool(v))
        }
        TAG_BYTE => {
            // A zero-length array must not touch the stream at all.
            let mut v = vec![0u8; len];
            if len != 0 {
                input.read_exact(&mut v)?;
            }
            Ok(ArrayValue::Bytes(v))
        }
        TAG_CHAR => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(read_char(input)?);
            }
            Ok(ArrayValue::Chars(v))
        }
        TAG_SHORT => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(read_i16(input)?);
            }
            Ok(ArrayValue::I16(v))
        }
        TAG_INT => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(read_i32(input)?);
            }
            Ok(ArrayValue::I32(v))
        }
        TAG_LONG => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(read_i64(input)?);
            }
            Ok(ArrayValue::I64(v))
        }
        TAG_FLOAT => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(f32::from_bits(read_u32(input)?));
            }
            Ok(ArrayValue::F32(v))
        }
        TAG_DOUBLE => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(f64::from_bits(read_u64(input)?));
            }
            Ok(ArrayValue::F64(v))
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown primitive array element tag: {}", other),
        )),
    }
}

// === Shared byte-level helpers ===

pub(super) fn write_byte_array<W: Write>(bytes: &[u8], out: &mut W) -> io::Result<()> {
    out.write_all(&(bytes.len() as u32).to_le_bytes())?;
    out.write_all(bytes)
}

pub(super) fn read_byte_array<R: Read>(input: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u32(input)? as usize;
    let mut bytes = vec![0u8; len];
    if len != 0 {
        input.read_exact(&mut bytes)?;
    }
    Ok(bytes)
}

pub(super) fn read_string<R: Read>(input: &mut R) -> io::Result<String> {
    let bytes = read_byte_array(input)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub(super) fn read_u8<R: Read>(input: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub(super) fn read_i16<R: Read>(input: &mut R) -> io::Result<i16> {
    let mut buf = [0u8; 2];
    input.read_exact(&mut buf)?;
    Ok(i16::from_le_bytes(buf))
}

pub(super) fn read_i32<R: Read>(input: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

pub(super) fn read_u32<R: Read>(input: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(super) fn read_i64<R: Read>(input: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

pub(super) fn read_u64<R: Read>(input: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_char<R: Read>(input: &mut R) -> io::Result<char> {
    let raw = read_u32(input)?;
    char::from_u32(raw).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid character scalar: {:#x}", raw),
        )
    })
}
