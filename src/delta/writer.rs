//! Delta record writer.
//!
//! Per DELTA_FORMAT.md §4: the frame is
//!
//! - frame length (u32 LE, includes itself and the checksum)
//! - header length (u32 LE), written exactly once, when the header is
//!   finalized
//! - header: flags (u8), object id (i64), version (u64), then parent id
//!   (i64) or array length (i32) per the flags, then type name + loader
//!   description for full records
//! - action count (u32) followed by the tagged actions in append order
//! - section-end marker (u8)
//! - CRC32 (u32) over everything before it
//!
//! Actions are encoded eagerly as they are appended; `finish` assembles the
//! header exactly once and seals the record.

use super::codec::{write_byte_array, DeltaCodec};
use super::errors::{DeltaError, DeltaResult};
use super::record::{DeltaAction, DeltaRecord, LogicalOp, NULL_ARRAY_LENGTH};
use super::value::{ClassSpec, Value};

use crate::oid::ObjectId;

pub(super) const FLAG_IS_DELTA: u8 = 0x01;
pub(super) const FLAG_HAS_PARENT: u8 = 0x02;
pub(super) const FLAG_HAS_ARRAY_LENGTH: u8 = 0x04;

pub(super) const ACTION_LOGICAL: u8 = 1;
pub(super) const ACTION_PHYSICAL: u8 = 2;
pub(super) const SECTION_END: u8 = 0xEE;

/// Accumulates one object's actions and seals them into a wire frame.
pub struct DeltaWriter<'a> {
    codec: &'a DeltaCodec,
    object_id: ObjectId,
    version: u64,
    type_spec: Option<ClassSpec>,
    parent: ObjectId,
    array_length: i32,
    is_delta: bool,
    actions: Vec<u8>,
    action_count: u32,
}

impl<'a> DeltaWriter<'a> {
    /// Writer for a delta-only record (type omitted).
    pub fn delta(codec: &'a DeltaCodec, object_id: ObjectId, version: u64) -> Self {
        Self {
            codec,
            object_id,
            version,
            type_spec: None,
            parent: ObjectId::NULL,
            array_length: NULL_ARRAY_LENGTH,
            is_delta: true,
            actions: Vec::new(),
            action_count: 0,
        }
    }

    /// Writer for a full record carrying the object's type.
    pub fn full(
        codec: &'a DeltaCodec,
        object_id: ObjectId,
        version: u64,
        type_spec: ClassSpec,
    ) -> Self {
        Self {
            type_spec: Some(type_spec),
            is_delta: false,
            ..Self::delta(codec, object_id, version)
        }
    }

    pub fn set_parent(&mut self, parent: ObjectId) -> DeltaResult<()> {
        if self.array_length != NULL_ARRAY_LENGTH {
            return Err(DeltaError::ConflictingContainment);
        }
        self.parent = parent;
        Ok(())
    }

    pub fn set_array_length(&mut self, length: i32) -> DeltaResult<()> {
        if !self.parent.is_null() {
            return Err(DeltaError::ConflictingContainment);
        }
        self.array_length = length;
        Ok(())
    }

    pub fn append_physical(
        &mut self,
        field: &str,
        value: &Value,
        is_reference: bool,
    ) -> DeltaResult<()> {
        self.actions.push(ACTION_PHYSICAL);
        write_byte_array(field.as_bytes(), &mut self.actions)?;
        self.actions.push(u8::from(is_reference));
        self.codec.encode(value, &mut self.actions)?;
        self.action_count += 1;
        Ok(())
    }

    pub fn append_logical(&mut self, op: LogicalOp, params: &[Value]) -> DeltaResult<()> {
        self.actions.push(ACTION_LOGICAL);
        self.actions.push(op.as_u8());
        self.actions
            .extend_from_slice(&(params.len() as u32).to_le_bytes());
        for param in params {
            self.codec.encode(param, &mut self.actions)?;
        }
        self.action_count += 1;
        Ok(())
    }

    /// Finalize the header and seal the frame. Consuming `self` makes a
    /// second finalize unrepresentable.
    pub fn finish(self) -> DeltaResult<Vec<u8>> {
        let mut header = Vec::with_capacity(32);

        let mut flags = 0u8;
        if self.is_delta {
            flags |= FLAG_IS_DELTA;
        }
        if !self.parent.is_null() {
            flags |= FLAG_HAS_PARENT;
        }
        if self.array_length != NULL_ARRAY_LENGTH {
            flags |= FLAG_HAS_ARRAY_LENGTH;
        }
        header.push(flags);
        header.extend_from_slice(&self.object_id.raw().to_le_bytes());
        header.extend_from_slice(&self.version.to_le_bytes());
        if flags & FLAG_HAS_PARENT != 0 {
            header.extend_from_slice(&self.parent.raw().to_le_bytes());
        }
        if flags & FLAG_HAS_ARRAY_LENGTH != 0 {
            header.extend_from_slice(&self.array_length.to_le_bytes());
        }
        if let Some(spec) = &self.type_spec {
            write_byte_array(spec.name.as_bytes(), &mut header)?;
            write_byte_array(spec.loader_desc.as_bytes(), &mut header)?;
        }

        // frame_len + header_len + header + count + actions + end + crc
        let frame_len = 4 + 4 + header.len() + 4 + self.actions.len() + 1 + 4;

        let mut frame = Vec::with_capacity(frame_len);
        frame.extend_from_slice(&(frame_len as u32).to_le_bytes());
        frame.extend_from_slice(&(header.len() as u32).to_le_bytes());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&self.action_count.to_le_bytes());
        frame.extend_from_slice(&self.actions);
        frame.push(SECTION_END);

        let crc = crc32fast::hash(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }
}

/// Encode an in-memory record into a wire frame.
pub fn encode_record(codec: &DeltaCodec, record: &DeltaRecord) -> DeltaResult<Vec<u8>> {
    let mut writer = match record.type_spec() {
        Some(spec) => DeltaWriter::full(
            codec,
            record.object_id(),
            record.version(),
            spec.clone(),
        ),
        None => DeltaWriter::delta(codec, record.object_id(), record.version()),
    };
    if record.has_parent() {
        writer.set_parent(record.parent_id())?;
    }
    if record.has_length() {
        writer.set_array_length(record.array_length())?;
    }
    for action in record.actions() {
        match action {
            DeltaAction::Physical(p) => {
                writer.append_physical(&p.field, &p.value, p.is_reference)?
            }
            DeltaAction::Logical(l) => writer.append_logical(l.op, &l.params)?,
        }
    }
    writer.finish()
}
