//! Delta record reader.
//!
//! Parses the frame written by [`DeltaWriter`](super::writer::DeltaWriter),
//! verifying length and checksum up front, then replays actions through a
//! forward-only cursor. Each action is visited exactly once in write order;
//! there is no rewind.

use std::io::{self, Cursor};

use crate::oid::ObjectId;

use super::codec::{read_byte_array, read_string, read_u32, DeltaCodec};
use super::errors::{DeltaError, DeltaResult};
use super::record::{
    DeltaAction, DeltaRecord, LogicalAction, LogicalOp, PhysicalAction, NULL_ARRAY_LENGTH,
};
use super::value::ClassSpec;
use super::writer::{
    ACTION_LOGICAL, ACTION_PHYSICAL, FLAG_HAS_ARRAY_LENGTH, FLAG_HAS_PARENT, FLAG_IS_DELTA,
    SECTION_END,
};

/// Header + action cursor over one wire frame.
pub struct DeltaReader<'a> {
    codec: &'a DeltaCodec,
    object_id: ObjectId,
    version: u64,
    type_spec: Option<ClassSpec>,
    parent: ObjectId,
    array_length: i32,
    is_delta: bool,
    action_count: u32,
    consumed: u32,
    actions: Cursor<Vec<u8>>,
    current: Option<DeltaAction>,
}

impl<'a> DeltaReader<'a> {
    /// Parse and validate a frame. Returns the reader and the number of
    /// bytes consumed, so frames can be streamed back to back.
    pub fn parse(codec: &'a DeltaCodec, data: &[u8]) -> io::Result<(DeltaReader<'a>, usize)> {
        // frame_len + header_len + flags + id + version + count + end + crc
        const MIN_FRAME: usize = 4 + 4 + 1 + 8 + 8 + 4 + 1 + 4;
        if data.len() < MIN_FRAME {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "delta frame too short",
            ));
        }

        let frame_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if frame_len < MIN_FRAME {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid delta frame length: {}", frame_len),
            ));
        }
        if data.len() < frame_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "delta frame truncated: expected {} bytes, got {}",
                    frame_len,
                    data.len()
                ),
            ));
        }

        let crc_offset = frame_len - 4;
        let stored_crc = u32::from_le_bytes([
            data[crc_offset],
            data[crc_offset + 1],
            data[crc_offset + 2],
            data[crc_offset + 3],
        ]);
        let computed_crc = crc32fast::hash(&data[..crc_offset]);
        if stored_crc != computed_crc {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "delta frame checksum mismatch: computed {:08x}, stored {:08x}",
                    computed_crc, stored_crc
                ),
            ));
        }
        if data[crc_offset - 1] != SECTION_END {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "delta frame missing section-end marker",
            ));
        }

        let header_len = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
        let header_end = 8usize.checked_add(header_len).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "delta header length overflow")
        })?;
        // Header, action count, and the section-end marker must all fit
        // before the checksum.
        if header_end + 4 + 1 > crc_offset {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "delta header length exceeds frame",
            ));
        }

        let mut header = Cursor::new(&data[8..header_end]);
        let flags = {
            let mut b = [0u8; 1];
            io::Read::read_exact(&mut header, &mut b)?;
            b[0]
        };
        let object_id = ObjectId::new(super::codec::read_i64(&mut header)?);
        let version = super::codec::read_u64(&mut header)?;
        let parent = if flags & FLAG_HAS_PARENT != 0 {
            ObjectId::new(super::codec::read_i64(&mut header)?)
        } else {
            ObjectId::NULL
        };
        let array_length = if flags & FLAG_HAS_ARRAY_LENGTH != 0 {
            super::codec::read_i32(&mut header)?
        } else {
            NULL_ARRAY_LENGTH
        };
        let is_delta = flags & FLAG_IS_DELTA != 0;
        let type_spec = if is_delta {
            None
        } else {
            let name = read_string(&mut header)?;
            let loader_desc = read_string(&mut header)?;
            Some(ClassSpec { name, loader_desc })
        };
        if flags & FLAG_HAS_PARENT != 0 && flags & FLAG_HAS_ARRAY_LENGTH != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "delta header carries both parent and array length",
            ));
        }

        let mut body = Cursor::new(&data[header_end..crc_offset - 1]);
        let action_count = read_u32(&mut body)?;
        let actions_start = header_end + 4;
        let actions = data[actions_start..crc_offset - 1].to_vec();

        Ok((
            DeltaReader {
                codec,
                object_id,
                version,
                type_spec,
                parent,
                array_length,
                is_delta,
                action_count,
                consumed: 0,
                actions: Cursor::new(actions),
                current: None,
            },
            frame_len,
        ))
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_delta(&self) -> bool {
        self.is_delta
    }

    pub fn type_spec(&self) -> Option<&ClassSpec> {
        self.type_spec.as_ref()
    }

    pub fn parent_id(&self) -> ObjectId {
        self.parent
    }

    pub fn has_parent(&self) -> bool {
        !self.parent.is_null()
    }

    pub fn has_length(&self) -> bool {
        self.array_length != NULL_ARRAY_LENGTH
    }

    pub fn array_length(&self) -> i32 {
        self.array_length
    }

    pub fn action_count(&self) -> u32 {
        self.action_count
    }

    /// Advance to the next action. Returns false once all actions have been
    /// visited; the previous action is discarded either way.
    pub fn next(&mut self) -> io::Result<bool> {
        self.current = None;
        if self.consumed == self.action_count {
            return Ok(false);
        }
        let tag = super::codec::read_u8(&mut self.actions)?;
        let action = match tag {
            ACTION_PHYSICAL => {
                let field_bytes = read_byte_array(&mut self.actions)?;
                let field = String::from_utf8(field_bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                let is_reference = super::codec::read_u8(&mut self.actions)? != 0;
                let value = self.codec.decode(&mut self.actions)?;
                DeltaAction::Physical(PhysicalAction {
                    field,
                    value,
                    is_reference,
                })
            }
            ACTION_LOGICAL => {
                let raw_op = super::codec::read_u8(&mut self.actions)?;
                let op = LogicalOp::from_u8(raw_op).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("unknown logical operation code: {}", raw_op),
                    )
                })?;
                let param_count = read_u32(&mut self.actions)?;
                let mut params = Vec::with_capacity(param_count.min(64) as usize);
                for _ in 0..param_count {
                    params.push(self.codec.decode(&mut self.actions)?);
                }
                DeltaAction::Logical(LogicalAction { op, params })
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown action tag: {}", other),
                ));
            }
        };
        self.consumed += 1;
        self.current = Some(action);
        Ok(true)
    }

    /// The current action's physical payload.
    pub fn physical_action(&self) -> DeltaResult<&PhysicalAction> {
        match &self.current {
            Some(DeltaAction::Physical(action)) => Ok(action),
            Some(other) => Err(DeltaError::WrongActionVariant {
                expected: "physical",
                actual: other.variant_name(),
            }),
            None => Err(DeltaError::NoCurrentAction),
        }
    }

    /// The current action's logical payload.
    pub fn logical_action(&self) -> DeltaResult<&LogicalAction> {
        match &self.current {
            Some(DeltaAction::Logical(action)) => Ok(action),
            Some(other) => Err(DeltaError::WrongActionVariant {
                expected: "logical",
                actual: other.variant_name(),
            }),
            None => Err(DeltaError::NoCurrentAction),
        }
    }

    /// Drain the remaining actions into an in-memory record.
    pub fn into_record(mut self) -> io::Result<DeltaRecord> {
        let mut record = match &self.type_spec {
            Some(spec) => DeltaRecord::full(self.object_id, self.version, spec.clone()),
            None => DeltaRecord::delta(self.object_id, self.version),
        };
        if self.has_parent() {
            record = record.with_parent(self.parent)?;
        }
        if self.has_length() {
            record = record.with_array_length(self.array_length)?;
        }
        while self.next()? {
            match self.current.take() {
                Some(DeltaAction::Physical(p)) => {
                    record.push_physical(p.field, p.value, p.is_reference)
                }
                Some(DeltaAction::Logical(l)) => record.push_logical(l.op, l.params),
                None => break,
            }
        }
        Ok(record)
    }
}
