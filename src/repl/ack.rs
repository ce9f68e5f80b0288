//! Acknowledgement tuples and batches.
//!
//! Per REPLICATION_STREAM.md §3:
//! - RECEIVED: durably queued on the passive
//! - SUCCESS: applied
//! - FAIL: rejected; fatal to that activity, surfaced, never retried
//!
//! Acks travel batched for efficiency.

use std::io::{self, Read, Write};

use super::activity::ActivityId;

/// Result code for one activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResultCode {
    Received = 1,
    Success = 2,
    Fail = 3,
}

impl ResultCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(ResultCode::Received),
            2 => Some(ResultCode::Success),
            3 => Some(ResultCode::Fail),
            _ => None,
        }
    }
}

/// A batch of (activity, result) tuples.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AckBatch {
    pub entries: Vec<(ActivityId, ResultCode)>,
}

impl AckBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: ActivityId, code: ResultCode) {
        self.entries.push((id, code));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize: u32 count, then (u64 id, u8 code) tuples.
    pub fn serialize_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&(self.entries.len() as u32).to_le_bytes())?;
        for (id, code) in &self.entries {
            out.write_all(&id.value().to_le_bytes())?;
            out.write_all(&[code.as_u8()])?;
        }
        Ok(())
    }

    pub fn deserialize_from<R: Read>(input: &mut R) -> io::Result<AckBatch> {
        let mut count_buf = [0u8; 4];
        input.read_exact(&mut count_buf)?;
        let count = u32::from_le_bytes(count_buf);

        let mut entries = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            let mut id_buf = [0u8; 8];
            input.read_exact(&mut id_buf)?;
            let mut code_buf = [0u8; 1];
            input.read_exact(&mut code_buf)?;
            let code = ResultCode::from_u8(code_buf[0]).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown ack result code: {}", code_buf[0]),
                )
            })?;
            entries.push((ActivityId::new(u64::from_le_bytes(id_buf)), code));
        }
        Ok(AckBatch { entries })
    }
}
