//! Replication wire messages.
//!
//! Per REPLICATION_STREAM.md §1: REPLICATE carries one activity, RESPONSE
//! carries an ack batch. Each message embeds its own sequence number,
//! independent of the transport layer's sequencing, so the passive can
//! restore order after transport-level reordering. Frames follow the
//! length-prefix + CRC32-trailer layout used everywhere on the wire.

use std::io::{self, Cursor, Read, Write};

use crate::txn::{ClientId, TransactionId};

use super::ack::AckBatch;
use super::activity::{ActivityId, ActivityType, EntityDescriptor, SyncReplicationActivity};

const MSG_REPLICATE: u8 = 1;
const MSG_RESPONSE: u8 = 2;

/// One replication-channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationPayload {
    Replicate(SyncReplicationActivity),
    Response(AckBatch),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationMessage {
    /// Channel-level sequence, assigned by the sender.
    pub sequence: u64,
    pub payload: ReplicationPayload,
}

impl ReplicationMessage {
    pub fn replicate(sequence: u64, activity: SyncReplicationActivity) -> Self {
        Self {
            sequence,
            payload: ReplicationPayload::Replicate(activity),
        }
    }

    pub fn response(sequence: u64, batch: AckBatch) -> Self {
        Self {
            sequence,
            payload: ReplicationPayload::Response(batch),
        }
    }

    /// Serialize: u32 frame length, u64 sequence, u8 payload tag, payload,
    /// u32 CRC32 over everything before it.
    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let mut body = Vec::with_capacity(64);
        body.extend_from_slice(&self.sequence.to_le_bytes());
        match &self.payload {
            ReplicationPayload::Replicate(activity) => {
                body.push(MSG_REPLICATE);
                write_activity(activity, &mut body)?;
            }
            ReplicationPayload::Response(batch) => {
                body.push(MSG_RESPONSE);
                batch.serialize_to(&mut body)?;
            }
        }

        let frame_len = 4 + body.len() + 4;
        let mut frame = Vec::with_capacity(frame_len);
        frame.extend_from_slice(&(frame_len as u32).to_le_bytes());
        frame.extend_from_slice(&body);
        let crc = crc32fast::hash(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }

    /// Deserialize one frame, verifying length and checksum.
    pub fn deserialize(data: &[u8]) -> io::Result<(ReplicationMessage, usize)> {
        const MIN_FRAME: usize = 4 + 8 + 1 + 4;
        if data.len() < MIN_FRAME {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "replication frame too short",
            ));
        }
        let frame_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if frame_len < MIN_FRAME || data.len() < frame_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "replication frame truncated",
            ));
        }
        let crc_offset = frame_len - 4;
        let stored = u32::from_le_bytes([
            data[crc_offset],
            data[crc_offset + 1],
            data[crc_offset + 2],
            data[crc_offset + 3],
        ]);
        let computed = crc32fast::hash(&data[..crc_offset]);
        if stored != computed {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "replication frame checksum mismatch: computed {:08x}, stored {:08x}",
                    computed, stored
                ),
            ));
        }

        let mut body = Cursor::new(&data[4..crc_offset]);
        let sequence = read_u64(&mut body)?;
        let tag = read_u8(&mut body)?;
        let payload = match tag {
            MSG_REPLICATE => ReplicationPayload::Replicate(read_activity(&mut body)?),
            MSG_RESPONSE => ReplicationPayload::Response(AckBatch::deserialize_from(&mut body)?),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown replication message tag: {}", other),
                ));
            }
        };
        Ok((ReplicationMessage { sequence, payload }, frame_len))
    }
}

fn write_activity<W: Write>(activity: &SyncReplicationActivity, out: &mut W) -> io::Result<()> {
    out.write_all(&activity.id.value().to_le_bytes())?;
    write_bytes(activity.entity.name.as_bytes(), out)?;
    out.write_all(activity.source.uuid().as_bytes())?;
    out.write_all(&activity.txn.value().to_le_bytes())?;
    out.write_all(&activity.oldest_pending_txn.value().to_le_bytes())?;
    out.write_all(&[activity.kind.as_u8()])?;
    write_bytes(&activity.payload, out)?;
    match activity.concurrency_key {
        Some(key) => {
            out.write_all(&[1])?;
            out.write_all(&key.to_le_bytes())?;
        }
        None => out.write_all(&[0])?,
    }
    Ok(())
}

fn read_activity<R: Read>(input: &mut R) -> io::Result<SyncReplicationActivity> {
    let id = ActivityId::new(read_u64(input)?);
    let name_bytes = read_bytes(input)?;
    let name = String::from_utf8(name_bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut uuid_bytes = [0u8; 16];
    input.read_exact(&mut uuid_bytes)?;
    let source = ClientId::from_uuid(uuid::Uuid::from_bytes(uuid_bytes));
    let txn = TransactionId::new(read_u64(input)?);
    let oldest_pending_txn = TransactionId::new(read_u64(input)?);
    let raw_kind = read_u8(input)?;
    let kind = ActivityType::from_u8(raw_kind).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown activity type: {}", raw_kind),
        )
    })?;
    let payload = read_bytes(input)?;
    let concurrency_key = match read_u8(input)? {
        0 => None,
        1 => {
            let mut key_buf = [0u8; 4];
            input.read_exact(&mut key_buf)?;
            Some(i32::from_le_bytes(key_buf))
        }
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid concurrency-key flag: {}", other),
            ));
        }
    };

    Ok(SyncReplicationActivity {
        id,
        entity: EntityDescriptor { name },
        source,
        txn,
        oldest_pending_txn,
        kind,
        payload,
        concurrency_key,
    })
}

fn write_bytes<W: Write>(bytes: &[u8], out: &mut W) -> io::Result<()> {
    out.write_all(&(bytes.len() as u32).to_le_bytes())?;
    out.write_all(bytes)
}

fn read_bytes<R: Read>(input: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    input.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut bytes = vec![0u8; len];
    if len != 0 {
        input.read_exact(&mut bytes)?;
    }
    Ok(bytes)
}

fn read_u8<R: Read>(input: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u64<R: Read>(input: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repl::ack::ResultCode;

    fn sample_activity() -> SyncReplicationActivity {
        SyncReplicationActivity::invoke(
            EntityDescriptor::named("bin-map"),
            ClientId::generate(),
            TransactionId::new(7),
            TransactionId::new(3),
            vec![9, 8, 7],
        )
        .with_id(ActivityId::new(21))
    }

    #[test]
    fn test_replicate_round_trip() {
        let message = ReplicationMessage::replicate(5, sample_activity());
        let bytes = message.serialize().unwrap();
        let (back, consumed) = ReplicationMessage::deserialize(&bytes).unwrap();
        assert_eq!(back, message);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_response_round_trip() {
        let mut batch = AckBatch::new();
        batch.push(ActivityId::new(21), ResultCode::Received);
        batch.push(ActivityId::new(21), ResultCode::Success);
        let message = ReplicationMessage::response(6, batch);
        let bytes = message.serialize().unwrap();
        let (back, _) = ReplicationMessage::deserialize(&bytes).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn test_sync_marker_round_trip() {
        let activity = SyncReplicationActivity::sync_concurrency_begin(
            EntityDescriptor::named("bin-map"),
            ClientId::generate(),
            4,
        )
        .with_id(ActivityId::new(2));
        let message = ReplicationMessage::replicate(1, activity);
        let bytes = message.serialize().unwrap();
        let (back, _) = ReplicationMessage::deserialize(&bytes).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn test_corruption_rejected() {
        let message = ReplicationMessage::replicate(5, sample_activity());
        let mut bytes = message.serialize().unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x01;
        assert!(ReplicationMessage::deserialize(&bytes).is_err());
    }
}
