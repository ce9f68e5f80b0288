//! Active→passive replication stream.
//!
//! Per REPLICATION_STREAM.md:
//! - One activity per replicated mutation, identifiers assigned
//!   monotonically, applied by the passive in identifier order
//! - Envelope completion fires exactly once per envelope (sent or dropped)
//! - Acks are batched tuples; FAIL is fatal to its activity and surfaced
//! - Passive sync uses strictly nested bracketing markers

mod ack;
mod activity;
mod config;
mod envelope;
mod errors;
mod message;
mod passive;
mod stream;
mod sync;

pub use ack::{AckBatch, ResultCode};
pub use activity::{
    ActivityId, ActivityType, EntityDescriptor, PassiveId, SyncReplicationActivity,
};
pub use config::{ReplicationConfig, ReplicationRole, DEFAULT_ACK_BATCH_SIZE};
pub use envelope::{DispatchCompletion, ReplicationEnvelope};
pub use errors::{ReplError, ReplErrorKind, ReplResult};
pub use message::{ReplicationMessage, ReplicationPayload};
pub use passive::{ActivitySequencer, PassiveReplicationHandler};
pub use stream::{
    AckSummary, LoopbackTransport, ReplicationStream, ReplicationTransport,
};
pub use sync::SyncTracker;
