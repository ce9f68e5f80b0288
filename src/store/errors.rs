//! Object store error types.

use thiserror::Error;

use crate::oid::ObjectId;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from applying deltas to the in-memory object graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A delta-only record arrived for an object this store has never
    /// materialized. Protocol-level failure: the sender's view is broken.
    #[error("delta for unknown object {0}")]
    UnknownObject(ObjectId),

    /// A record's version is not newer than the stored object's.
    ///
    /// Surfaced to the caller as a named condition; never retried here.
    #[error("stale version for object {object}: stored {stored}, incoming {incoming}")]
    StaleVersion {
        object: ObjectId,
        stored: u64,
        incoming: u64,
    },

    /// A logical action's parameters do not fit its operation code.
    #[error("malformed {op:?} action for object {object}")]
    MalformedAction {
        object: ObjectId,
        op: crate::delta::LogicalOp,
    },

    /// A shard lock was poisoned by a panicking writer.
    #[error("store shard lock poisoned")]
    LockPoisoned,
}
