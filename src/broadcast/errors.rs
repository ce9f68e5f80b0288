//! Broadcast stage error types.

use thiserror::Error;

use crate::txn::ClientId;

/// Result type for broadcast operations.
pub type BroadcastResult<T> = Result<T, BroadcastError>;

/// Errors from channel delivery.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel for this client no longer exists (client died).
    #[error("no such channel: {0}")]
    NoSuchChannel(ClientId),

    /// The channel exists but cannot accept messages.
    #[error("channel closed: {0}")]
    Closed(ClientId),
}

/// Errors from the broadcast stage.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// No state is tracked for this client.
    #[error("unknown client: {0}")]
    UnknownClient(ClientId),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Commit-stage bookkeeping failed mid-fan-out.
    #[error("commit bookkeeping failed: {0}")]
    Commit(#[from] crate::txn::TxnError),

    /// Internal lock poisoned.
    #[error("broadcast state lock poisoned")]
    LockPoisoned,
}
