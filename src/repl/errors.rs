//! Replication error types.
//!
//! Per REPLICATION_STREAM.md §3:
//! - A FAIL acknowledgement is fatal to its activity and surfaced; there is
//!   no automatic retry
//! - Bracketing violations during passive sync are fatal to the stream

use std::fmt;

/// Replication error type.
#[derive(Debug, Clone)]
pub struct ReplError {
    pub kind: ReplErrorKind,
    pub message: String,
}

/// Replication error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplErrorKind {
    /// An acknowledgement referenced an activity this stream never sent.
    UnknownActivity,

    /// The passive rejected an activity (FAIL acknowledgement).
    ActivityRejected,

    /// Sync bracketing order violated.
    BracketViolation,

    /// The transport could not deliver.
    Transport,

    /// Configuration error.
    Configuration,

    /// Internal lock poisoned.
    Internal,
}

impl ReplError {
    pub fn new(kind: ReplErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_activity(message: impl Into<String>) -> Self {
        Self::new(ReplErrorKind::UnknownActivity, message)
    }

    pub fn activity_rejected(message: impl Into<String>) -> Self {
        Self::new(ReplErrorKind::ActivityRejected, message)
    }

    pub fn bracket_violation(message: impl Into<String>) -> Self {
        Self::new(ReplErrorKind::BracketViolation, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ReplErrorKind::Transport, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ReplErrorKind::Configuration, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ReplErrorKind::Internal, message)
    }

    /// Fatal errors halt the affected stream or activity; they are
    /// surfaced to the caller, never healed silently.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ReplErrorKind::UnknownActivity
                | ReplErrorKind::ActivityRejected
                | ReplErrorKind::BracketViolation
                | ReplErrorKind::Internal
        )
    }
}

impl fmt::Display for ReplError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReplError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for ReplError {}

/// Result type for replication operations.
pub type ReplResult<T> = Result<T, ReplError>;
