//! Transaction stage error types.
//!
//! Per COMMIT_PIPELINE.md §5:
//! - Duplicate delivery is NOT an error (skip-apply path)
//! - An apply failure is fatal to its transaction, never silently dropped
//! - Notify draining happens even on the failure path

use std::fmt;

/// Transaction error type.
#[derive(Debug, Clone)]
pub struct TxnError {
    pub kind: TxnErrorKind,
    pub message: String,
}

/// Transaction error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnErrorKind {
    /// Illegal state transition attempted.
    IllegalTransition,

    /// Transaction not known to the stage.
    UnknownTransaction,

    /// Abandonment requested after apply started.
    AbandonTooLate,

    /// Apply against the object graph failed.
    ApplyFailed,

    /// Internal lock poisoned.
    Internal,
}

impl TxnError {
    pub fn new(kind: TxnErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn illegal_transition(message: impl Into<String>) -> Self {
        Self::new(TxnErrorKind::IllegalTransition, message)
    }

    pub fn unknown_transaction(message: impl Into<String>) -> Self {
        Self::new(TxnErrorKind::UnknownTransaction, message)
    }

    pub fn abandon_too_late(message: impl Into<String>) -> Self {
        Self::new(TxnErrorKind::AbandonTooLate, message)
    }

    pub fn apply_failed(message: impl Into<String>) -> Self {
        Self::new(TxnErrorKind::ApplyFailed, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(TxnErrorKind::Internal, message)
    }

    /// Fatal errors end the transaction; they are surfaced, not retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            TxnErrorKind::ApplyFailed | TxnErrorKind::Internal
        )
    }
}

impl fmt::Display for TxnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxnError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for TxnError {}

/// Result type for transaction-stage operations.
pub type TxnResult<T> = Result<T, TxnError>;
