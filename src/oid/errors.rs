//! Identifier-set error types.

use thiserror::Error;

/// Result type for id-set operations.
pub type IdSetResult<T> = Result<T, IdSetError>;

/// Errors raised by id-set cursors and the shared wrapper.
///
/// Per OBJECT_ID_SET.md §4: structural modification during iteration must be
/// signalled as a condition distinguishable from end-of-iteration, never
/// tolerated silently.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdSetError {
    /// The set was structurally modified while a snapshot cursor was open.
    #[error("id set structurally modified during iteration")]
    ConcurrentModification,

    /// Cursor removal requested before any element was produced.
    #[error("cursor has no current element to remove")]
    NoCurrentElement,

    /// The shared wrapper's lock was poisoned by a panicking writer.
    #[error("id set lock poisoned")]
    LockPoisoned,
}
