//! Delta codec error types.

use std::io;

use thiserror::Error;

/// Result type for delta operations.
pub type DeltaResult<T> = Result<T, DeltaError>;

/// Errors from delta record construction and replay.
///
/// Wire-level protocol failures (truncation, bad tags, checksum mismatch)
/// surface as `Io` with `UnexpectedEof` / `InvalidData` kinds and are fatal
/// to the connection that produced them.
#[derive(Debug, Error)]
pub enum DeltaError {
    /// Malformed or truncated wire data.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A cursor accessor was called for the wrong action variant.
    #[error("current action is {actual}, not {expected}")]
    WrongActionVariant {
        expected: &'static str,
        actual: &'static str,
    },

    /// A cursor accessor was called before `next` produced an action, or
    /// after the cursor was exhausted.
    #[error("cursor has no current action")]
    NoCurrentAction,

    /// A record cannot carry both a parent identifier and an array length.
    #[error("parent identifier and array length are mutually exclusive")]
    ConflictingContainment,

    /// The writer's header was already finalized.
    #[error("delta writer already finalized")]
    AlreadyFinalized,
}

impl From<DeltaError> for io::Error {
    fn from(err: DeltaError) -> io::Error {
        match err {
            DeltaError::Io(inner) => inner,
            other => io::Error::new(io::ErrorKind::InvalidInput, other.to_string()),
        }
    }
}
