//! Object identifiers.
//!
//! Per OBJECT_ID_SET.md §1:
//! - Identifiers are 64-bit signed values, unique within a cluster generation
//! - The reserved value -1 denotes "no object"
//! - Identifiers are handed out in server-issued batches so clients do not
//!   pay a round trip per allocation

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 64-bit object identifier.
///
/// The full signed range is valid, including negative values; only
/// [`ObjectId::NULL`] is reserved.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(i64);

impl ObjectId {
    /// The "no object" sentinel.
    pub const NULL: ObjectId = ObjectId(-1);

    /// Wrap a raw identifier value.
    pub const fn new(raw: i64) -> Self {
        ObjectId(raw)
    }

    /// The raw 64-bit value.
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// True if this is the "no object" sentinel.
    pub const fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ObjectId {
    fn from(raw: i64) -> Self {
        ObjectId(raw)
    }
}

/// A server-issued allocation batch: identifiers `[start, start + count)`.
///
/// Consumed on the client side one identifier at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdBatch {
    start: i64,
    count: u64,
    issued: u64,
}

impl IdBatch {
    /// Create a batch covering `[start, start + count)`.
    pub fn new(start: i64, count: u64) -> Self {
        Self {
            start,
            count,
            issued: 0,
        }
    }

    /// The first identifier of the batch.
    pub fn start(&self) -> ObjectId {
        ObjectId(self.start)
    }

    /// Number of identifiers not yet handed out.
    pub fn remaining(&self) -> u64 {
        self.count - self.issued
    }

    /// Take the next identifier, or `None` when the batch is exhausted.
    pub fn next_id(&mut self) -> Option<ObjectId> {
        if self.issued == self.count {
            return None;
        }
        let id = self.start.wrapping_add(self.issued as i64);
        self.issued += 1;
        Some(ObjectId(id))
    }
}

/// Monotonic batch allocator, owned by the active server.
#[derive(Debug)]
pub struct IdAllocator {
    next_start: i64,
}

impl IdAllocator {
    /// Start allocating at identifier 1 (0 is legal but kept clear of the
    /// sentinel's neighborhood for readability in logs).
    pub fn new() -> Self {
        Self { next_start: 1 }
    }

    /// Resume allocation above the given identifier after a restart.
    pub fn resume_after(highest: ObjectId) -> Self {
        Self {
            next_start: highest.raw().saturating_add(1),
        }
    }

    /// Issue the next batch of `count` identifiers.
    pub fn issue_batch(&mut self, count: u64) -> IdBatch {
        let batch = IdBatch::new(self.next_start, count);
        self.next_start = self.next_start.wrapping_add(count as i64);
        batch
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
