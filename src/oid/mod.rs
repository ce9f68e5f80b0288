//! Object identifiers and compact identifier sets.
//!
//! Per OBJECT_ID_SET.md:
//! - Every subsystem tracks object membership ("objects this client holds",
//!   "objects touched by this transaction", "objects eligible for
//!   reclamation") through one set contract
//! - Two storage strategies, selected at construction, with identical
//!   observable behavior
//! - Not internally synchronized; `SharedIdSet` is the concurrent wrapper
//!   for bulk-repopulation scenarios

mod bit_set;
mod errors;
mod id;
mod range_set;
mod set;
mod shared;

pub use bit_set::BitSetIdSet;
pub use errors::{IdSetError, IdSetResult};
pub use id::{IdAllocator, IdBatch, ObjectId};
pub use range_set::RangeIdSet;
pub use set::{Cursor, Iter, ObjectIdSet, SetRepresentation};
pub use shared::{SharedIdSet, SnapshotCursor};
