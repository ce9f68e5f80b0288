//! The per-client broadcast message.

use std::collections::BTreeMap;

use crate::delta::DeltaRecord;
use crate::oid::ObjectId;
use crate::txn::{NotifiedWaiter, ServerTransactionId};

/// Everything one client needs to observe one committed transaction.
///
/// Per BROADCAST.md §2: a message with no changes, no lookups, no waiters
/// and no roots is never sent.
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    pub txn_id: ServerTransactionId,
    /// Delta records pruned to objects the target client does not hold.
    pub changes: Vec<DeltaRecord>,
    /// Newly referenced objects the client must look up.
    pub lookup_ids: Vec<ObjectId>,
    /// Waiters on this client released by the transaction.
    pub notified: Vec<NotifiedWaiter>,
    /// Root bindings created by the transaction.
    pub new_roots: BTreeMap<String, ObjectId>,
}

impl BroadcastMessage {
    pub fn new(txn_id: ServerTransactionId) -> Self {
        Self {
            txn_id,
            changes: Vec::new(),
            lookup_ids: Vec::new(),
            notified: Vec::new(),
            new_roots: BTreeMap::new(),
        }
    }

    /// True when sending this message would carry no information.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
            && self.lookup_ids.is_empty()
            && self.notified.is_empty()
            && self.new_roots.is_empty()
    }
}
