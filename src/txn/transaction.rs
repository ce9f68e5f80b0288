//! Transaction identity and payload.

use std::collections::BTreeMap;
use std::fmt;

use uuid::Uuid;

use crate::delta::DeltaRecord;
use crate::oid::{ObjectId, ObjectIdSet};

/// Identity of one connected client node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn generate() -> Self {
        ClientId(Uuid::new_v4())
    }

    pub const fn from_uuid(id: Uuid) -> Self {
        ClientId(id)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-client transaction counter; clients commit in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    pub const fn new(value: u64) -> Self {
        TransactionId(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cluster-wide transaction identity: (source client, client-local id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerTransactionId {
    pub source: ClientId,
    pub txn: TransactionId,
}

impl ServerTransactionId {
    pub fn new(source: ClientId, txn: TransactionId) -> Self {
        Self { source, txn }
    }
}

impl fmt::Display for ServerTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source, self.txn)
    }
}

/// A waiter to notify when this transaction's mutation commits, so lock
/// holders blocked in wait/notify observe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifiedWaiter {
    /// Client hosting the waiting thread.
    pub client: ClientId,
    /// Lock the waiter is parked on.
    pub lock_name: String,
}

/// One client transaction as received by the server.
#[derive(Debug, Clone)]
pub struct ServerTransaction {
    pub id: ServerTransactionId,
    /// Delta records in the order the client produced them.
    pub changes: Vec<DeltaRecord>,
    /// Root bindings created by this transaction.
    pub new_roots: BTreeMap<String, ObjectId>,
    /// Waiters to release at commit.
    pub notified_waiters: Vec<NotifiedWaiter>,
}

impl ServerTransaction {
    pub fn new(id: ServerTransactionId, changes: Vec<DeltaRecord>) -> Self {
        Self {
            id,
            changes,
            new_roots: BTreeMap::new(),
            notified_waiters: Vec::new(),
        }
    }

    pub fn with_root(mut self, name: impl Into<String>, id: ObjectId) -> Self {
        self.new_roots.insert(name.into(), id);
        self
    }

    pub fn with_waiter(mut self, waiter: NotifiedWaiter) -> Self {
        self.notified_waiters.push(waiter);
        self
    }

    /// Identifiers of every object touched by this transaction.
    pub fn touched_objects(&self) -> ObjectIdSet {
        self.changes.iter().map(|c| c.object_id()).collect()
    }

    /// Identifiers of objects newly created by this transaction (full
    /// records materialize objects; deltas only mutate).
    pub fn new_object_ids(&self) -> ObjectIdSet {
        self.changes
            .iter()
            .filter(|c| !c.is_delta())
            .map(|c| c.object_id())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::ClassSpec;

    #[test]
    fn test_touched_and_new_objects() {
        let client = ClientId::generate();
        let txn = ServerTransaction::new(
            ServerTransactionId::new(client, TransactionId::new(1)),
            vec![
                DeltaRecord::full(ObjectId::new(1), 1, ClassSpec::new("a.B", "local")),
                DeltaRecord::delta(ObjectId::new(2), 2),
            ],
        );

        let touched: Vec<i64> = txn.touched_objects().iter().map(ObjectId::raw).collect();
        assert_eq!(touched, vec![1, 2]);
        let created: Vec<i64> = txn.new_object_ids().iter().map(ObjectId::raw).collect();
        assert_eq!(created, vec![1]);
    }

    #[test]
    fn test_transaction_id_display() {
        let id = ServerTransactionId::new(
            ClientId::from_uuid(Uuid::nil()),
            TransactionId::new(7),
        );
        assert_eq!(
            id.to_string(),
            "00000000-0000-0000-0000-000000000000#7"
        );
    }
}
