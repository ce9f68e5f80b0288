//! Per-client transaction accounts.
//!
//! Per COMMIT_PIPELINE.md §6: the stage tracks, per source client, every
//! transaction still in the system and which broadcast targets (waitees)
//! have not yet acknowledged it. The oldest pending entry bounds how far
//! back the cluster must retain state for that client.

use std::collections::{BTreeMap, HashSet};

use super::sequence::GlobalSeq;
use super::transaction::{ClientId, TransactionId};

/// Book-keeping for one source client.
#[derive(Debug, Default)]
pub struct TransactionAccount {
    /// Client-local txn id -> (global order, clients that still owe an ack).
    pending: BTreeMap<TransactionId, PendingTxn>,
}

#[derive(Debug)]
struct PendingTxn {
    global: GlobalSeq,
    waitees: HashSet<ClientId>,
}

impl TransactionAccount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Register a transaction at receive time.
    pub fn register(&mut self, txn: TransactionId, global: GlobalSeq) {
        self.pending.entry(txn).or_insert(PendingTxn {
            global,
            waitees: HashSet::new(),
        });
    }

    pub fn global_of(&self, txn: TransactionId) -> Option<GlobalSeq> {
        self.pending.get(&txn).map(|p| p.global)
    }

    /// Record that `waitee` must acknowledge `txn` before it completes.
    /// Returns false when the transaction is unknown.
    pub fn add_waitee(&mut self, txn: TransactionId, waitee: ClientId) -> bool {
        match self.pending.get_mut(&txn) {
            Some(pending) => {
                pending.waitees.insert(waitee);
                true
            }
            None => false,
        }
    }

    /// Remove one waitee. Returns true when the transaction has no waitees
    /// left (fully acknowledged).
    pub fn remove_waitee(&mut self, txn: TransactionId, waitee: ClientId) -> bool {
        match self.pending.get_mut(&txn) {
            Some(pending) => {
                pending.waitees.remove(&waitee);
                pending.waitees.is_empty()
            }
            None => false,
        }
    }

    pub fn has_waitees(&self, txn: TransactionId) -> bool {
        self.pending
            .get(&txn)
            .map(|p| !p.waitees.is_empty())
            .unwrap_or(false)
    }

    /// Drop a completed transaction. Returns its global order.
    pub fn complete(&mut self, txn: TransactionId) -> Option<GlobalSeq> {
        self.pending.remove(&txn).map(|p| p.global)
    }

    /// Remove a dead client from every waitee set. Returns the transactions
    /// that became fully acknowledged as a result.
    pub fn clear_waitee(&mut self, dead: ClientId) -> Vec<TransactionId> {
        let mut completed = Vec::new();
        for (txn, pending) in self.pending.iter_mut() {
            if pending.waitees.remove(&dead) && pending.waitees.is_empty() {
                completed.push(*txn);
            }
        }
        completed
    }

    /// The oldest still-pending global order for this client, bounding how
    /// far back the cluster must retain state for it.
    pub fn oldest_pending(&self) -> Option<GlobalSeq> {
        self.pending.values().map(|p| p.global).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ClientId, ClientId) {
        (ClientId::generate(), ClientId::generate())
    }

    #[test]
    fn test_waitee_tracking() {
        let (a, b) = ids();
        let mut account = TransactionAccount::new();
        account.register(TransactionId::new(1), GlobalSeq::new(10));

        assert!(account.add_waitee(TransactionId::new(1), a));
        assert!(account.add_waitee(TransactionId::new(1), b));
        assert!(account.has_waitees(TransactionId::new(1)));

        assert!(!account.remove_waitee(TransactionId::new(1), a));
        assert!(account.remove_waitee(TransactionId::new(1), b));
        assert!(!account.has_waitees(TransactionId::new(1)));
    }

    #[test]
    fn test_unknown_transaction_is_not_tracked() {
        let (a, _) = ids();
        let mut account = TransactionAccount::new();
        assert!(!account.add_waitee(TransactionId::new(9), a));
        assert!(!account.remove_waitee(TransactionId::new(9), a));
        assert_eq!(account.global_of(TransactionId::new(9)), None);
    }

    #[test]
    fn test_oldest_pending() {
        let mut account = TransactionAccount::new();
        assert_eq!(account.oldest_pending(), None);
        account.register(TransactionId::new(3), GlobalSeq::new(30));
        account.register(TransactionId::new(1), GlobalSeq::new(10));
        account.register(TransactionId::new(2), GlobalSeq::new(20));
        assert_eq!(account.oldest_pending(), Some(GlobalSeq::new(10)));

        account.complete(TransactionId::new(1));
        assert_eq!(account.oldest_pending(), Some(GlobalSeq::new(20)));
    }

    #[test]
    fn test_dead_waitee_completes_transactions() {
        let (a, b) = ids();
        let mut account = TransactionAccount::new();
        account.register(TransactionId::new(1), GlobalSeq::new(1));
        account.register(TransactionId::new(2), GlobalSeq::new(2));
        account.add_waitee(TransactionId::new(1), a);
        account.add_waitee(TransactionId::new(2), a);
        account.add_waitee(TransactionId::new(2), b);

        let completed = account.clear_waitee(a);
        assert_eq!(completed, vec![TransactionId::new(1)]);
        assert!(account.has_waitees(TransactionId::new(2)));
    }
}
