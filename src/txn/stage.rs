//! Transaction commit stage.
//!
//! Per COMMIT_PIPELINE.md:
//! - §2 apply mutates the sharded object graph and records the
//!   back-reference set (objects newly reachable because of this
//!   transaction)
//! - §3 duplicate delivery after a retry skips apply with a warning and
//!   proceeds straight to commit bookkeeping
//! - §4 the low watermark is recomputed on the first commit of a run and
//!   every `watermark_interval` commits thereafter, and never regresses
//! - §5 commit drains notify side effects even when apply failed, so no
//!   waiting lock holder is leaked; the apply failure itself stays fatal to
//!   the transaction

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::observability::{log_event, Event};
use crate::oid::ObjectIdSet;
use crate::store::ShardedStore;

use super::account::TransactionAccount;
use super::errors::{TxnError, TxnResult};
use super::notify::NotifyDrain;
use super::persistence::PersistenceProvider;
use super::sequence::{GlobalSeq, GlobalSeqAssigner};
use super::state::TransactionState;
use super::transaction::{ClientId, ServerTransaction, ServerTransactionId};
use super::watermark::{WatermarkProvider, DEFAULT_WATERMARK_INTERVAL};

/// Commit stage tuning.
#[derive(Debug, Clone)]
pub struct CommitConfig {
    /// Commits between low-watermark recomputations.
    pub watermark_interval: u64,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            watermark_interval: DEFAULT_WATERMARK_INTERVAL,
        }
    }
}

/// Outcome of applying one transaction.
#[derive(Debug)]
pub struct ApplyInfo {
    pub txn_id: ServerTransactionId,
    /// True when this was a duplicate delivery and apply was skipped.
    pub skipped: bool,
    /// Objects touched by the transaction's records.
    pub touched: ObjectIdSet,
    /// Objects materialized by the transaction.
    pub created: ObjectIdSet,
    /// Back-reference set: objects newly reachable because of this
    /// transaction, used to decide what dependent lookups must fault in.
    pub referenced: ObjectIdSet,
}

impl ApplyInfo {
    fn skipped(txn_id: ServerTransactionId) -> Self {
        Self {
            txn_id,
            skipped: true,
            touched: ObjectIdSet::new(),
            created: ObjectIdSet::new(),
            referenced: ObjectIdSet::new(),
        }
    }
}

/// Receipt for a committed batch.
#[derive(Debug)]
pub struct CommitReceipt {
    pub committed: Vec<ServerTransactionId>,
    pub low_watermark: GlobalSeq,
}

struct StageState {
    seq: GlobalSeqAssigner,
    states: HashMap<ServerTransactionId, TransactionState>,
    globals: HashMap<ServerTransactionId, GlobalSeq>,
    /// Dedup registry for idempotent apply; reclaimed below the watermark.
    applied: HashMap<ServerTransactionId, GlobalSeq>,
    accounts: HashMap<ClientId, TransactionAccount>,
    watermark: WatermarkProvider,
}

impl StageState {
    fn advance(
        &mut self,
        txn_id: ServerTransactionId,
        next: TransactionState,
    ) -> TxnResult<TransactionState> {
        let state = self
            .states
            .get_mut(&txn_id)
            .ok_or_else(|| TxnError::unknown_transaction(format!("transaction {}", txn_id)))?;
        *state = state.advance_to(next)?;
        Ok(*state)
    }

    fn finish_acknowledged(&mut self, txn_id: ServerTransactionId) -> TxnResult<()> {
        self.advance(txn_id, TransactionState::Acknowledged)?;
        self.states.remove(&txn_id);
        self.globals.remove(&txn_id);
        if let Some(account) = self.accounts.get_mut(&txn_id.source) {
            account.complete(txn_id.txn);
        }
        log_event(
            Event::TxnAcknowledged,
            &[("txn", &txn_id.to_string())],
        );
        Ok(())
    }

    fn watermark_candidate(&mut self) -> GlobalSeq {
        self.accounts
            .values()
            .filter_map(TransactionAccount::oldest_pending)
            .min()
            .unwrap_or_else(|| self.seq.peek_next())
    }
}

/// Applies transaction batches to the object store, maintains the global
/// ordering watermark, and hands results to the broadcast stage.
pub struct CommitStage {
    store: Arc<ShardedStore>,
    persistence: Arc<dyn PersistenceProvider>,
    notify: Arc<dyn NotifyDrain>,
    inner: Mutex<StageState>,
}

impl CommitStage {
    pub fn new(
        store: Arc<ShardedStore>,
        persistence: Arc<dyn PersistenceProvider>,
        notify: Arc<dyn NotifyDrain>,
        config: CommitConfig,
    ) -> Self {
        Self {
            store,
            persistence,
            notify,
            inner: Mutex::new(StageState {
                seq: GlobalSeqAssigner::new(),
                states: HashMap::new(),
                globals: HashMap::new(),
                applied: HashMap::new(),
                accounts: HashMap::new(),
                watermark: WatermarkProvider::new(config.watermark_interval),
            }),
        }
    }

    fn lock(&self) -> TxnResult<MutexGuard<'_, StageState>> {
        self.inner
            .lock()
            .map_err(|_| TxnError::internal("commit stage lock poisoned"))
    }

    pub fn store(&self) -> &Arc<ShardedStore> {
        &self.store
    }

    /// Register a transaction and assign its global order. Re-receiving a
    /// known transaction returns the already assigned order.
    pub fn receive(&self, txn: &ServerTransaction) -> TxnResult<GlobalSeq> {
        let mut inner = self.lock()?;
        if let Some(existing) = inner.globals.get(&txn.id) {
            return Ok(*existing);
        }
        let global = inner.seq.assign();
        inner.states.insert(txn.id, TransactionState::Received);
        inner.globals.insert(txn.id, global);
        inner
            .accounts
            .entry(txn.id.source)
            .or_insert_with(TransactionAccount::new)
            .register(txn.id.txn, global);
        log_event(
            Event::TxnReceived,
            &[
                ("txn", &txn.id.to_string()),
                ("global_seq", &global.to_string()),
            ],
        );
        Ok(global)
    }

    /// Abandon a transaction. Legal only before apply starts.
    pub fn abandon(&self, txn_id: ServerTransactionId) -> TxnResult<()> {
        let mut inner = self.lock()?;
        let state = inner
            .states
            .get(&txn_id)
            .copied()
            .ok_or_else(|| TxnError::unknown_transaction(format!("transaction {}", txn_id)))?;
        if !state.can_abandon() {
            return Err(TxnError::abandon_too_late(format!(
                "transaction {} is already {}",
                txn_id,
                state.as_str()
            )));
        }
        inner.states.remove(&txn_id);
        inner.globals.remove(&txn_id);
        if let Some(account) = inner.accounts.get_mut(&txn_id.source) {
            account.complete(txn_id.txn);
        }
        log_event(Event::TxnAbandoned, &[("txn", &txn_id.to_string())]);
        Ok(())
    }

    /// Apply a transaction's records to the object graph.
    ///
    /// Duplicate delivery is detected here: the apply is skipped with a
    /// warning and the transaction proceeds to commit unchanged.
    pub fn apply(&self, txn: &ServerTransaction) -> TxnResult<ApplyInfo> {
        {
            let mut inner = self.lock()?;
            inner.advance(txn.id, TransactionState::Applying)?;
            if inner.applied.contains_key(&txn.id) {
                inner.advance(txn.id, TransactionState::Applied)?;
                log_event(Event::TxnSkipApply, &[("txn", &txn.id.to_string())]);
                return Ok(ApplyInfo::skipped(txn.id));
            }
        }

        // Store mutation happens outside the stage lock; each record apply
        // holds only its shard's lock.
        let mut info = ApplyInfo {
            txn_id: txn.id,
            skipped: false,
            touched: ObjectIdSet::new(),
            created: ObjectIdSet::new(),
            referenced: ObjectIdSet::new(),
        };
        let mut failure: Option<TxnError> = None;
        for record in &txn.changes {
            match self.store.apply_record(record) {
                Ok(applied) => {
                    info.touched.add(record.object_id());
                    if applied.created {
                        info.created.add(record.object_id());
                    }
                    info.referenced.add_all(applied.references);
                }
                Err(err) => {
                    failure = Some(TxnError::apply_failed(format!(
                        "transaction {}: {}",
                        txn.id, err
                    )));
                    break;
                }
            }
        }

        if failure.is_none() {
            for (name, id) in &txn.new_roots {
                if let Err(err) = self.store.create_root(name.clone(), *id) {
                    failure = Some(TxnError::apply_failed(format!(
                        "transaction {}: root {}: {}",
                        txn.id, name, err
                    )));
                    break;
                }
            }
        }

        let mut inner = self.lock()?;
        let global = inner.globals.get(&txn.id).copied();
        inner.advance(txn.id, TransactionState::Applied)?;
        if let Some(global) = global {
            // Failed transactions also register: a redelivery must not
            // re-apply half of a fatally failed batch.
            inner.applied.insert(txn.id, global);
        }

        match failure {
            Some(err) => {
                log_event(
                    Event::TxnApplyFailed,
                    &[("txn", &txn.id.to_string()), ("error", &err.to_string())],
                );
                Err(err)
            }
            None => {
                log_event(Event::TxnApplied, &[("txn", &txn.id.to_string())]);
                Ok(info)
            }
        }
    }

    /// Commit a batch of applied transactions: persistence boundary, notify
    /// draining, watermark cadence.
    pub fn commit(&self, txns: &[&ServerTransaction]) -> TxnResult<CommitReceipt> {
        let ptx = self.persistence.begin();

        // Notifies drain for every transaction in the batch, including ones
        // whose apply failed.
        for txn in txns {
            if !txn.notified_waiters.is_empty() {
                self.notify.drain(&txn.notified_waiters);
            }
        }

        let mut committed = Vec::with_capacity(txns.len());
        let mut recompute_due = false;
        {
            let mut inner = self.lock()?;
            for txn in txns {
                inner.advance(txn.id, TransactionState::BroadcastPending)?;
                committed.push(txn.id);
                recompute_due |= inner.watermark.on_commit();
                log_event(Event::TxnCommitted, &[("txn", &txn.id.to_string())]);
            }
        }

        ptx.commit();

        let low_watermark = if recompute_due {
            self.recompute_watermark()?
        } else {
            self.lock()?.watermark.low_watermark()
        };

        Ok(CommitReceipt {
            committed,
            low_watermark,
        })
    }

    fn recompute_watermark(&self) -> TxnResult<GlobalSeq> {
        let mut inner = self.lock()?;
        let candidate = inner.watermark_candidate();
        let low = inner.watermark.update(candidate);
        // Everything below the watermark is conclusively applied
        // cluster-wide; its dedup entries can go.
        inner.applied.retain(|_, seq| *seq >= low);
        log_event(
            Event::WatermarkAdvanced,
            &[("low_watermark", &low.to_string())],
        );
        Ok(low)
    }

    /// Mark a broadcast target as owing an acknowledgement. Called by the
    /// broadcast stage before the message is handed to the channel.
    pub fn add_waitee(&self, txn_id: ServerTransactionId, waitee: ClientId) -> TxnResult<()> {
        let mut inner = self.lock()?;
        let tracked = inner
            .accounts
            .get_mut(&txn_id.source)
            .map(|account| account.add_waitee(txn_id.txn, waitee))
            .unwrap_or(false);
        if tracked {
            Ok(())
        } else {
            Err(TxnError::unknown_transaction(format!(
                "transaction {}",
                txn_id
            )))
        }
    }

    /// The broadcast fan-out for this transaction finished. Completes the
    /// transaction immediately when no acknowledgements are outstanding.
    pub fn broadcast_complete(&self, txn_id: ServerTransactionId) -> TxnResult<bool> {
        let mut inner = self.lock()?;
        inner.advance(txn_id, TransactionState::BroadcastComplete)?;
        let outstanding = inner
            .accounts
            .get(&txn_id.source)
            .map(|account| account.has_waitees(txn_id.txn))
            .unwrap_or(false);
        if outstanding {
            return Ok(false);
        }
        inner.finish_acknowledged(txn_id)?;
        Ok(true)
    }

    /// Accept one client's acknowledgement. Returns true when the
    /// transaction became fully acknowledged.
    pub fn acknowledge(
        &self,
        txn_id: ServerTransactionId,
        from: ClientId,
    ) -> TxnResult<bool> {
        let mut inner = self.lock()?;
        let fully_acked = inner
            .accounts
            .get_mut(&txn_id.source)
            .map(|account| account.remove_waitee(txn_id.txn, from))
            .unwrap_or(false);
        if !fully_acked {
            return Ok(false);
        }
        match inner.states.get(&txn_id) {
            Some(TransactionState::BroadcastComplete) => {
                inner.finish_acknowledged(txn_id)?;
                Ok(true)
            }
            // Fan-out still in progress; completion happens in
            // broadcast_complete.
            _ => Ok(false),
        }
    }

    /// A client died: clear its account and release every transaction that
    /// was only waiting on it.
    pub fn clear_client(&self, dead: ClientId) -> TxnResult<()> {
        let mut inner = self.lock()?;

        if inner.accounts.remove(&dead).is_some() {
            let orphaned: Vec<ServerTransactionId> = inner
                .states
                .keys()
                .filter(|id| id.source == dead)
                .copied()
                .collect();
            for txn_id in orphaned {
                inner.states.remove(&txn_id);
                inner.globals.remove(&txn_id);
            }
        }

        let mut released = Vec::new();
        for (source, account) in inner.accounts.iter_mut() {
            for txn in account.clear_waitee(dead) {
                released.push(ServerTransactionId::new(*source, txn));
            }
        }
        for txn_id in released {
            if matches!(
                inner.states.get(&txn_id),
                Some(TransactionState::BroadcastComplete)
            ) {
                inner.finish_acknowledged(txn_id)?;
            }
        }
        Ok(())
    }

    pub fn low_watermark(&self) -> TxnResult<GlobalSeq> {
        Ok(self.lock()?.watermark.low_watermark())
    }

    /// Transactions still tracked by the stage.
    pub fn live_count(&self) -> TxnResult<usize> {
        Ok(self.lock()?.states.len())
    }

    /// Size of the idempotence registry.
    pub fn applied_count(&self) -> TxnResult<usize> {
        Ok(self.lock()?.applied.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{ClassSpec, DeltaRecord, Value};
    use crate::oid::ObjectId;
    use crate::txn::notify::RecordingNotifyDrain;
    use crate::txn::persistence::NoopPersistence;
    use crate::txn::transaction::{NotifiedWaiter, TransactionId};

    fn stage() -> CommitStage {
        CommitStage::new(
            Arc::new(ShardedStore::new(4)),
            Arc::new(NoopPersistence),
            Arc::new(crate::txn::notify::NoopNotifyDrain),
            CommitConfig::default(),
        )
    }

    fn txn_with_object(client: ClientId, txn: u64, object: i64) -> ServerTransaction {
        let mut record = DeltaRecord::full(
            ObjectId::new(object),
            1,
            ClassSpec::new("inventory.Bin", "local"),
        );
        record.push_physical("count", Value::I32(1), false);
        ServerTransaction::new(
            ServerTransactionId::new(client, TransactionId::new(txn)),
            vec![record],
        )
    }

    #[test]
    fn test_receive_assigns_increasing_globals() {
        let stage = stage();
        let client = ClientId::generate();
        let a = stage.receive(&txn_with_object(client, 1, 10)).unwrap();
        let b = stage.receive(&txn_with_object(client, 2, 11)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_re_receive_is_idempotent() {
        let stage = stage();
        let client = ClientId::generate();
        let txn = txn_with_object(client, 1, 10);
        let a = stage.receive(&txn).unwrap();
        let b = stage.receive(&txn).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_apply_then_duplicate_skips() {
        let stage = stage();
        let client = ClientId::generate();
        let txn = txn_with_object(client, 1, 10);

        stage.receive(&txn).unwrap();
        let info = stage.apply(&txn).unwrap();
        assert!(!info.skipped);
        assert!(info.touched.contains(ObjectId::new(10)));
        stage.commit(&[&txn]).unwrap();
        let done = stage.broadcast_complete(txn.id).unwrap();
        assert!(done);

        // Redelivery after a retry: same id comes back through the stage.
        stage.receive(&txn).unwrap();
        let info = stage.apply(&txn).unwrap();
        assert!(info.skipped);
        assert!(info.touched.is_empty());
        // The store was not mutated a second time.
        let object = stage.store().snapshot(ObjectId::new(10)).unwrap();
        assert_eq!(object.version(), 1);
    }

    #[test]
    fn test_abandon_only_before_apply() {
        let stage = stage();
        let client = ClientId::generate();
        let txn = txn_with_object(client, 1, 10);
        stage.receive(&txn).unwrap();
        stage.abandon(txn.id).unwrap();

        let txn2 = txn_with_object(client, 2, 11);
        stage.receive(&txn2).unwrap();
        stage.apply(&txn2).unwrap();
        let err = stage.abandon(txn2.id).unwrap_err();
        assert_eq!(err.kind, crate::txn::TxnErrorKind::AbandonTooLate);
    }

    #[test]
    fn test_apply_failure_is_fatal_but_commit_drains_notifies() {
        let drain = Arc::new(RecordingNotifyDrain::new());
        let stage = CommitStage::new(
            Arc::new(ShardedStore::new(4)),
            Arc::new(NoopPersistence),
            Arc::clone(&drain) as Arc<dyn NotifyDrain>,
            CommitConfig::default(),
        );
        let client = ClientId::generate();
        // Delta for an object that was never materialized: apply fails.
        let txn = ServerTransaction::new(
            ServerTransactionId::new(client, TransactionId::new(1)),
            vec![DeltaRecord::delta(ObjectId::new(404), 1)],
        )
        .with_waiter(NotifiedWaiter {
            client,
            lock_name: "bin-lock".to_string(),
        });

        stage.receive(&txn).unwrap();
        let err = stage.apply(&txn).unwrap_err();
        assert!(err.is_fatal());

        stage.commit(&[&txn]).unwrap();
        assert_eq!(drain.drained().len(), 1);
    }

    #[test]
    fn test_commit_runs_inside_a_persistence_boundary() {
        use crate::txn::persistence::testing::CountingPersistence;
        use std::sync::atomic::Ordering;

        let persistence = Arc::new(CountingPersistence::default());
        let begun = Arc::clone(&persistence.begun);
        let committed = Arc::clone(&persistence.committed);
        let stage = CommitStage::new(
            Arc::new(ShardedStore::new(4)),
            persistence,
            Arc::new(crate::txn::notify::NoopNotifyDrain),
            CommitConfig::default(),
        );

        let client = ClientId::generate();
        let txn = txn_with_object(client, 1, 10);
        stage.receive(&txn).unwrap();
        stage.apply(&txn).unwrap();
        stage.commit(&[&txn]).unwrap();

        assert_eq!(begun.load(Ordering::SeqCst), 1);
        assert_eq!(committed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_acknowledgement_lifecycle() {
        let stage = stage();
        let source = ClientId::generate();
        let target_a = ClientId::generate();
        let target_b = ClientId::generate();
        let txn = txn_with_object(source, 1, 10);

        stage.receive(&txn).unwrap();
        stage.apply(&txn).unwrap();
        stage.commit(&[&txn]).unwrap();
        stage.add_waitee(txn.id, target_a).unwrap();
        stage.add_waitee(txn.id, target_b).unwrap();
        assert!(!stage.broadcast_complete(txn.id).unwrap());

        assert!(!stage.acknowledge(txn.id, target_a).unwrap());
        assert!(stage.acknowledge(txn.id, target_b).unwrap());
        assert_eq!(stage.live_count().unwrap(), 0);
    }

    #[test]
    fn test_dead_client_releases_waits() {
        let stage = stage();
        let source = ClientId::generate();
        let dead = ClientId::generate();
        let txn = txn_with_object(source, 1, 10);

        stage.receive(&txn).unwrap();
        stage.apply(&txn).unwrap();
        stage.commit(&[&txn]).unwrap();
        stage.add_waitee(txn.id, dead).unwrap();
        assert!(!stage.broadcast_complete(txn.id).unwrap());

        stage.clear_client(dead).unwrap();
        assert_eq!(stage.live_count().unwrap(), 0);
    }

    #[test]
    fn test_watermark_advances_and_never_regresses() {
        let stage = CommitStage::new(
            Arc::new(ShardedStore::new(4)),
            Arc::new(NoopPersistence),
            Arc::new(crate::txn::notify::NoopNotifyDrain),
            CommitConfig {
                watermark_interval: 1,
            },
        );
        let client = ClientId::generate();

        let mut last = GlobalSeq::new(0);
        for i in 1..=5 {
            let txn = txn_with_object(client, i, i as i64 * 100);
            stage.receive(&txn).unwrap();
            stage.apply(&txn).unwrap();
            let receipt = stage.commit(&[&txn]).unwrap();
            stage.broadcast_complete(txn.id).unwrap();
            assert!(receipt.low_watermark >= last);
            last = receipt.low_watermark;
        }
        assert!(stage.low_watermark().unwrap() >= GlobalSeq::new(1));
    }

    #[test]
    fn test_applied_registry_reclaimed_below_watermark() {
        let stage = CommitStage::new(
            Arc::new(ShardedStore::new(4)),
            Arc::new(NoopPersistence),
            Arc::new(crate::txn::notify::NoopNotifyDrain),
            CommitConfig {
                watermark_interval: 1,
            },
        );
        let client = ClientId::generate();

        for i in 1..=3 {
            let txn = txn_with_object(client, i, i as i64 * 10);
            stage.receive(&txn).unwrap();
            stage.apply(&txn).unwrap();
            stage.commit(&[&txn]).unwrap();
            stage.broadcast_complete(txn.id).unwrap();
        }
        // One more commit recomputes the watermark above the finished txns.
        let txn = txn_with_object(client, 4, 40);
        stage.receive(&txn).unwrap();
        stage.apply(&txn).unwrap();
        stage.commit(&[&txn]).unwrap();
        stage.broadcast_complete(txn.id).unwrap();

        assert!(stage.applied_count().unwrap() <= 1);
    }
}
