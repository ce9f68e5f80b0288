//! Persistence-transaction collaborator.
//!
//! The durable layer is external; the commit stage only needs a
//! begin/commit boundary around apply + commit bookkeeping so a crash can
//! never expose applied-but-uncommitted state.

/// One persistence transaction.
pub trait PersistenceTxn: Send {
    fn commit(self: Box<Self>);
}

/// Provides persistence-transaction boundaries.
pub trait PersistenceProvider: Send + Sync {
    fn begin(&self) -> Box<dyn PersistenceTxn>;
}

/// In-memory provider: boundaries exist, durability is a no-op.
pub struct NoopPersistence;

struct NoopTxn;

impl PersistenceTxn for NoopTxn {
    fn commit(self: Box<Self>) {}
}

impl PersistenceProvider for NoopPersistence {
    fn begin(&self) -> Box<dyn PersistenceTxn> {
        Box::new(NoopTxn)
    }
}

/// Counts begin/commit pairs. Test collaborator.
pub mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{PersistenceProvider, PersistenceTxn};

    #[derive(Default)]
    pub struct CountingPersistence {
        pub begun: Arc<AtomicUsize>,
        pub committed: Arc<AtomicUsize>,
    }

    struct CountingTxn {
        committed: Arc<AtomicUsize>,
    }

    impl PersistenceTxn for CountingTxn {
        fn commit(self: Box<Self>) {
            self.committed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl PersistenceProvider for CountingPersistence {
        fn begin(&self) -> Box<dyn PersistenceTxn> {
            self.begun.fetch_add(1, Ordering::SeqCst);
            Box::new(CountingTxn {
                committed: Arc::clone(&self.committed),
            })
        }
    }
}
