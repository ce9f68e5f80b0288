//! Replication envelopes with dispatch-completion signalling.
//!
//! Per REPLICATION_STREAM.md §2: every envelope carries an optional "sent"
//! callback and a required "dropped-without-send" callback. Exactly one of
//! the two fires, exactly once, for every envelope, including envelopes
//! discarded on error paths, which resolve as dropped when the envelope is
//! destroyed.

use super::activity::{PassiveId, SyncReplicationActivity};

type Callback = Box<dyn FnOnce() + Send>;

/// Single-assignment completion signal.
pub struct DispatchCompletion {
    on_sent: Option<Callback>,
    on_dropped: Option<Callback>,
    resolved: bool,
}

impl DispatchCompletion {
    /// `on_dropped` is required; `on_sent` is optional.
    pub fn new(on_sent: Option<Callback>, on_dropped: Callback) -> Self {
        Self {
            on_sent,
            on_dropped: Some(on_dropped),
            resolved: false,
        }
    }

    /// Resolve as sent. A second resolution of either kind is a no-op.
    pub fn resolve_sent(&mut self) {
        if self.resolved {
            return;
        }
        self.resolved = true;
        self.on_dropped = None;
        if let Some(callback) = self.on_sent.take() {
            callback();
        }
    }

    /// Resolve as dropped without send.
    pub fn resolve_dropped(&mut self) {
        if self.resolved {
            return;
        }
        self.resolved = true;
        self.on_sent = None;
        if let Some(callback) = self.on_dropped.take() {
            callback();
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }
}

impl Drop for DispatchCompletion {
    fn drop(&mut self) {
        // An envelope destroyed unresolved was dropped without send.
        self.resolve_dropped();
    }
}

/// An activity addressed to one passive, with its completion signal.
pub struct ReplicationEnvelope {
    pub activity: SyncReplicationActivity,
    pub destination: PassiveId,
    completion: DispatchCompletion,
}

impl ReplicationEnvelope {
    pub fn new(
        activity: SyncReplicationActivity,
        destination: PassiveId,
        on_sent: Option<Callback>,
        on_dropped: Callback,
    ) -> Self {
        Self {
            activity,
            destination,
            completion: DispatchCompletion::new(on_sent, on_dropped),
        }
    }

    pub fn mark_sent(&mut self) {
        self.completion.resolve_sent();
    }

    pub fn mark_dropped(&mut self) {
        self.completion.resolve_dropped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repl::activity::{ActivityId, EntityDescriptor};
    use crate::txn::{ClientId, TransactionId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn activity() -> SyncReplicationActivity {
        SyncReplicationActivity::invoke(
            EntityDescriptor::named("bin-map"),
            ClientId::generate(),
            TransactionId::new(1),
            TransactionId::new(1),
            vec![],
        )
        .with_id(ActivityId::new(1))
    }

    fn counters() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)))
    }

    fn envelope(sent: &Arc<AtomicUsize>, dropped: &Arc<AtomicUsize>) -> ReplicationEnvelope {
        let sent = Arc::clone(sent);
        let dropped = Arc::clone(dropped);
        ReplicationEnvelope::new(
            activity(),
            PassiveId::generate(),
            Some(Box::new(move || {
                sent.fetch_add(1, Ordering::SeqCst);
            })),
            Box::new(move || {
                dropped.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_sent_fires_once() {
        let (sent, dropped) = counters();
        let mut env = envelope(&sent, &dropped);
        env.mark_sent();
        env.mark_sent();
        env.mark_dropped();
        drop(env);
        assert_eq!(sent.load(Ordering::SeqCst), 1);
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dropped_fires_once() {
        let (sent, dropped) = counters();
        let mut env = envelope(&sent, &dropped);
        env.mark_dropped();
        env.mark_sent();
        drop(env);
        assert_eq!(sent.load(Ordering::SeqCst), 0);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destruction_without_resolution_counts_as_dropped() {
        let (sent, dropped) = counters();
        let env = envelope(&sent, &dropped);
        drop(env);
        assert_eq!(sent.load(Ordering::SeqCst), 0);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_envelope_without_sent_callback() {
        let (_, dropped) = counters();
        let dropped_clone = Arc::clone(&dropped);
        let mut env = ReplicationEnvelope::new(
            activity(),
            PassiveId::generate(),
            None,
            Box::new(move || {
                dropped_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        env.mark_sent();
        drop(env);
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
    }
}
