//! Active-side replication stream.
//!
//! Per REPLICATION_STREAM.md:
//! - §1 every replicated mutation becomes an activity with a freshly
//!   assigned monotonic identifier; activities to one passive are delivered
//!   in identifier order
//! - §2 each envelope resolves exactly once: sent, or dropped without send
//! - §3 acks arrive batched; RECEIVED releases resend retention, SUCCESS
//!   completes, FAIL completes exceptionally and is surfaced

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::observability::{log_event, Event};

use super::ack::{AckBatch, ResultCode};
use super::activity::{ActivityId, PassiveId, SyncReplicationActivity};
use super::envelope::ReplicationEnvelope;
use super::errors::{ReplError, ReplResult};
use super::message::ReplicationMessage;

/// Transport collaborator: delivers one framed message to one passive.
pub trait ReplicationTransport: Send + Sync {
    fn deliver(&self, destination: PassiveId, message: ReplicationMessage) -> ReplResult<()>;
}

/// In-process transport: one queue per passive. Backs tests and the
/// single-process assembly.
#[derive(Default)]
pub struct LoopbackTransport {
    queues: Mutex<HashMap<PassiveId, Vec<ReplicationMessage>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self, destination: PassiveId) -> Vec<ReplicationMessage> {
        self.queues
            .lock()
            .ok()
            .and_then(|mut queues| queues.remove(&destination))
            .unwrap_or_default()
    }
}

impl ReplicationTransport for LoopbackTransport {
    fn deliver(&self, destination: PassiveId, message: ReplicationMessage) -> ReplResult<()> {
        self.queues
            .lock()
            .map_err(|_| ReplError::internal("loopback transport lock poisoned"))?
            .entry(destination)
            .or_default()
            .push(message);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlight {
    received: bool,
}

struct PassiveSession {
    in_flight: BTreeMap<ActivityId, InFlight>,
    last_sent: Option<ActivityId>,
}

impl PassiveSession {
    fn new() -> Self {
        Self {
            in_flight: BTreeMap::new(),
            last_sent: None,
        }
    }
}

struct StreamState {
    next_activity: u64,
    next_sequence: u64,
    passives: HashMap<PassiveId, PassiveSession>,
}

/// Summary of one processed ack batch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AckSummary {
    pub received: Vec<ActivityId>,
    pub succeeded: Vec<ActivityId>,
    /// FAIL-acked activities, surfaced to the caller. No automatic retry.
    pub failed: Vec<ActivityId>,
}

/// Sends activities to passives in order and tracks their acknowledgement.
pub struct ReplicationStream {
    transport: Arc<dyn ReplicationTransport>,
    inner: Mutex<StreamState>,
}

impl ReplicationStream {
    pub fn new(transport: Arc<dyn ReplicationTransport>) -> Self {
        Self {
            transport,
            inner: Mutex::new(StreamState {
                next_activity: 0,
                next_sequence: 0,
                passives: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> ReplResult<MutexGuard<'_, StreamState>> {
        self.inner
            .lock()
            .map_err(|_| ReplError::internal("replication stream lock poisoned"))
    }

    /// Assign the next activity identifier and dispatch to one passive.
    ///
    /// The activity's `id` field is overwritten with the assigned value.
    /// Exactly one of the envelope callbacks fires before this returns.
    pub fn replicate(
        &self,
        destination: PassiveId,
        activity: SyncReplicationActivity,
        on_sent: Option<Box<dyn FnOnce() + Send>>,
        on_dropped: Box<dyn FnOnce() + Send>,
    ) -> ReplResult<ActivityId> {
        let (id, sequence) = {
            let mut inner = self.lock()?;
            inner.next_activity += 1;
            inner.next_sequence += 1;
            let id = ActivityId::new(inner.next_activity);
            let session = inner
                .passives
                .entry(destination)
                .or_insert_with(PassiveSession::new);
            session.in_flight.insert(id, InFlight { received: false });
            session.last_sent = Some(id);
            (id, inner.next_sequence)
        };

        let mut envelope = ReplicationEnvelope::new(
            activity.with_id(id),
            destination,
            on_sent,
            on_dropped,
        );
        let message = ReplicationMessage::replicate(sequence, envelope.activity.clone());

        match self.transport.deliver(destination, message) {
            Ok(()) => {
                envelope.mark_sent();
                log_event(
                    Event::ActivitySent,
                    &[
                        ("activity", &id.to_string()),
                        ("passive", &destination.to_string()),
                    ],
                );
                Ok(id)
            }
            Err(err) => {
                envelope.mark_dropped();
                let mut inner = self.lock()?;
                if let Some(session) = inner.passives.get_mut(&destination) {
                    session.in_flight.remove(&id);
                }
                log_event(
                    Event::ActivityDropped,
                    &[
                        ("activity", &id.to_string()),
                        ("passive", &destination.to_string()),
                    ],
                );
                Err(err)
            }
        }
    }

    /// Consume one batch of acknowledgements from a passive.
    pub fn receive_acks(&self, from: PassiveId, batch: &AckBatch) -> ReplResult<AckSummary> {
        let mut inner = self.lock()?;
        let session = inner
            .passives
            .get_mut(&from)
            .ok_or_else(|| ReplError::unknown_activity(format!("no session for {}", from)))?;

        let mut summary = AckSummary::default();
        for (id, code) in &batch.entries {
            match code {
                ResultCode::Received => {
                    let entry = session.in_flight.get_mut(id).ok_or_else(|| {
                        ReplError::unknown_activity(format!("RECEIVED for unknown {}", id))
                    })?;
                    entry.received = true;
                    summary.received.push(*id);
                }
                ResultCode::Success => {
                    session.in_flight.remove(id).ok_or_else(|| {
                        ReplError::unknown_activity(format!("SUCCESS for unknown {}", id))
                    })?;
                    summary.succeeded.push(*id);
                }
                ResultCode::Fail => {
                    session.in_flight.remove(id).ok_or_else(|| {
                        ReplError::unknown_activity(format!("FAIL for unknown {}", id))
                    })?;
                    summary.failed.push(*id);
                    log_event(
                        Event::ActivityFailed,
                        &[("activity", &id.to_string()), ("passive", &from.to_string())],
                    );
                }
            }
        }
        log_event(
            Event::AckBatchReceived,
            &[
                ("passive", &from.to_string()),
                ("entries", &batch.len().to_string()),
            ],
        );
        Ok(summary)
    }

    /// Activities not yet conclusively acknowledged by a passive.
    pub fn in_flight_count(&self, passive: PassiveId) -> ReplResult<usize> {
        let inner = self.lock()?;
        Ok(inner
            .passives
            .get(&passive)
            .map(|s| s.in_flight.len())
            .unwrap_or(0))
    }

    /// Highest activity identifier sent to a passive.
    pub fn last_sent(&self, passive: PassiveId) -> ReplResult<Option<ActivityId>> {
        let inner = self.lock()?;
        Ok(inner.passives.get(&passive).and_then(|s| s.last_sent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repl::activity::EntityDescriptor;
    use crate::repl::message::ReplicationPayload;
    use crate::txn::{ClientId, TransactionId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn activity(txn: u64) -> SyncReplicationActivity {
        SyncReplicationActivity::invoke(
            EntityDescriptor::named("bin-map"),
            ClientId::generate(),
            TransactionId::new(txn),
            TransactionId::new(txn),
            vec![],
        )
    }

    fn no_op() -> Box<dyn FnOnce() + Send> {
        Box::new(|| {})
    }

    #[test]
    fn test_activity_ids_strictly_increase() {
        let transport = Arc::new(LoopbackTransport::new());
        let stream = ReplicationStream::new(Arc::clone(&transport) as _);
        let passive = PassiveId::generate();

        let mut last = ActivityId::new(0);
        for i in 1..=10 {
            let id = stream
                .replicate(passive, activity(i), None, no_op())
                .unwrap();
            assert!(id > last);
            last = id;
        }

        let delivered = transport.drain(passive);
        assert_eq!(delivered.len(), 10);
        let mut prev = 0;
        for message in delivered {
            match message.payload {
                ReplicationPayload::Replicate(a) => {
                    assert!(a.id.value() > prev);
                    prev = a.id.value();
                }
                other => panic!("unexpected payload: {:?}", other),
            }
        }
    }

    #[test]
    fn test_sent_callback_fires_on_delivery() {
        let transport = Arc::new(LoopbackTransport::new());
        let stream = ReplicationStream::new(Arc::clone(&transport) as _);
        let passive = PassiveId::generate();

        let sent = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicUsize::new(0));
        let sent_cb = Arc::clone(&sent);
        let dropped_cb = Arc::clone(&dropped);

        stream
            .replicate(
                passive,
                activity(1),
                Some(Box::new(move || {
                    sent_cb.fetch_add(1, Ordering::SeqCst);
                })),
                Box::new(move || {
                    dropped_cb.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        assert_eq!(sent.load(Ordering::SeqCst), 1);
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
    }

    struct FailingTransport;

    impl ReplicationTransport for FailingTransport {
        fn deliver(&self, _: PassiveId, _: ReplicationMessage) -> ReplResult<()> {
            Err(ReplError::transport("wire down"))
        }
    }

    #[test]
    fn test_dropped_callback_fires_on_transport_failure() {
        let stream = ReplicationStream::new(Arc::new(FailingTransport));
        let passive = PassiveId::generate();

        let dropped = Arc::new(AtomicUsize::new(0));
        let dropped_cb = Arc::clone(&dropped);
        let err = stream
            .replicate(
                passive,
                activity(1),
                None,
                Box::new(move || {
                    dropped_cb.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap_err();
        assert_eq!(err.kind, crate::repl::ReplErrorKind::Transport);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert_eq!(stream.in_flight_count(passive).unwrap(), 0);
    }

    #[test]
    fn test_ack_lifecycle() {
        let transport = Arc::new(LoopbackTransport::new());
        let stream = ReplicationStream::new(Arc::clone(&transport) as _);
        let passive = PassiveId::generate();

        let a = stream.replicate(passive, activity(1), None, no_op()).unwrap();
        let b = stream.replicate(passive, activity(2), None, no_op()).unwrap();
        assert_eq!(stream.in_flight_count(passive).unwrap(), 2);

        let mut batch = AckBatch::new();
        batch.push(a, ResultCode::Received);
        batch.push(a, ResultCode::Success);
        batch.push(b, ResultCode::Fail);
        let summary = stream.receive_acks(passive, &batch).unwrap();

        assert_eq!(summary.received, vec![a]);
        assert_eq!(summary.succeeded, vec![a]);
        assert_eq!(summary.failed, vec![b]);
        assert_eq!(stream.in_flight_count(passive).unwrap(), 0);
    }

    #[test]
    fn test_ack_for_unknown_activity_is_fatal() {
        let transport = Arc::new(LoopbackTransport::new());
        let stream = ReplicationStream::new(Arc::clone(&transport) as _);
        let passive = PassiveId::generate();
        stream.replicate(passive, activity(1), None, no_op()).unwrap();

        let mut batch = AckBatch::new();
        batch.push(ActivityId::new(99), ResultCode::Success);
        let err = stream.receive_acks(passive, &batch).unwrap_err();
        assert!(err.is_fatal());
    }
}
