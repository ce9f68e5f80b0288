//! Passive-side activity handling.
//!
//! Per REPLICATION_STREAM.md §5: the passive applies activities in
//! activity-id order even when the transport below reorders frames. The
//! sequencer buffers ahead-of-order arrivals and releases contiguous runs;
//! duplicates below the release point are dropped (at-least-once delivery
//! makes them legal).

use std::collections::BTreeMap;

use crate::observability::{log_event, Event};

use super::ack::{AckBatch, ResultCode};
use super::activity::{ActivityType, SyncReplicationActivity};
use super::errors::{ReplError, ReplResult};
use super::message::{ReplicationMessage, ReplicationPayload};
use super::sync::SyncTracker;

/// Releases activities in identifier order regardless of arrival order.
#[derive(Debug)]
pub struct ActivitySequencer {
    next_expected: u64,
    buffered: BTreeMap<u64, SyncReplicationActivity>,
}

impl ActivitySequencer {
    pub fn new() -> Self {
        Self {
            next_expected: 1,
            buffered: BTreeMap::new(),
        }
    }

    pub fn buffered_count(&self) -> usize {
        self.buffered.len()
    }

    /// Offer one arrival. Returns the contiguous run now releasable, which
    /// may be empty (gap still open) or longer than one (gap just closed).
    pub fn offer(
        &mut self,
        activity: SyncReplicationActivity,
    ) -> ReplResult<Vec<SyncReplicationActivity>> {
        let id = activity.id.value();
        if id == 0 {
            return Err(ReplError::internal("unassigned activity id on passive"));
        }
        if id < self.next_expected {
            // Redelivery of something already released.
            return Ok(Vec::new());
        }
        self.buffered.insert(id, activity);

        let mut released = Vec::new();
        while let Some(activity) = self.buffered.remove(&self.next_expected) {
            self.next_expected += 1;
            released.push(activity);
        }
        Ok(released)
    }
}

impl Default for ActivitySequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies replicated activities on the passive and produces ack batches.
pub struct PassiveReplicationHandler {
    sequencer: ActivitySequencer,
    sync: SyncTracker,
    applied: Vec<SyncReplicationActivity>,
    pending_acks: AckBatch,
    ack_batch_size: usize,
    next_response_sequence: u64,
}

impl PassiveReplicationHandler {
    pub fn new(ack_batch_size: usize) -> Self {
        Self {
            sequencer: ActivitySequencer::new(),
            sync: SyncTracker::new(),
            applied: Vec::new(),
            pending_acks: AckBatch::new(),
            ack_batch_size: ack_batch_size.max(1),
            next_response_sequence: 0,
        }
    }

    /// Activities applied so far, in application order.
    pub fn applied(&self) -> &[SyncReplicationActivity] {
        &self.applied
    }

    pub fn sync_complete(&self) -> bool {
        self.sync.is_complete()
    }

    /// Handle one incoming message. Returns a response message when the
    /// pending ack batch reached the configured size.
    pub fn receive(
        &mut self,
        message: ReplicationMessage,
    ) -> ReplResult<Option<ReplicationMessage>> {
        let activity = match message.payload {
            ReplicationPayload::Replicate(activity) => activity,
            ReplicationPayload::Response(_) => {
                return Err(ReplError::internal(
                    "passive received a RESPONSE message",
                ));
            }
        };

        // Durably queued from the sender's point of view.
        self.pending_acks.push(activity.id, ResultCode::Received);

        for released in self.sequencer.offer(activity)? {
            let id = released.id;
            match self.apply(released) {
                Ok(()) => self.pending_acks.push(id, ResultCode::Success),
                Err(err) => {
                    // Fatal to this activity; the active learns through the
                    // FAIL ack and surfaces it. No retry on either side.
                    log_event(
                        Event::ActivityFailed,
                        &[("activity", &id.to_string()), ("error", &err.to_string())],
                    );
                    self.pending_acks.push(id, ResultCode::Fail);
                }
            }
        }

        if self.pending_acks.len() >= self.ack_batch_size {
            return Ok(Some(self.flush_acks()));
        }
        Ok(None)
    }

    /// Drain pending acks into a RESPONSE message.
    pub fn flush_acks(&mut self) -> ReplicationMessage {
        self.next_response_sequence += 1;
        let batch = std::mem::take(&mut self.pending_acks);
        ReplicationMessage::response(self.next_response_sequence, batch)
    }

    pub fn pending_ack_count(&self) -> usize {
        self.pending_acks.len()
    }

    fn apply(&mut self, activity: SyncReplicationActivity) -> ReplResult<()> {
        self.sync.observe(&activity)?;
        match activity.kind {
            ActivityType::SyncBegin => {
                log_event(Event::SyncStart, &[]);
            }
            ActivityType::SyncEnd => {
                log_event(
                    Event::SyncComplete,
                    &[("entities", &self.sync.entities_synced().to_string())],
                );
            }
            _ => {}
        }
        self.applied.push(activity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repl::activity::{ActivityId, EntityDescriptor};
    use crate::txn::{ClientId, TransactionId};

    fn activity(id: u64) -> SyncReplicationActivity {
        SyncReplicationActivity::invoke(
            EntityDescriptor::named("bin-map"),
            ClientId::generate(),
            TransactionId::new(id),
            TransactionId::new(id),
            vec![],
        )
        .with_id(ActivityId::new(id))
    }

    #[test]
    fn test_sequencer_releases_in_order() {
        let mut sequencer = ActivitySequencer::new();
        assert!(sequencer.offer(activity(2)).unwrap().is_empty());
        assert!(sequencer.offer(activity(3)).unwrap().is_empty());
        assert_eq!(sequencer.buffered_count(), 2);

        let released = sequencer.offer(activity(1)).unwrap();
        let ids: Vec<u64> = released.iter().map(|a| a.id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(sequencer.buffered_count(), 0);
    }

    #[test]
    fn test_sequencer_drops_duplicates() {
        let mut sequencer = ActivitySequencer::new();
        assert_eq!(sequencer.offer(activity(1)).unwrap().len(), 1);
        assert!(sequencer.offer(activity(1)).unwrap().is_empty());
    }

    #[test]
    fn test_handler_applies_in_order_despite_reordering() {
        let mut handler = PassiveReplicationHandler::new(100);
        for id in [3u64, 1, 2] {
            handler
                .receive(ReplicationMessage::replicate(id, activity(id)))
                .unwrap();
        }
        let ids: Vec<u64> = handler.applied().iter().map(|a| a.id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_acks_batch_at_threshold() {
        let mut handler = PassiveReplicationHandler::new(4);
        // Activity 1: RECEIVED + SUCCESS = 2 pending acks.
        assert!(handler
            .receive(ReplicationMessage::replicate(1, activity(1)))
            .unwrap()
            .is_none());
        // Activity 2 pushes the batch to 4: flushed.
        let response = handler
            .receive(ReplicationMessage::replicate(2, activity(2)))
            .unwrap()
            .expect("batch should flush");
        match response.payload {
            ReplicationPayload::Response(batch) => {
                assert_eq!(batch.len(), 4);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        assert_eq!(handler.pending_ack_count(), 0);
    }

    #[test]
    fn test_bracket_violation_produces_fail_ack() {
        let mut handler = PassiveReplicationHandler::new(100);
        let src = ClientId::generate();
        // SYNC_ENTITY_BEGIN without SYNC_BEGIN.
        let bad = SyncReplicationActivity::sync_entity_begin(
            EntityDescriptor::named("bin-map"),
            src,
        )
        .with_id(ActivityId::new(1));
        handler
            .receive(ReplicationMessage::replicate(1, bad))
            .unwrap();

        let response = handler.flush_acks();
        match response.payload {
            ReplicationPayload::Response(batch) => {
                assert!(batch
                    .entries
                    .iter()
                    .any(|(id, code)| *id == ActivityId::new(1) && *code == ResultCode::Fail));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        assert!(handler.applied().is_empty());
    }

    #[test]
    fn test_full_sync_through_handler() {
        let mut handler = PassiveReplicationHandler::new(1000);
        let src = ClientId::generate();
        let entity = EntityDescriptor::named("bin-map");
        let steps = vec![
            SyncReplicationActivity::sync_begin(src),
            SyncReplicationActivity::sync_entity_begin(entity.clone(), src),
            SyncReplicationActivity::sync_concurrency_begin(entity.clone(), src, 1),
            SyncReplicationActivity::sync_payload(entity.clone(), src, 1, vec![1, 2]),
            SyncReplicationActivity::sync_concurrency_end(entity.clone(), src, 1),
            SyncReplicationActivity::sync_entity_end(entity.clone(), src),
            SyncReplicationActivity::sync_end(src),
        ];
        for (index, step) in steps.into_iter().enumerate() {
            let id = index as u64 + 1;
            handler
                .receive(ReplicationMessage::replicate(
                    id,
                    step.with_id(ActivityId::new(id)),
                ))
                .unwrap();
        }
        assert!(handler.sync_complete());
        assert_eq!(handler.applied().len(), 7);
    }
}
