//! Broadcast stage: per-client pruned fan-out.
//!
//! Per BROADCAST.md:
//! - §1 for every live client except the committer, the payload is pruned
//!   to objects that client does not already hold
//! - §2 when pruned changes, lookups, waiters and roots are all empty, no
//!   message is sent at all
//! - §3 lookups beyond the batch ceiling are recorded against the client
//!   but do not delay the message
//! - §4 a dead channel abandons that client's broadcast only: its state is
//!   released and the fan-out continues

use std::sync::Arc;

use crate::observability::{log_event, Event};
use crate::oid::ObjectId;
use crate::txn::{ApplyInfo, ClientId, CommitStage, ServerTransaction};

use super::channel::ChannelManager;
use super::client_state::ClientStateManager;
use super::errors::{BroadcastResult, ChannelError};
use super::message::BroadcastMessage;

pub const DEFAULT_LOOKUP_BATCH_CEILING: usize = 500;

/// Broadcast tuning.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Lookup identifiers carried in one message; overflow is recorded as
    /// pending against the client.
    pub lookup_batch_ceiling: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            lookup_batch_ceiling: DEFAULT_LOOKUP_BATCH_CEILING,
        }
    }
}

/// What one fan-out did.
#[derive(Debug, Default)]
pub struct BroadcastSummary {
    pub sent_to: Vec<ClientId>,
    pub skipped: Vec<ClientId>,
    pub dead: Vec<ClientId>,
    /// True when the transaction completed during the fan-out (no
    /// acknowledgements outstanding).
    pub fully_acknowledged: bool,
}

/// Fans committed transactions out to the clients that need them.
pub struct BroadcastStage {
    channels: Arc<dyn ChannelManager>,
    clients: Arc<ClientStateManager>,
    commit: Arc<CommitStage>,
    config: BroadcastConfig,
}

impl BroadcastStage {
    pub fn new(
        channels: Arc<dyn ChannelManager>,
        clients: Arc<ClientStateManager>,
        commit: Arc<CommitStage>,
        config: BroadcastConfig,
    ) -> Self {
        Self {
            channels,
            clients,
            commit,
            config,
        }
    }

    pub fn client_states(&self) -> &Arc<ClientStateManager> {
        &self.clients
    }

    /// Fan one committed transaction out to every interested client.
    pub fn broadcast(
        &self,
        txn: &ServerTransaction,
        info: &ApplyInfo,
    ) -> BroadcastResult<BroadcastSummary> {
        let mut summary = BroadcastSummary::default();

        for client in self.channels.active_clients() {
            if client == txn.id.source {
                continue;
            }
            if !self.clients.is_tracked(client) {
                continue;
            }

            let message = self.prune_for(client, txn, info)?;
            if message.is_empty() {
                log_event(
                    Event::BroadcastSkipped,
                    &[("client", &client.to_string()), ("txn", &txn.id.to_string())],
                );
                summary.skipped.push(client);
                continue;
            }

            // The transaction owes this client's acknowledgement from the
            // moment the message can reach it.
            self.commit.add_waitee(txn.id, client)?;
            let sent_ids: Vec<ObjectId> =
                message.changes.iter().map(|c| c.object_id()).collect();

            match self.channels.send(client, message) {
                Ok(()) => {
                    self.clients.add_references(client, sent_ids)?;
                    log_event(
                        Event::BroadcastSent,
                        &[("client", &client.to_string()), ("txn", &txn.id.to_string())],
                    );
                    summary.sent_to.push(client);
                }
                Err(ChannelError::NoSuchChannel(_)) | Err(ChannelError::Closed(_)) => {
                    log_event(
                        Event::BroadcastDeadChannel,
                        &[("client", &client.to_string()), ("txn", &txn.id.to_string())],
                    );
                    self.clients.remove_client(client);
                    self.commit.clear_client(client)?;
                    summary.dead.push(client);
                }
            }
        }

        summary.fully_acknowledged = self.commit.broadcast_complete(txn.id)?;
        Ok(summary)
    }

    /// Compute the pruned message for one client: changes it lacks, lookups
    /// it must fault in, its waiters, and new roots.
    pub fn prune_for(
        &self,
        client: ClientId,
        txn: &ServerTransaction,
        info: &ApplyInfo,
    ) -> BroadcastResult<BroadcastMessage> {
        let known = self.clients.known_snapshot(client)?;
        let mut message = BroadcastMessage::new(txn.id);

        for record in &txn.changes {
            if !known.contains(record.object_id()) {
                message.changes.push(record.clone());
            }
        }

        // Newly referenced objects the client cannot resolve locally and is
        // not receiving in this payload.
        let mut lookups: Vec<ObjectId> = info
            .referenced
            .iter()
            .filter(|id| !known.contains(*id))
            .filter(|id| !message.changes.iter().any(|c| c.object_id() == *id))
            .collect();
        if lookups.len() > self.config.lookup_batch_ceiling {
            let overflow = lookups.split_off(self.config.lookup_batch_ceiling);
            self.clients.record_pending_lookups(client, overflow)?;
        }
        message.lookup_ids = lookups;

        message.notified = txn
            .notified_waiters
            .iter()
            .filter(|w| w.client == client)
            .cloned()
            .collect();
        message.new_roots = txn.new_roots.clone();

        Ok(message)
    }
}
