//! Channel-manager collaborator.
//!
//! The transport itself is external; the broadcast stage consumes it
//! through this trait: enumerate live clients, send one typed message,
//! observe "no such channel" when a client died mid-send.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};

use crate::txn::ClientId;

use super::errors::ChannelError;
use super::message::BroadcastMessage;

/// Connection manager as seen by the broadcast stage.
pub trait ChannelManager: Send + Sync {
    /// Clients with a live channel, in no particular order.
    fn active_clients(&self) -> Vec<ClientId>;

    fn send(&self, client: ClientId, message: BroadcastMessage) -> Result<(), ChannelError>;
}

/// In-process channel manager: one queue per client. Backs tests and the
/// single-process assembly.
#[derive(Default)]
pub struct InProcessChannelManager {
    queues: RwLock<HashMap<ClientId, Mutex<VecDeque<BroadcastMessage>>>>,
}

impl InProcessChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, client: ClientId) {
        if let Ok(mut queues) = self.queues.write() {
            queues.entry(client).or_insert_with(|| Mutex::new(VecDeque::new()));
        }
    }

    pub fn disconnect(&self, client: ClientId) {
        if let Ok(mut queues) = self.queues.write() {
            queues.remove(&client);
        }
    }

    /// Drain everything queued for a client.
    pub fn drain(&self, client: ClientId) -> Vec<BroadcastMessage> {
        let queues = match self.queues.read() {
            Ok(queues) => queues,
            Err(_) => return Vec::new(),
        };
        let drained = match queues.get(&client).and_then(|q| q.lock().ok()) {
            Some(mut queue) => queue.drain(..).collect(),
            None => Vec::new(),
        };
        drained
    }
}

impl ChannelManager for InProcessChannelManager {
    fn active_clients(&self) -> Vec<ClientId> {
        self.queues
            .read()
            .map(|queues| queues.keys().copied().collect())
            .unwrap_or_default()
    }

    fn send(&self, client: ClientId, message: BroadcastMessage) -> Result<(), ChannelError> {
        let queues = self
            .queues
            .read()
            .map_err(|_| ChannelError::Closed(client))?;
        let queue = queues
            .get(&client)
            .ok_or(ChannelError::NoSuchChannel(client))?;
        queue
            .lock()
            .map_err(|_| ChannelError::Closed(client))?
            .push_back(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::{ServerTransactionId, TransactionId};

    fn message(client: ClientId) -> BroadcastMessage {
        BroadcastMessage::new(ServerTransactionId::new(client, TransactionId::new(1)))
    }

    #[test]
    fn test_send_and_drain() {
        let manager = InProcessChannelManager::new();
        let client = ClientId::generate();
        manager.register(client);

        manager.send(client, message(client)).unwrap();
        manager.send(client, message(client)).unwrap();
        assert_eq!(manager.drain(client).len(), 2);
        assert_eq!(manager.drain(client).len(), 0);
    }

    #[test]
    fn test_send_to_dead_client() {
        let manager = InProcessChannelManager::new();
        let client = ClientId::generate();
        manager.register(client);
        manager.disconnect(client);

        assert_eq!(
            manager.send(client, message(client)),
            Err(ChannelError::NoSuchChannel(client))
        );
        assert!(manager.active_clients().is_empty());
    }
}
