//! Per-client object residency tracking.
//!
//! Per BROADCAST.md §1: the server remembers, per client, which objects
//! that client already holds, so fan-out sends only what is missing. The
//! sets are owned by this manager and synchronized here; they are the
//! canonical example of a per-subsystem id-set owner.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::oid::{ObjectId, ObjectIdSet, SetRepresentation};
use crate::txn::ClientId;

use super::errors::{BroadcastError, BroadcastResult};

#[derive(Debug)]
struct ClientState {
    /// Objects this client holds a local copy of.
    known: ObjectIdSet,
    /// Lookups recorded past the batch ceiling, still owed to the client.
    pending_lookups: ObjectIdSet,
}

impl ClientState {
    fn new() -> Self {
        Self {
            // Residency sets are dense per client; the bit-vector form is
            // the compact one here.
            known: ObjectIdSet::with_representation(SetRepresentation::BitSet),
            pending_lookups: ObjectIdSet::new(),
        }
    }
}

/// Tracks object residency for every connected client.
#[derive(Default)]
pub struct ClientStateManager {
    clients: RwLock<HashMap<ClientId, ClientState>>,
}

impl ClientStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_client(&self, client: ClientId) {
        if let Ok(mut clients) = self.clients.write() {
            clients.entry(client).or_insert_with(ClientState::new);
        }
    }

    /// Remove a client, returning the identifiers it had checked out so the
    /// caller can release them.
    pub fn remove_client(&self, client: ClientId) -> Option<ObjectIdSet> {
        self.clients
            .write()
            .ok()
            .and_then(|mut clients| clients.remove(&client))
            .map(|state| state.known)
    }

    pub fn is_tracked(&self, client: ClientId) -> bool {
        self.clients
            .read()
            .map(|clients| clients.contains_key(&client))
            .unwrap_or(false)
    }

    /// Record that `client` now holds `ids`.
    pub fn add_references<I>(&self, client: ClientId, ids: I) -> BroadcastResult<()>
    where
        I: IntoIterator<Item = ObjectId>,
    {
        let mut clients = self
            .clients
            .write()
            .map_err(|_| BroadcastError::LockPoisoned)?;
        let state = clients
            .get_mut(&client)
            .ok_or(BroadcastError::UnknownClient(client))?;
        state.known.add_all(ids);
        Ok(())
    }

    pub fn knows(&self, client: ClientId, id: ObjectId) -> bool {
        self.clients
            .read()
            .ok()
            .and_then(|clients| clients.get(&client).map(|s| s.known.contains(id)))
            .unwrap_or(false)
    }

    /// Copy of the client's known-object set.
    pub fn known_snapshot(&self, client: ClientId) -> BroadcastResult<ObjectIdSet> {
        let clients = self
            .clients
            .read()
            .map_err(|_| BroadcastError::LockPoisoned)?;
        clients
            .get(&client)
            .map(|state| state.known.clone())
            .ok_or(BroadcastError::UnknownClient(client))
    }

    /// Record lookups that exceeded the batch ceiling.
    pub fn record_pending_lookups<I>(&self, client: ClientId, ids: I) -> BroadcastResult<()>
    where
        I: IntoIterator<Item = ObjectId>,
    {
        let mut clients = self
            .clients
            .write()
            .map_err(|_| BroadcastError::LockPoisoned)?;
        let state = clients
            .get_mut(&client)
            .ok_or(BroadcastError::UnknownClient(client))?;
        state.pending_lookups.add_all(ids);
        Ok(())
    }

    /// Take the lookups still owed to a client.
    pub fn take_pending_lookups(&self, client: ClientId) -> BroadcastResult<ObjectIdSet> {
        let mut clients = self
            .clients
            .write()
            .map_err(|_| BroadcastError::LockPoisoned)?;
        let state = clients
            .get_mut(&client)
            .ok_or(BroadcastError::UnknownClient(client))?;
        Ok(std::mem::take(&mut state.pending_lookups))
    }
}
