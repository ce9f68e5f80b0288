//! Replication activities.
//!
//! Per REPLICATION_STREAM.md §1: one activity = one unit of replicated
//! work. Activity identifiers are assigned monotonically by the stream; a
//! passive must apply activities in identifier order.

use std::fmt;

use uuid::Uuid;

use crate::txn::{ClientId, TransactionId};

/// Monotonic activity identifier, unique per stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActivityId(u64);

impl ActivityId {
    /// Placeholder before the stream assigns the real identifier.
    pub const UNASSIGNED: ActivityId = ActivityId(0);

    pub const fn new(value: u64) -> Self {
        ActivityId(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one passive (standby) server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassiveId(Uuid);

impl PassiveId {
    pub fn generate() -> Self {
        PassiveId(Uuid::new_v4())
    }

    pub const fn from_uuid(id: Uuid) -> Self {
        PassiveId(id)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for PassiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The replicated entity an activity targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityDescriptor {
    pub name: String,
}

impl EntityDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Kinds of replicated work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActivityType {
    CreateEntity = 1,
    InvokeAction = 2,
    DestroyEntity = 3,
    FetchEntity = 4,
    ReleaseEntity = 5,
    /// Keeps the activity-id sequence dense when nothing replicates.
    OrderingPlaceholder = 6,
    SyncBegin = 7,
    SyncEnd = 8,
    SyncEntityBegin = 9,
    SyncEntityEnd = 10,
    SyncEntityConcurrencyBegin = 11,
    SyncEntityConcurrencyPayload = 12,
    SyncEntityConcurrencyEnd = 13,
}

impl ActivityType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(ActivityType::CreateEntity),
            2 => Some(ActivityType::InvokeAction),
            3 => Some(ActivityType::DestroyEntity),
            4 => Some(ActivityType::FetchEntity),
            5 => Some(ActivityType::ReleaseEntity),
            6 => Some(ActivityType::OrderingPlaceholder),
            7 => Some(ActivityType::SyncBegin),
            8 => Some(ActivityType::SyncEnd),
            9 => Some(ActivityType::SyncEntityBegin),
            10 => Some(ActivityType::SyncEntityEnd),
            11 => Some(ActivityType::SyncEntityConcurrencyBegin),
            12 => Some(ActivityType::SyncEntityConcurrencyPayload),
            13 => Some(ActivityType::SyncEntityConcurrencyEnd),
            _ => None,
        }
    }

    /// True for the sync-phase bracketing markers.
    pub fn is_sync_marker(self) -> bool {
        matches!(
            self,
            ActivityType::SyncBegin
                | ActivityType::SyncEnd
                | ActivityType::SyncEntityBegin
                | ActivityType::SyncEntityEnd
                | ActivityType::SyncEntityConcurrencyBegin
                | ActivityType::SyncEntityConcurrencyPayload
                | ActivityType::SyncEntityConcurrencyEnd
        )
    }
}

/// One unit of replicated work sent from active to passive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReplicationActivity {
    /// Assigned by the stream at send time.
    pub id: ActivityId,
    pub entity: EntityDescriptor,
    /// Client whose mutation produced this activity.
    pub source: ClientId,
    pub txn: TransactionId,
    /// Oldest transaction still pending for the source client; bounds how
    /// far back the passive must retain state.
    pub oldest_pending_txn: TransactionId,
    pub kind: ActivityType,
    pub payload: Vec<u8>,
    /// Concurrency key for the sync phases; absent otherwise.
    pub concurrency_key: Option<i32>,
}

impl SyncReplicationActivity {
    fn base(
        entity: EntityDescriptor,
        source: ClientId,
        txn: TransactionId,
        oldest_pending_txn: TransactionId,
        kind: ActivityType,
    ) -> Self {
        Self {
            id: ActivityId::UNASSIGNED,
            entity,
            source,
            txn,
            oldest_pending_txn,
            kind,
            payload: Vec::new(),
            concurrency_key: None,
        }
    }

    pub fn create(
        entity: EntityDescriptor,
        source: ClientId,
        txn: TransactionId,
        oldest_pending_txn: TransactionId,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            payload,
            ..Self::base(entity, source, txn, oldest_pending_txn, ActivityType::CreateEntity)
        }
    }

    pub fn invoke(
        entity: EntityDescriptor,
        source: ClientId,
        txn: TransactionId,
        oldest_pending_txn: TransactionId,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            payload,
            ..Self::base(entity, source, txn, oldest_pending_txn, ActivityType::InvokeAction)
        }
    }

    pub fn destroy(
        entity: EntityDescriptor,
        source: ClientId,
        txn: TransactionId,
        oldest_pending_txn: TransactionId,
    ) -> Self {
        Self::base(entity, source, txn, oldest_pending_txn, ActivityType::DestroyEntity)
    }

    pub fn ordering_placeholder(source: ClientId, txn: TransactionId) -> Self {
        Self::base(
            EntityDescriptor::named(""),
            source,
            txn,
            txn,
            ActivityType::OrderingPlaceholder,
        )
    }

    pub fn sync_begin(source: ClientId) -> Self {
        Self::base(
            EntityDescriptor::named(""),
            source,
            TransactionId::new(0),
            TransactionId::new(0),
            ActivityType::SyncBegin,
        )
    }

    pub fn sync_end(source: ClientId) -> Self {
        Self::base(
            EntityDescriptor::named(""),
            source,
            TransactionId::new(0),
            TransactionId::new(0),
            ActivityType::SyncEnd,
        )
    }

    pub fn sync_entity_begin(entity: EntityDescriptor, source: ClientId) -> Self {
        Self::base(
            entity,
            source,
            TransactionId::new(0),
            TransactionId::new(0),
            ActivityType::SyncEntityBegin,
        )
    }

    pub fn sync_entity_end(entity: EntityDescriptor, source: ClientId) -> Self {
        Self::base(
            entity,
            source,
            TransactionId::new(0),
            TransactionId::new(0),
            ActivityType::SyncEntityEnd,
        )
    }

    pub fn sync_concurrency_begin(
        entity: EntityDescriptor,
        source: ClientId,
        key: i32,
    ) -> Self {
        Self {
            concurrency_key: Some(key),
            ..Self::base(
                entity,
                source,
                TransactionId::new(0),
                TransactionId::new(0),
                ActivityType::SyncEntityConcurrencyBegin,
            )
        }
    }

    pub fn sync_payload(
        entity: EntityDescriptor,
        source: ClientId,
        key: i32,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            concurrency_key: Some(key),
            payload,
            ..Self::base(
                entity,
                source,
                TransactionId::new(0),
                TransactionId::new(0),
                ActivityType::SyncEntityConcurrencyPayload,
            )
        }
    }

    pub fn sync_concurrency_end(entity: EntityDescriptor, source: ClientId, key: i32) -> Self {
        Self {
            concurrency_key: Some(key),
            ..Self::base(
                entity,
                source,
                TransactionId::new(0),
                TransactionId::new(0),
                ActivityType::SyncEntityConcurrencyEnd,
            )
        }
    }

    /// Stamp the stream-assigned identifier.
    pub fn with_id(mut self, id: ActivityId) -> Self {
        self.id = id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_type_round_trip() {
        for raw in 1..=13u8 {
            let kind = ActivityType::from_u8(raw).unwrap();
            assert_eq!(kind.as_u8(), raw);
        }
        assert_eq!(ActivityType::from_u8(0), None);
        assert_eq!(ActivityType::from_u8(14), None);
    }

    #[test]
    fn test_sync_marker_classification() {
        assert!(ActivityType::SyncBegin.is_sync_marker());
        assert!(ActivityType::SyncEntityConcurrencyPayload.is_sync_marker());
        assert!(!ActivityType::InvokeAction.is_sync_marker());
        assert!(!ActivityType::OrderingPlaceholder.is_sync_marker());
    }

    #[test]
    fn test_constructors_carry_keys() {
        let source = ClientId::generate();
        let entity = EntityDescriptor::named("bin-map");
        let begin = SyncReplicationActivity::sync_concurrency_begin(entity.clone(), source, 3);
        assert_eq!(begin.concurrency_key, Some(3));
        assert_eq!(begin.kind, ActivityType::SyncEntityConcurrencyBegin);

        let invoke = SyncReplicationActivity::invoke(
            entity,
            source,
            TransactionId::new(5),
            TransactionId::new(2),
            vec![1, 2, 3],
        );
        assert_eq!(invoke.concurrency_key, None);
        assert!(!invoke.id.is_assigned());
        let stamped = invoke.with_id(ActivityId::new(9));
        assert!(stamped.id.is_assigned());
    }
}
