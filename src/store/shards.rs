//! Sharded object store.
//!
//! Per COMMIT_PIPELINE.md §2: the store is striped by identifier so
//! transactions touching disjoint objects proceed without contention. Each
//! shard has its own lock; a record apply holds exactly the one shard lock
//! for the object it mutates.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use crate::delta::DeltaRecord;
use crate::oid::ObjectId;

use super::errors::{StoreError, StoreResult};
use super::object::ManagedObject;

/// Outcome of applying one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordApplied {
    /// True when the record materialized a new object.
    pub created: bool,
    /// Objects referenced by the record's actions.
    pub references: Vec<ObjectId>,
}

/// Lock-striped in-memory object graph.
pub struct ShardedStore {
    shards: Vec<RwLock<HashMap<ObjectId, ManagedObject>>>,
    roots: Mutex<HashMap<String, ObjectId>>,
}

impl ShardedStore {
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count).map(|_| RwLock::new(HashMap::new())).collect(),
            roots: Mutex::new(HashMap::new()),
        }
    }

    fn shard_for(&self, id: ObjectId) -> &RwLock<HashMap<ObjectId, ManagedObject>> {
        let index = id.raw().rem_euclid(self.shards.len() as i64) as usize;
        &self.shards[index]
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.shard_for(id)
            .read()
            .map(|shard| shard.contains_key(&id))
            .unwrap_or(false)
    }

    pub fn object_count(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.read().map(|s| s.len()).unwrap_or(0))
            .sum()
    }

    /// Read one object's image out under the shard lock.
    pub fn snapshot(&self, id: ObjectId) -> Option<ManagedObject> {
        self.shard_for(id)
            .read()
            .ok()
            .and_then(|shard| shard.get(&id).cloned())
    }

    /// Apply one record under its shard lock. Full records materialize
    /// missing objects; delta-only records require the object to exist.
    pub fn apply_record(&self, record: &DeltaRecord) -> StoreResult<RecordApplied> {
        let id = record.object_id();
        let mut shard = self
            .shard_for(id)
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;

        let mut created = false;
        if !shard.contains_key(&id) {
            if record.is_delta() {
                return Err(StoreError::UnknownObject(id));
            }
            shard.insert(id, ManagedObject::materialize(record));
            created = true;
        }
        let object = shard.get_mut(&id).ok_or(StoreError::UnknownObject(id))?;

        let mut references = Vec::new();
        object.apply(record, &mut references)?;
        Ok(RecordApplied {
            created,
            references,
        })
    }

    /// Drop objects that fell below the reclamation watermark.
    pub fn evict<I>(&self, ids: I) -> StoreResult<usize>
    where
        I: IntoIterator<Item = ObjectId>,
    {
        let mut evicted = 0;
        for id in ids {
            let mut shard = self
                .shard_for(id)
                .write()
                .map_err(|_| StoreError::LockPoisoned)?;
            if shard.remove(&id).is_some() {
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    /// Bind a root name to an object.
    pub fn create_root(&self, name: impl Into<String>, id: ObjectId) -> StoreResult<()> {
        let mut roots = self.roots.lock().map_err(|_| StoreError::LockPoisoned)?;
        roots.insert(name.into(), id);
        Ok(())
    }

    pub fn root(&self, name: &str) -> Option<ObjectId> {
        self.roots.lock().ok().and_then(|roots| roots.get(name).copied())
    }

    pub fn root_count(&self) -> usize {
        self.roots.lock().map(|roots| roots.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{ClassSpec, Value};

    fn full_record(id: i64, version: u64) -> DeltaRecord {
        DeltaRecord::full(
            ObjectId::new(id),
            version,
            ClassSpec::new("inventory.Bin", "local"),
        )
    }

    #[test]
    fn test_full_record_materializes_object() {
        let store = ShardedStore::new(4);
        let mut record = full_record(10, 1);
        record.push_physical("count", Value::I32(1), false);

        let applied = store.apply_record(&record).unwrap();
        assert!(applied.created);
        assert!(store.contains(ObjectId::new(10)));
        assert_eq!(store.object_count(), 1);
    }

    #[test]
    fn test_delta_for_unknown_object_is_rejected() {
        let store = ShardedStore::new(4);
        let record = DeltaRecord::delta(ObjectId::new(10), 1);
        assert_eq!(
            store.apply_record(&record),
            Err(StoreError::UnknownObject(ObjectId::new(10)))
        );
    }

    #[test]
    fn test_delta_mutates_existing_object() {
        let store = ShardedStore::new(4);
        store.apply_record(&full_record(10, 1)).unwrap();

        let mut delta = DeltaRecord::delta(ObjectId::new(10), 2);
        delta.push_physical("next", Value::Ref(ObjectId::new(11)), true);
        let applied = store.apply_record(&delta).unwrap();
        assert!(!applied.created);
        assert_eq!(applied.references, vec![ObjectId::new(11)]);

        let object = store.snapshot(ObjectId::new(10)).unwrap();
        assert_eq!(object.version(), 2);
    }

    #[test]
    fn test_negative_ids_shard_correctly() {
        let store = ShardedStore::new(7);
        for raw in [-1000, -7, -1, 0, 1, i64::MIN, i64::MAX] {
            if raw == -1 {
                continue;
            }
            store.apply_record(&full_record(raw, 1)).unwrap();
            assert!(store.contains(ObjectId::new(raw)), "id {}", raw);
        }
    }

    #[test]
    fn test_eviction() {
        let store = ShardedStore::new(2);
        store.apply_record(&full_record(1, 1)).unwrap();
        store.apply_record(&full_record(2, 1)).unwrap();

        let evicted = store
            .evict([ObjectId::new(1), ObjectId::new(99)])
            .unwrap();
        assert_eq!(evicted, 1);
        assert!(!store.contains(ObjectId::new(1)));
        assert!(store.contains(ObjectId::new(2)));
    }

    #[test]
    fn test_roots() {
        let store = ShardedStore::new(2);
        store.create_root("catalog", ObjectId::new(5)).unwrap();
        assert_eq!(store.root("catalog"), Some(ObjectId::new(5)));
        assert_eq!(store.root("missing"), None);
        assert_eq!(store.root_count(), 1);
    }
}
