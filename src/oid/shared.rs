//! Shared identifier set for concurrent readers with bulk repopulation.
//!
//! Per OBJECT_ID_SET.md §5: the plain set is caller-synchronized. Subsystems
//! that expose an id set to concurrent readers while a full resync may
//! repopulate it underneath use this wrapper: a read-write lock plus a
//! generation counter. Snapshot cursors check the generation on every batch
//! and fail with `ConcurrentModification` instead of serving a mix of old
//! and new membership.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::errors::{IdSetError, IdSetResult};
use super::id::ObjectId;
use super::set::{ObjectIdSet, SetRepresentation};

/// Read-write-locked id set with modification-generation tracking.
#[derive(Debug)]
pub struct SharedIdSet {
    inner: RwLock<ObjectIdSet>,
    generation: AtomicU64,
}

impl SharedIdSet {
    pub fn new(rep: SetRepresentation) -> Self {
        Self {
            inner: RwLock::new(ObjectIdSet::with_representation(rep)),
            generation: AtomicU64::new(0),
        }
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn add(&self, id: ObjectId) -> IdSetResult<bool> {
        let mut set = self.inner.write().map_err(|_| IdSetError::LockPoisoned)?;
        let changed = set.add(id);
        if changed {
            self.bump();
        }
        Ok(changed)
    }

    pub fn remove(&self, id: ObjectId) -> IdSetResult<bool> {
        let mut set = self.inner.write().map_err(|_| IdSetError::LockPoisoned)?;
        let changed = set.remove(id);
        if changed {
            self.bump();
        }
        Ok(changed)
    }

    pub fn contains(&self, id: ObjectId) -> IdSetResult<bool> {
        let set = self.inner.read().map_err(|_| IdSetError::LockPoisoned)?;
        Ok(set.contains(id))
    }

    pub fn len(&self) -> IdSetResult<u64> {
        let set = self.inner.read().map_err(|_| IdSetError::LockPoisoned)?;
        Ok(set.len())
    }

    pub fn is_empty(&self) -> IdSetResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Replace the whole membership in one exclusive section. Readers block
    /// for the duration, so a resync never exposes partial membership.
    pub fn repopulate<I>(&self, ids: I) -> IdSetResult<()>
    where
        I: IntoIterator<Item = ObjectId>,
    {
        let mut set = self.inner.write().map_err(|_| IdSetError::LockPoisoned)?;
        set.clear();
        set.add_all(ids);
        self.bump();
        Ok(())
    }

    /// Copy the current membership out under the read lock.
    pub fn snapshot(&self) -> IdSetResult<ObjectIdSet> {
        let set = self.inner.read().map_err(|_| IdSetError::LockPoisoned)?;
        Ok(set.clone())
    }

    /// Open a batched snapshot cursor pinned to the current generation.
    pub fn snapshot_cursor(&self) -> IdSetResult<SnapshotCursor<'_>> {
        Ok(SnapshotCursor {
            owner: self,
            generation: self.current_generation(),
            resume: None,
            started: false,
        })
    }
}

/// Batched cursor over a [`SharedIdSet`].
///
/// Each batch re-acquires the read lock; if any structural modification
/// happened since the cursor was opened, the batch fails with
/// [`IdSetError::ConcurrentModification`], a condition distinct from the
/// empty batch that signals end-of-iteration.
pub struct SnapshotCursor<'a> {
    owner: &'a SharedIdSet,
    generation: u64,
    resume: Option<i64>,
    started: bool,
}

impl SnapshotCursor<'_> {
    /// Produce up to `max` identifiers in ascending order. An empty vector
    /// means the iteration is complete.
    pub fn next_batch(&mut self, max: usize) -> IdSetResult<Vec<ObjectId>> {
        let set = self
            .owner
            .inner
            .read()
            .map_err(|_| IdSetError::LockPoisoned)?;
        if self.owner.current_generation() != self.generation {
            return Err(IdSetError::ConcurrentModification);
        }

        let mut batch = Vec::with_capacity(max.min(64));
        while batch.len() < max {
            let next = match (self.started, self.resume) {
                (false, _) => set.first(),
                (true, Some(from)) => set.next_above(from),
                (true, None) => None,
            };
            self.started = true;
            match next {
                Some(id) => {
                    self.resume = Some(id.raw());
                    batch.push(id);
                }
                None => break,
            }
        }
        Ok(batch)
    }
}
