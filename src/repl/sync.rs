//! Passive-sync bracketing validation.
//!
//! Per REPLICATION_STREAM.md §4, synchronizing a newly joined passive uses
//! a strictly nested bracketing protocol:
//!
//! SYNC_BEGIN
//!   SYNC_ENTITY_BEGIN e
//!     SYNC_ENTITY_CONCURRENCY_BEGIN e k
//!       SYNC_ENTITY_CONCURRENCY_PAYLOAD e k ...
//!     SYNC_ENTITY_CONCURRENCY_END e k
//!   SYNC_ENTITY_END e
//! SYNC_END
//!
//! Non-sync activities may interleave at any point (normal replication
//! continues while a passive synchronizes). Any out-of-order marker is a
//! bracket violation, fatal to the stream.

use super::activity::{ActivityType, SyncReplicationActivity};
use super::errors::{ReplError, ReplResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum SyncPhase {
    Idle,
    Started,
    EntityOpen(String),
    KeyOpen(String, i32),
    Complete,
}

/// Validates the bracketing order of one sync stream.
#[derive(Debug)]
pub struct SyncTracker {
    phase: SyncPhase,
    entities_synced: usize,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Idle,
            entities_synced: 0,
        }
    }

    pub fn is_syncing(&self) -> bool {
        !matches!(self.phase, SyncPhase::Idle | SyncPhase::Complete)
    }

    pub fn is_complete(&self) -> bool {
        self.phase == SyncPhase::Complete
    }

    pub fn entities_synced(&self) -> usize {
        self.entities_synced
    }

    /// Observe one activity, enforcing bracket order. Non-sync activities
    /// pass through untouched.
    pub fn observe(&mut self, activity: &SyncReplicationActivity) -> ReplResult<()> {
        if !activity.kind.is_sync_marker() {
            return Ok(());
        }

        let entity = activity.entity.name.as_str();
        match (activity.kind, &self.phase) {
            (ActivityType::SyncBegin, SyncPhase::Idle) => {
                self.phase = SyncPhase::Started;
                Ok(())
            }
            (ActivityType::SyncEntityBegin, SyncPhase::Started) => {
                self.phase = SyncPhase::EntityOpen(entity.to_string());
                Ok(())
            }
            (ActivityType::SyncEntityConcurrencyBegin, SyncPhase::EntityOpen(open)) => {
                if open != entity {
                    return Err(ReplError::bracket_violation(format!(
                        "concurrency begin for {} inside entity {}",
                        entity, open
                    )));
                }
                let key = activity.concurrency_key.ok_or_else(|| {
                    ReplError::bracket_violation("concurrency begin without key")
                })?;
                self.phase = SyncPhase::KeyOpen(open.clone(), key);
                Ok(())
            }
            (ActivityType::SyncEntityConcurrencyPayload, SyncPhase::KeyOpen(open, key)) => {
                if open != entity || activity.concurrency_key != Some(*key) {
                    return Err(ReplError::bracket_violation(format!(
                        "payload for {}/{:?} inside {}/{}",
                        entity, activity.concurrency_key, open, key
                    )));
                }
                Ok(())
            }
            (ActivityType::SyncEntityConcurrencyEnd, SyncPhase::KeyOpen(open, key)) => {
                if open != entity || activity.concurrency_key != Some(*key) {
                    return Err(ReplError::bracket_violation(format!(
                        "concurrency end for {}/{:?} inside {}/{}",
                        entity, activity.concurrency_key, open, key
                    )));
                }
                self.phase = SyncPhase::EntityOpen(open.clone());
                Ok(())
            }
            (ActivityType::SyncEntityEnd, SyncPhase::EntityOpen(open)) => {
                if open != entity {
                    return Err(ReplError::bracket_violation(format!(
                        "entity end for {} inside entity {}",
                        entity, open
                    )));
                }
                self.entities_synced += 1;
                self.phase = SyncPhase::Started;
                Ok(())
            }
            (ActivityType::SyncEnd, SyncPhase::Started) => {
                self.phase = SyncPhase::Complete;
                Ok(())
            }
            (kind, phase) => Err(ReplError::bracket_violation(format!(
                "{:?} is illegal in phase {:?}",
                kind, phase
            ))),
        }
    }
}

impl Default for SyncTracker {
    fn default() -> Self {
        Self::new()
    }
}
