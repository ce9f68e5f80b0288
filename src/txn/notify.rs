//! Lock-grant notify collaborator.
//!
//! The lock manager itself is external; the commit stage only drains
//! pending wait/notify side effects through this interface so waiting lock
//! holders observe a mutation at commit. Per COMMIT_PIPELINE.md §5 the
//! drain happens even when apply failed, so no waiter is leaked.

use std::sync::Mutex;

use super::transaction::NotifiedWaiter;

/// Consumes notify side effects at commit time.
pub trait NotifyDrain: Send + Sync {
    fn drain(&self, waiters: &[NotifiedWaiter]);
}

/// Drain that discards notifies. Used when no lock manager is attached.
pub struct NoopNotifyDrain;

impl NotifyDrain for NoopNotifyDrain {
    fn drain(&self, _waiters: &[NotifiedWaiter]) {}
}

/// Drain that records everything it sees. Test collaborator.
#[derive(Default)]
pub struct RecordingNotifyDrain {
    drained: Mutex<Vec<NotifiedWaiter>>,
}

impl RecordingNotifyDrain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drained(&self) -> Vec<NotifiedWaiter> {
        self.drained.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl NotifyDrain for RecordingNotifyDrain {
    fn drain(&self, waiters: &[NotifiedWaiter]) {
        if let Ok(mut drained) = self.drained.lock() {
            drained.extend_from_slice(waiters);
        }
    }
}
