//! Typed pipeline events.
//!
//! Per OBSERVABILITY.md §2: every externally observable milestone of the
//! mutation pipeline has a named event. Events are explicit and typed;
//! free-form log messages are not allowed outside of error paths.

/// Observable pipeline events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Server assembly started
    BootStart,
    /// Server assembly complete
    BootComplete,
    /// Configuration loaded
    ConfigLoaded,

    // Transaction pipeline
    /// Transaction received from a client
    TxnReceived,
    /// Transaction applied to the object graph
    TxnApplied,
    /// Duplicate delivery detected, apply skipped
    TxnSkipApply,
    /// Transaction committed
    TxnCommitted,
    /// Transaction fully acknowledged by all broadcast targets
    TxnAcknowledged,
    /// Transaction abandoned before apply
    TxnAbandoned,
    /// Apply failed (fatal for the transaction)
    TxnApplyFailed,
    /// Low watermark recomputed
    WatermarkAdvanced,

    // Broadcast
    /// Pruned broadcast sent to a client
    BroadcastSent,
    /// Broadcast suppressed: client already holds everything
    BroadcastSkipped,
    /// Client channel gone; broadcast abandoned for that client
    BroadcastDeadChannel,

    // Replication
    /// Activity dispatched to a passive
    ActivitySent,
    /// Activity dropped without send
    ActivityDropped,
    /// Ack batch received from a passive
    AckBatchReceived,
    /// Passive rejected an activity (fatal for the activity)
    ActivityFailed,
    /// Passive sync bracketing started
    SyncStart,
    /// Passive sync bracketing complete
    SyncComplete,
}

impl Event {
    /// Stable event name for log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "BOOT_START",
            Event::BootComplete => "BOOT_COMPLETE",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::TxnReceived => "TXN_RECEIVED",
            Event::TxnApplied => "TXN_APPLIED",
            Event::TxnSkipApply => "TXN_SKIP_APPLY",
            Event::TxnCommitted => "TXN_COMMITTED",
            Event::TxnAcknowledged => "TXN_ACKNOWLEDGED",
            Event::TxnAbandoned => "TXN_ABANDONED",
            Event::TxnApplyFailed => "TXN_APPLY_FAILED",
            Event::WatermarkAdvanced => "WATERMARK_ADVANCED",
            Event::BroadcastSent => "BROADCAST_SENT",
            Event::BroadcastSkipped => "BROADCAST_SKIPPED",
            Event::BroadcastDeadChannel => "BROADCAST_DEAD_CHANNEL",
            Event::ActivitySent => "ACTIVITY_SENT",
            Event::ActivityDropped => "ACTIVITY_DROPPED",
            Event::AckBatchReceived => "ACK_BATCH_RECEIVED",
            Event::ActivityFailed => "ACTIVITY_FAILED",
            Event::SyncStart => "SYNC_START",
            Event::SyncComplete => "SYNC_COMPLETE",
        }
    }

    /// The subsystem an event belongs to.
    pub fn subsystem(&self) -> &'static str {
        match self {
            Event::BootStart | Event::BootComplete | Event::ConfigLoaded => "server",
            Event::TxnReceived
            | Event::TxnApplied
            | Event::TxnSkipApply
            | Event::TxnCommitted
            | Event::TxnAcknowledged
            | Event::TxnAbandoned
            | Event::TxnApplyFailed
            | Event::WatermarkAdvanced => "txn",
            Event::BroadcastSent | Event::BroadcastSkipped | Event::BroadcastDeadChannel => {
                "broadcast"
            }
            Event::ActivitySent
            | Event::ActivityDropped
            | Event::AckBatchReceived
            | Event::ActivityFailed
            | Event::SyncStart
            | Event::SyncComplete => "repl",
        }
    }

    /// Warn-level events: recoverable anomalies worth surfacing.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Event::TxnSkipApply | Event::BroadcastDeadChannel | Event::ActivityDropped
        )
    }

    /// Error-level events.
    pub fn is_error(&self) -> bool {
        matches!(self, Event::TxnApplyFailed | Event::ActivityFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_upper_snake() {
        for event in [
            Event::TxnCommitted,
            Event::BroadcastSkipped,
            Event::ActivitySent,
            Event::WatermarkAdvanced,
        ] {
            let name = event.as_str();
            assert!(name
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_severity_classification() {
        assert!(Event::TxnSkipApply.is_warning());
        assert!(Event::TxnApplyFailed.is_error());
        assert!(!Event::TxnCommitted.is_warning());
        assert!(!Event::TxnCommitted.is_error());
    }
}
