//! Per-transaction state machine.
//!
//! Per COMMIT_PIPELINE.md §1:
//!
//! received → applying → applied → broadcast-pending → broadcast-complete
//! → acknowledged
//!
//! - Illegal transitions are rejected, never coerced
//! - Abandonment is legal only in `Received`
//! - Once `Applying` starts the transaction runs to completion or is fatal

use super::errors::{TxnError, TxnResult};

/// Lifecycle states of a transaction inside the commit stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Received,
    Applying,
    Applied,
    BroadcastPending,
    BroadcastComplete,
    Acknowledged,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Received => "received",
            TransactionState::Applying => "applying",
            TransactionState::Applied => "applied",
            TransactionState::BroadcastPending => "broadcast-pending",
            TransactionState::BroadcastComplete => "broadcast-complete",
            TransactionState::Acknowledged => "acknowledged",
        }
    }

    /// The one legal successor of this state, if any.
    pub fn successor(&self) -> Option<TransactionState> {
        match self {
            TransactionState::Received => Some(TransactionState::Applying),
            TransactionState::Applying => Some(TransactionState::Applied),
            TransactionState::Applied => Some(TransactionState::BroadcastPending),
            TransactionState::BroadcastPending => Some(TransactionState::BroadcastComplete),
            TransactionState::BroadcastComplete => Some(TransactionState::Acknowledged),
            TransactionState::Acknowledged => None,
        }
    }

    /// Validate and perform one transition.
    pub fn advance_to(self, next: TransactionState) -> TxnResult<TransactionState> {
        if self.successor() == Some(next) {
            Ok(next)
        } else {
            Err(TxnError::illegal_transition(format!(
                "cannot move from {} to {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }

    /// Abandonment is legal only before apply starts.
    pub fn can_abandon(&self) -> bool {
        matches!(self, TransactionState::Received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle_is_legal() {
        let mut state = TransactionState::Received;
        for next in [
            TransactionState::Applying,
            TransactionState::Applied,
            TransactionState::BroadcastPending,
            TransactionState::BroadcastComplete,
            TransactionState::Acknowledged,
        ] {
            state = state.advance_to(next).unwrap();
        }
        assert_eq!(state, TransactionState::Acknowledged);
        assert_eq!(state.successor(), None);
    }

    #[test]
    fn test_skipping_states_is_illegal() {
        let err = TransactionState::Received
            .advance_to(TransactionState::Applied)
            .unwrap_err();
        assert_eq!(err.kind, crate::txn::TxnErrorKind::IllegalTransition);
    }

    #[test]
    fn test_moving_backwards_is_illegal() {
        assert!(TransactionState::Applied
            .advance_to(TransactionState::Applying)
            .is_err());
    }

    #[test]
    fn test_abandon_window() {
        assert!(TransactionState::Received.can_abandon());
        assert!(!TransactionState::Applying.can_abandon());
        assert!(!TransactionState::Applied.can_abandon());
    }
}
