//! Transaction commit stage.
//!
//! Per COMMIT_PIPELINE.md:
//! - Per-transaction state machine: received → applying → applied →
//!   broadcast-pending → broadcast-complete → acknowledged
//! - Apply is idempotent under duplicate delivery (skip + warn)
//! - The low watermark bounds cluster-wide state retention
//! - Lock-grant notifies and the persistence boundary are external
//!   collaborators consumed through traits

mod account;
mod errors;
mod notify;
mod persistence;
mod sequence;
mod stage;
mod state;
mod transaction;
mod watermark;

pub use account::TransactionAccount;
pub use errors::{TxnError, TxnErrorKind, TxnResult};
pub use notify::{NoopNotifyDrain, NotifyDrain, RecordingNotifyDrain};
pub use persistence::{testing, NoopPersistence, PersistenceProvider, PersistenceTxn};
pub use sequence::{GlobalSeq, GlobalSeqAssigner};
pub use stage::{ApplyInfo, CommitConfig, CommitReceipt, CommitStage};
pub use state::TransactionState;
pub use transaction::{
    ClientId, NotifiedWaiter, ServerTransaction, ServerTransactionId, TransactionId,
};
pub use watermark::{WatermarkProvider, DEFAULT_WATERMARK_INTERVAL};
