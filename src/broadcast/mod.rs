//! Broadcast stage: pruned per-client fan-out of committed transactions.

mod channel;
mod client_state;
mod errors;
mod message;
mod stage;

pub use channel::{ChannelManager, InProcessChannelManager};
pub use client_state::ClientStateManager;
pub use errors::{BroadcastError, BroadcastResult, ChannelError};
pub use message::BroadcastMessage;
pub use stage::{
    BroadcastConfig, BroadcastStage, BroadcastSummary, DEFAULT_LOOKUP_BATCH_CEILING,
};
