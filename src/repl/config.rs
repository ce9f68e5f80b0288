//! Replication configuration.
//!
//! Configured externally (file, CLI), immutable after startup. Roles are
//! assigned, never inferred: exactly one active per cluster, promotion of a
//! passive is an external decision.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{ReplError, ReplResult};

/// Node role in the replication pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationRole {
    /// Accepts client transactions and streams activities out.
    Active,
    /// Consumes the activity stream; promoted on active failure.
    Passive,
}

pub const DEFAULT_ACK_BATCH_SIZE: usize = 64;

/// Replication settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Replication disabled runs a standalone active with identical
    /// behavior otherwise.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_role")]
    pub role: ReplicationRole,

    /// Identity of this node when running as a passive.
    #[serde(default)]
    pub passive_id: Option<Uuid>,

    /// Acks accumulated before a RESPONSE message is produced.
    #[serde(default = "default_ack_batch_size")]
    pub ack_batch_size: usize,
}

fn default_role() -> ReplicationRole {
    ReplicationRole::Active
}

fn default_ack_batch_size() -> usize {
    DEFAULT_ACK_BATCH_SIZE
}

impl ReplicationConfig {
    /// The default-safe path: replication off, standalone active.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            role: ReplicationRole::Active,
            passive_id: None,
            ack_batch_size: DEFAULT_ACK_BATCH_SIZE,
        }
    }

    pub fn validate(&self) -> ReplResult<()> {
        if self.ack_batch_size == 0 {
            return Err(ReplError::configuration("ack_batch_size must be >= 1"));
        }
        match self.role {
            ReplicationRole::Passive if self.enabled && self.passive_id.is_none() => Err(
                ReplError::configuration("a passive node requires passive_id"),
            ),
            ReplicationRole::Active if self.passive_id.is_some() => Err(
                ReplError::configuration("passive_id is only legal on passives"),
            ),
            _ => Ok(()),
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self::disabled()
    }
}
