//! meshstore - A clustered shared-object store with delta broadcast and
//! active-passive replication

pub mod broadcast;
pub mod cli;
pub mod config;
pub mod delta;
pub mod observability;
pub mod oid;
pub mod pipeline;
pub mod repl;
pub mod store;
pub mod txn;
