//! CLI argument definitions using clap
//!
//! Commands:
//! - meshstore check-config --config <path>
//! - meshstore inspect-delta <path>
//! - meshstore inspect-idset <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// meshstore - A clustered shared-object store with delta broadcast and
/// active-passive replication
#[derive(Parser, Debug)]
#[command(name = "meshstore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate a configuration file, printing the effective
    /// settings
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./meshstore.json")]
        config: PathBuf,
    },

    /// Decode a delta record frame and print its header and actions
    InspectDelta {
        /// Path to a file holding one or more delta frames
        path: PathBuf,
    },

    /// Decode a serialized identifier set and print a summary
    InspectIdset {
        /// Path to a file holding one serialized id set
        path: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
