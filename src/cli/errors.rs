//! CLI error types. All CLI errors are fatal: print and exit non-zero.

use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("config: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Invalid(String),
}
