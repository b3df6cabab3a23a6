//! Error types for the Capsule configuration controller.

use crate::operator::ReconcileError;
use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error types surfaced to the process supervisor
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Invalid controller settings
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Logging setup error
    #[error("Logging error: {0}")]
    Logging(String),

    /// Reconciliation failed in a way that must stop the controller
    #[error("fatal reconciliation error for {name}")]
    Fatal {
        name: String,
        #[source]
        source: ReconcileError,
    },
}

impl Error {
    /// Whether the supervisor should terminate the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal { .. })
    }
}
