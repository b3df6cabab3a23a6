//! Operator Types
//!
//! Reconcile request and reconcile error classification

use super::reconciler::ConfigReconciler;
use crate::configuration::ConfigurationError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Name under which the controller identifies itself in logs
pub const CONTROLLER_NAME: &str = "capsule-configuration";

/// Name of the configuration reconciled when none is configured
pub const DEFAULT_CONFIGURATION_NAME: &str = "capsule-default";

/// Controller context
pub struct Context<C: ?Sized> {
    pub reconciler: ConfigReconciler<C>,
    /// Delay before a retryable failure is reconciled again
    pub error_requeue: Duration,
    pub shutdown: CancellationToken,
}

impl<C: ?Sized> Context<C> {
    pub fn new(
        reconciler: ConfigReconciler<C>,
        error_requeue: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            error_requeue,
            shutdown,
        }
    }
}

/// Work item handed to the reconcile handler
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReconcileRequest {
    pub name: String,
}

impl ReconcileRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The configuration itself is broken; retrying cannot fix it.
    #[error("invalid configuration for protected Namespace regex")]
    InvalidConfiguration(#[source] ConfigurationError),

    #[error("configuration lookup failed")]
    Transient(#[source] ConfigurationError),

    #[error("reconciliation cancelled")]
    Cancelled,

    #[error("reconciliation timed out after {0:?}")]
    TimedOut(Duration),
}

impl ReconcileError {
    /// Fatal errors must stop the process instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidConfiguration(_))
    }
}

impl From<ConfigurationError> for ReconcileError {
    fn from(err: ConfigurationError) -> Self {
        if err.is_invalid_configuration() {
            Self::InvalidConfiguration(err)
        } else {
            Self::Transient(err)
        }
    }
}
