//! CapsuleConfiguration Reconciler
//!
//! Re-validates the configuration each time the watched instance changes.

use super::types::{ReconcileError, ReconcileRequest};
use crate::configuration::{CapsuleConfigurationAccessor, ConfigurationClient};
use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

pub struct ConfigReconciler<C: ?Sized> {
    client: Arc<C>,
    timeout: Duration,
}

impl<C> ConfigReconciler<C>
where
    C: ConfigurationClient + ?Sized,
{
    pub fn new(client: Arc<C>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Validate the configuration named by `request`.
    ///
    /// An invalid configuration comes back as
    /// [`ReconcileError::InvalidConfiguration`], which the run loop treats as
    /// fatal. Lookup failures, timeouts and cancellation are retryable.
    #[instrument(skip_all, fields(request.name = %request.name))]
    pub async fn reconcile(
        &self,
        request: &ReconcileRequest,
        cancel: &CancellationToken,
    ) -> Result<Action, ReconcileError> {
        if cancel.is_cancelled() {
            debug!("context cancelled before reconciliation started");
            return Err(ReconcileError::Cancelled);
        }

        info!(request.name = %request.name, "CapsuleConfiguration reconciliation started");

        let cfg = CapsuleConfigurationAccessor::new(Arc::clone(&self.client), request.name.as_str());
        let validated = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReconcileError::Cancelled),
            validated = time::timeout(self.timeout, cfg.validate()) => {
                validated.map_err(|_| ReconcileError::TimedOut(self.timeout))?
            }
        };
        validated?;

        info!(request.name = %request.name, "CapsuleConfiguration reconciliation finished");
        Ok(Action::await_change())
    }
}
