//! CapsuleConfiguration Controller
//!
//! Runs the reconcile handler under `kube`'s [`Controller`]. Admission
//! happens on the raw watch stream, so the reflector cache, the controller
//! queue and its requeue scheduler only ever see the target configuration.
//! Setup happens in two steps: the builder fixes the target configuration
//! name, then the data-access client is injected to obtain a runnable
//! [`ConfigManager`].

use super::crd::CapsuleConfiguration;
use super::events::{admitted_objects, generic_triggers};
use super::filter::InstanceNameFilter;
use super::reconciler::ConfigReconciler;
use super::types::{Context, ReconcileError, ReconcileRequest, CONTROLLER_NAME};
use crate::config::ControllerConfig;
use crate::configuration::{ConfigurationClient, KubeConfigurationClient};
use crate::error::{Error, Result};
use futures::{future, Stream, StreamExt, TryStreamExt};
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runtime knobs of the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    pub reconcile_timeout: Duration,
    /// Delay before a retryable failure is reconciled again
    pub error_requeue: Duration,
    /// Period of generic events for the cached configuration
    pub resync_interval: Option<Duration>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            reconcile_timeout: Duration::from_secs(30),
            error_requeue: Duration::from_secs(60),
            resync_interval: None,
        }
    }
}

/// First setup phase: the target name is known, the client is not.
#[derive(Debug, Clone)]
pub struct ConfigManagerBuilder {
    filter: InstanceNameFilter,
    settings: ManagerSettings,
}

impl ConfigManagerBuilder {
    pub fn new(configuration_name: impl Into<String>) -> Self {
        Self {
            filter: InstanceNameFilter::new(configuration_name),
            settings: ManagerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Second setup phase: bind the data-access client.
    pub fn inject_client<C>(self, client: Arc<C>) -> ConfigManager<C>
    where
        C: ConfigurationClient + ?Sized,
    {
        ConfigManager {
            filter: self.filter,
            settings: self.settings,
            client,
        }
    }
}

pub struct ConfigManager<C: ?Sized> {
    filter: InstanceNameFilter,
    settings: ManagerSettings,
    client: Arc<C>,
}

impl<C> ConfigManager<C>
where
    C: ConfigurationClient + ?Sized + 'static,
{
    /// Reconcile the target configuration from `events` until the stream
    /// ends or `shutdown` fires.
    ///
    /// Returns [`Error::Fatal`] as soon as a reconciliation reports an
    /// invalid configuration; every other failure is requeued by the
    /// controller after [`ManagerSettings::error_requeue`].
    pub async fn run<S>(self, events: S, shutdown: CancellationToken) -> Result<()>
    where
        S: Stream<Item = Result<watcher::Event<CapsuleConfiguration>, watcher::Error>> + Send + 'static,
    {
        info!(
            controller = CONTROLLER_NAME,
            configuration = %self.filter.target(),
            "Starting CapsuleConfiguration controller"
        );
        if self.filter.target().is_empty() {
            warn!("configuration name is empty, no event will be reconciled");
        }

        let (reader, writer) = reflector::store();
        let trigger = admitted_objects(events, self.filter.clone(), writer);
        let ctx = Arc::new(Context::new(
            ConfigReconciler::new(self.client, self.settings.reconcile_timeout),
            self.settings.error_requeue,
            shutdown.clone(),
        ));

        let mut controller = Controller::for_stream(trigger, reader.clone())
            .graceful_shutdown_on(shutdown.clone().cancelled_owned());
        if let Some(period) = self.settings.resync_interval {
            controller = controller.reconcile_on(generic_triggers(self.filter, reader.clone(), period));
        }

        let results = controller
            .run(reconcile_configuration::<C>, error_policy::<C>, ctx)
            .map(outcome)
            .try_for_each(|()| future::ready(Ok(())));

        tokio::select! {
            result = results => result?,
            () = stopped_before_sync(shutdown, reader) => {
                debug!("shutdown requested before the first list completed");
            }
        }

        info!(controller = CONTROLLER_NAME, "CapsuleConfiguration controller stopped");
        Ok(())
    }
}

async fn reconcile_configuration<C>(
    obj: Arc<CapsuleConfiguration>,
    ctx: Arc<Context<C>>,
) -> Result<Action, ReconcileError>
where
    C: ConfigurationClient + ?Sized,
{
    let request = ReconcileRequest::new(obj.name_any());
    ctx.reconciler.reconcile(&request, &ctx.shutdown).await
}

fn error_policy<C: ?Sized>(
    obj: Arc<CapsuleConfiguration>,
    error: &ReconcileError,
    ctx: Arc<Context<C>>,
) -> Action {
    if error.is_fatal() {
        // the run loop stops on this error
        return Action::await_change();
    }
    if matches!(error, ReconcileError::Cancelled) && ctx.shutdown.is_cancelled() {
        debug!(request.name = %obj.name_any(), "reconciliation cancelled by shutdown");
        return Action::await_change();
    }

    warn!(
        request.name = %obj.name_any(),
        error = %error,
        delay = ?ctx.error_requeue,
        "reconciliation failed, requeueing"
    );
    Action::requeue(ctx.error_requeue)
}

type ControllerResult = std::result::Result<
    (ObjectRef<CapsuleConfiguration>, Action),
    controller::Error<ReconcileError, watcher::Error>,
>;

fn outcome(result: ControllerResult) -> Result<()> {
    match result {
        Ok((obj, action)) => {
            debug!(request.name = %obj.name, ?action, "reconciled");
            Ok(())
        }
        Err(controller::Error::ReconcilerFailed(err, obj)) if err.is_fatal() => {
            error!(request.name = %obj.name, error = %err, "aborting on invalid configuration");
            Err(Error::Fatal {
                name: obj.name,
                source: err,
            })
        }
        // reported by error_policy
        Err(controller::Error::ReconcilerFailed(..)) => Ok(()),
        Err(controller::Error::ObjectNotFound(obj)) => {
            debug!(request.name = %obj.name, "configuration no longer cached, skipping");
            Ok(())
        }
        Err(controller::Error::QueueError(err)) => {
            warn!(error = %err, "watch stream error");
            Ok(())
        }
        Err(err) => {
            warn!(error = %err, "controller error");
            Ok(())
        }
    }
}

/// Resolves only when `shutdown` fires before the cache has seen a full
/// list. The controller holds its queue until then and would never drain.
async fn stopped_before_sync(shutdown: CancellationToken, cache: Store<CapsuleConfiguration>) {
    tokio::select! {
        biased;
        _ = cache.wait_until_ready() => future::pending().await,
        () = shutdown.cancelled() => {}
    }
}

/// Start the CapsuleConfiguration controller against a live cluster
pub async fn run_config_controller(
    client: Client,
    config: &ControllerConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let api: Api<CapsuleConfiguration> = Api::all(client.clone());
    let events = watcher(api, watcher::Config::default()).default_backoff();

    ConfigManagerBuilder::new(config.configuration_name.as_str())
        .with_settings(config.manager_settings())
        .inject_client(Arc::new(KubeConfigurationClient::new(client)))
        .run(events, shutdown)
        .await
}
