//! Controller run loop tests
//!
//! Feed synthetic watcher events through the manager and observe which
//! configurations get looked up.

mod common;

use capsule_rs::operator::{
    CapsuleConfiguration, ConfigManager, ConfigManagerBuilder, ManagerSettings, ReconcileError,
};
use capsule_rs::Error;
use common::{configuration, RecordingClient, TARGET};
use futures::channel::mpsc;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use kube::runtime::watcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

type Events = BoxStream<'static, Result<watcher::Event<CapsuleConfiguration>, watcher::Error>>;

/// An initial list of `objects`, then the given live events, then silence.
fn listed(objects: Vec<CapsuleConfiguration>, live: Vec<watcher::Event<CapsuleConfiguration>>) -> Events {
    let mut events = vec![watcher::Event::Init];
    events.extend(objects.into_iter().map(watcher::Event::InitApply));
    events.push(watcher::Event::InitDone);
    events.extend(live);

    stream::iter(events.into_iter().map(Ok))
        .chain(stream::pending())
        .boxed()
}

fn settings(error_requeue: Duration) -> ManagerSettings {
    ManagerSettings {
        reconcile_timeout: Duration::from_secs(5),
        error_requeue,
        resync_interval: None,
    }
}

/// Run `manager` and request shutdown once `done` holds.
async fn run_until(
    manager: ConfigManager<RecordingClient>,
    events: Events,
    done: impl Fn() -> bool,
) -> capsule_rs::Result<()> {
    let shutdown = CancellationToken::new();
    let (result, ()) = tokio::join!(manager.run(events, shutdown.clone()), async {
        while !done() {
            time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
    });
    result
}

fn after(period: Duration) -> impl Fn() -> bool {
    let deadline = Instant::now() + period;
    move || Instant::now() >= deadline
}

#[tokio::test(start_paused = true)]
async fn test_target_events_are_reconciled() {
    let client = Arc::new(
        RecordingClient::new().with(configuration(TARGET, Some("^(kube|capsule)-system$"))),
    );
    let target = configuration(TARGET, Some("^(kube|capsule)-system$"));
    let events = listed(vec![target.clone()], vec![watcher::Event::Apply(target)]);

    let watched = client.clone();
    let result = run_until(
        ConfigManagerBuilder::new(TARGET).inject_client(client.clone()),
        events,
        move || !watched.calls().is_empty(),
    )
    .await;

    assert!(result.is_ok());
    let calls = client.calls();
    assert!(!calls.is_empty());
    assert!(calls.iter().all(|name| name == TARGET));
}

#[tokio::test(start_paused = true)]
async fn test_other_names_are_never_queued() {
    let client = Arc::new(RecordingClient::new());
    let other = configuration("other", None);
    let events = listed(
        vec![other.clone()],
        vec![
            watcher::Event::Apply(other.clone()),
            watcher::Event::Delete(other),
        ],
    );

    let result = run_until(
        ConfigManagerBuilder::new(TARGET).inject_client(client.clone()),
        events,
        after(Duration::from_secs(5)),
    )
    .await;

    assert!(result.is_ok());
    assert!(client.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_empty_target_stays_idle() {
    let client = Arc::new(RecordingClient::new());
    let objects = [TARGET, "other", "a"]
        .into_iter()
        .map(|name| configuration(name, None))
        .collect::<Vec<_>>();
    let events = listed(
        objects.clone(),
        objects.into_iter().map(watcher::Event::Apply).collect(),
    );

    let result = run_until(
        ConfigManagerBuilder::new("").inject_client(client.clone()),
        events,
        after(Duration::from_secs(5)),
    )
    .await;

    assert!(result.is_ok());
    assert!(client.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_configuration_aborts_the_loop() {
    let client = Arc::new(RecordingClient::new().with(configuration(TARGET, Some("^(kube-"))));
    let events = listed(vec![configuration(TARGET, Some("^(kube-"))], Vec::new());

    let err = time::timeout(
        Duration::from_secs(60),
        ConfigManagerBuilder::new(TARGET)
            .inject_client(client.clone())
            .run(events, CancellationToken::new()),
    )
    .await
    .expect("the controller should stop on its own")
    .unwrap_err();

    assert!(err.is_fatal());
    match err {
        Error::Fatal { name, source } => {
            assert_eq!(name, TARGET);
            assert!(matches!(source, ReconcileError::InvalidConfiguration(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(client.calls(), vec![TARGET]);
}

#[tokio::test(start_paused = true)]
async fn test_deleted_configuration_is_not_reconciled_again() {
    let client = Arc::new(RecordingClient::new());
    let target = configuration(TARGET, None);
    let (tx, rx) = mpsc::unbounded();
    for event in [
        watcher::Event::Init,
        watcher::Event::InitApply(target.clone()),
        watcher::Event::InitDone,
    ] {
        tx.unbounded_send(Ok(event)).unwrap();
    }

    let manager = ConfigManagerBuilder::new(TARGET).inject_client(client.clone());
    let shutdown = CancellationToken::new();
    let (result, ()) = tokio::join!(manager.run(rx, shutdown.clone()), async {
        time::sleep(Duration::from_secs(1)).await;
        tx.unbounded_send(Ok(watcher::Event::Delete(target))).unwrap();
        time::sleep(Duration::from_secs(5)).await;
        shutdown.cancel();
    });

    assert!(result.is_ok());
    assert_eq!(client.calls(), vec![TARGET]);
}

#[tokio::test(start_paused = true)]
async fn test_watch_errors_do_not_stop_the_loop() {
    let client = Arc::new(RecordingClient::new());
    let events = stream::iter(vec![
        Ok(watcher::Event::Init),
        Ok(watcher::Event::InitDone),
        Err(watcher::Error::NoResourceVersion),
        Ok(watcher::Event::Apply(configuration(TARGET, None))),
    ])
    .chain(stream::pending())
    .boxed();

    let watched = client.clone();
    let result = run_until(
        ConfigManagerBuilder::new(TARGET).inject_client(client.clone()),
        events,
        move || !watched.calls().is_empty(),
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(client.calls(), vec![TARGET]);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_shutdown_returns_immediately() {
    let client = Arc::new(RecordingClient::new());
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let result = time::timeout(
        Duration::from_secs(60),
        ConfigManagerBuilder::new(TARGET)
            .inject_client(client.clone())
            .run(listed(vec![configuration(TARGET, None)], Vec::new()), shutdown),
    )
    .await
    .expect("a cancelled controller should return");

    assert!(result.is_ok());
    assert!(client.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_requeued() {
    let client = Arc::new(RecordingClient::new().failing(2));
    let manager = ConfigManagerBuilder::new(TARGET)
        .with_settings(settings(Duration::from_millis(100)))
        .inject_client(client.clone());

    let start = Instant::now();
    let watched = client.clone();
    let result = run_until(
        manager,
        listed(vec![configuration(TARGET, None)], Vec::new()),
        move || watched.calls().len() >= 3,
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(client.calls(), vec![TARGET; 3]);
    // one requeue delay after each failure
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_fresh_event_replaces_pending_retry() {
    let client = Arc::new(RecordingClient::new().failing(1));
    let target = configuration(TARGET, None);
    let (tx, rx) = mpsc::unbounded();
    for event in [
        watcher::Event::Init,
        watcher::Event::InitApply(target.clone()),
        watcher::Event::InitDone,
    ] {
        tx.unbounded_send(Ok(event)).unwrap();
    }

    let manager = ConfigManagerBuilder::new(TARGET)
        .with_settings(settings(Duration::from_secs(10)))
        .inject_client(client.clone());
    let shutdown = CancellationToken::new();
    let (result, ()) = tokio::join!(manager.run(rx, shutdown.clone()), async {
        // the first lookup failed and a retry is due in 10s
        time::sleep(Duration::from_secs(1)).await;
        tx.unbounded_send(Ok(watcher::Event::Apply(target))).unwrap();
        // well past the retry deadline
        time::sleep(Duration::from_secs(30)).await;
        shutdown.cancel();
    });

    assert!(result.is_ok());
    // failed lookup, then the update; the stale retry never runs
    assert_eq!(client.calls(), vec![TARGET; 2]);
}

#[tokio::test(start_paused = true)]
async fn test_resync_reconciles_the_cached_target_periodically() {
    let client = Arc::new(RecordingClient::new());
    let manager = ConfigManagerBuilder::new(TARGET)
        .with_settings(ManagerSettings {
            resync_interval: Some(Duration::from_secs(60)),
            ..settings(Duration::from_secs(10))
        })
        .inject_client(client.clone());

    let start = Instant::now();
    let watched = client.clone();
    let result = run_until(
        manager,
        listed(
            vec![configuration(TARGET, None), configuration("other", None)],
            Vec::new(),
        ),
        move || watched.calls().len() >= 3,
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(client.calls(), vec![TARGET; 3]);
    assert!(start.elapsed() >= Duration::from_secs(120));
}
