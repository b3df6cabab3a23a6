//! Watch Events
//!
//! Sorts raw watcher events into the create, update and delete categories
//! the admission predicate decides on, before they reach the reflector
//! cache and the controller queue. The cache only ever holds admitted
//! objects, so an apply for a cached object is an update and anything else
//! is a creation. Periodic resync ticks become generic triggers.

use super::crd::CapsuleConfiguration;
use super::filter::EventPredicate;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use futures::future;
use kube::runtime::reflector::store::Writer;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::ResourceExt;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Whether `event` may update the cache and trigger a reconciliation.
///
/// List bookkeeping (`Init`, `InitDone`) always passes so the cache can
/// become ready.
pub fn admits<P>(
    predicate: &P,
    cache: &Store<CapsuleConfiguration>,
    event: &watcher::Event<CapsuleConfiguration>,
) -> bool
where
    P: EventPredicate + ?Sized,
{
    match event {
        watcher::Event::Init | watcher::Event::InitDone => true,
        watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
            match cache.get(&ObjectRef::from_obj(obj)) {
                Some(old) => predicate.update(&old.name_any(), &obj.name_any()),
                None => predicate.create(&obj.name_any()),
            }
        }
        watcher::Event::Delete(obj) => predicate.delete(&obj.name_any()),
    }
}

/// Filter `events` through `predicate`, mirror what passes into `writer`
/// and yield every touched object as a controller trigger.
///
/// Watch errors are passed through untouched.
pub fn admitted_objects<S, P>(
    events: S,
    predicate: P,
    writer: Writer<CapsuleConfiguration>,
) -> impl Stream<Item = Result<CapsuleConfiguration, watcher::Error>> + Send + 'static
where
    S: Stream<Item = Result<watcher::Event<CapsuleConfiguration>, watcher::Error>> + Send + 'static,
    P: EventPredicate + Send + 'static,
{
    let cache = writer.as_reader();
    events
        .try_filter(move |event| future::ready(admits(&predicate, &cache, event)))
        .reflect(writer)
        .touched_objects()
}

fn resync_ticks(period: Duration) -> impl Stream<Item = ()> + Send {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    stream::unfold(interval, |mut interval| async move {
        interval.tick().await;
        Some(((), interval))
    })
}

/// Generic events: every `period`, each cached object the predicate admits.
pub fn generic_triggers<P>(
    predicate: P,
    cache: Store<CapsuleConfiguration>,
    period: Duration,
) -> impl Stream<Item = ObjectRef<CapsuleConfiguration>> + Send + 'static
where
    P: EventPredicate + Send + 'static,
{
    resync_ticks(period).flat_map(move |()| {
        let due: Vec<_> = cache
            .state()
            .into_iter()
            .filter(|obj| predicate.generic(&obj.name_any()))
            .map(|obj| ObjectRef::from_obj(obj.as_ref()))
            .collect();
        stream::iter(due)
    })
}
