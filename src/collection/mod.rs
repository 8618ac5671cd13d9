//! Live collections
//!
//! A live collection is a continuously synchronized view of one remote object
//! collection. The indexer consumes it as a stream of `kube` watcher events:
//! an initial listing (`Init`, `InitApply`..., `InitDone`), then `Apply` and
//! `Delete` notifications, with a fresh listing after every watch desync.
//!
//! Keeping the stream alive (list+watch, retries, backoff) is the job of the
//! collection, not of the indexer. Two implementations are provided:
//! - [`WatchedCollection`]: a `kube::runtime::watcher` over an `Api<K>`
//! - [`ChannelCollection`]: events pushed in-process through a [`CollectionFeed`]

mod channel;
mod watched;

pub use channel::*;
pub use watched::*;

use futures::StreamExt;
use futures::stream::BoxStream;
use kube::runtime::watcher;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::identity::ObjectIdentity;
use crate::index::SecondaryIndex;

/// Stream of list+watch events for one collection
pub type EventStream<K> = BoxStream<'static, Result<watcher::Event<K>, watcher::Error>>;

/// Source of list+watch events for objects of type `K`
#[cfg_attr(test, mockall::automock)]
pub trait LiveCollection<K: Send + Sync + 'static>: Send + Sync {
    /// Name used in logs
    fn name(&self) -> String;

    /// Open the event stream. Fails with a configuration error when the
    /// collection cannot be attached to (more) indices.
    fn subscribe(&self) -> Result<EventStream<K>>;
}

/// Hooks called by the event loop after it changed the index
pub trait IndexObserver<K>: Send + Sync + 'static {
    /// An updated object is no longer filed under `left_keys`
    fn moved(&self, _left_keys: &[String]) {}

    /// An object was deleted from the collection
    fn deleted(&self, _obj: &K) {}

    /// The index was rebuilt from a fresh listing
    fn relisted(&self) {}
}

/// Observer that does nothing
pub struct NoopObserver;

impl<K> IndexObserver<K> for NoopObserver {}

/// Receiving side of a collection's "initial listing loaded" signal
#[derive(Debug, Clone)]
pub struct SyncSignal {
    rx: watch::Receiver<bool>,
}

impl SyncSignal {
    pub fn is_synced(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves `true` once synced, `false` if the event loop ended before
    pub async fn wait(&self) -> bool {
        let mut rx = self.rx.clone();
        rx.wait_for(|synced| *synced).await.is_ok()
    }
}

/// Spawn the event loop that keeps `index` in step with `events`.
///
/// During a listing the objects are buffered and swapped into the index in
/// one step on `InitDone`, so queries keep seeing the previous contents until
/// the new listing is complete. The returned signal flips to synced after the
/// first complete listing.
pub fn spawn_indexing<K, O>(
    name: String,
    mut events: EventStream<K>,
    index: SecondaryIndex<K>,
    observer: O,
) -> (SyncSignal, JoinHandle<()>)
where
    K: ObjectIdentity + Send + Sync + 'static,
    O: IndexObserver<K>,
{
    let (synced_tx, synced_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut listing: Option<Vec<K>> = None;
        let mut error_count = 0u32;

        while let Some(event) = events.next().await {
            match event {
                Ok(watcher::Event::Init) => {
                    error_count = 0;
                    tracing::debug!(collection = %name, "Listing started");
                    listing = Some(Vec::new());
                }
                Ok(watcher::Event::InitApply(obj)) => {
                    error_count = 0;
                    listing.get_or_insert_with(Vec::new).push(obj);
                }
                Ok(watcher::Event::InitDone) => {
                    error_count = 0;
                    let objects = listing.take().unwrap_or_default();
                    index.replace(objects);
                    observer.relisted();
                    if !synced_tx.send_replace(true) {
                        tracing::info!(collection = %name, objects = index.len(), "Collection synced");
                    }
                }
                Ok(watcher::Event::Apply(obj)) => {
                    error_count = 0;
                    let left_keys = index.apply(obj);
                    if !left_keys.is_empty() {
                        observer.moved(&left_keys);
                    }
                }
                Ok(watcher::Event::Delete(obj)) => {
                    error_count = 0;
                    index.delete(&obj);
                    observer.deleted(&obj);
                }
                Err(e) => {
                    error_count += 1;
                    // Only log errors occasionally to avoid spam
                    if error_count == 1 || error_count.is_multiple_of(10) {
                        tracing::warn!(collection = %name, errors = error_count, "Watch error: {}", e);
                    }
                }
            }
        }

        tracing::debug!(collection = %name, "Event stream ended");
    });

    (SyncSignal { rx: synced_rx }, handle)
}
