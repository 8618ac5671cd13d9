//! In-process collections fed through a channel
//!
//! Useful for embedding the indexer behind an existing informer, replaying
//! recorded events, and tests.

use std::sync::{Mutex, PoisonError};

use futures::StreamExt;
use kube::runtime::watcher;
use tokio::sync::mpsc;

use super::{EventStream, LiveCollection};
use crate::error::{IndexerError, Result};

/// Create a connected feed/collection pair
pub fn channel<K>(name: impl Into<String>) -> (CollectionFeed<K>, ChannelCollection<K>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        CollectionFeed { tx },
        ChannelCollection {
            name: name.into(),
            rx: Mutex::new(Some(rx)),
        },
    )
}

/// Sending side: pushes list+watch events into a [`ChannelCollection`]
#[derive(Debug)]
pub struct CollectionFeed<K> {
    tx: mpsc::UnboundedSender<watcher::Event<K>>,
}

impl<K> Clone for CollectionFeed<K> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<K> CollectionFeed<K> {
    /// Send a raw event; returns false once the collection side is gone
    pub fn send(&self, event: watcher::Event<K>) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Send a complete listing (`Init`, one `InitApply` per object, `InitDone`)
    pub fn list(&self, objects: impl IntoIterator<Item = K>) -> bool {
        if !self.send(watcher::Event::Init) {
            return false;
        }
        for obj in objects {
            if !self.send(watcher::Event::InitApply(obj)) {
                return false;
            }
        }
        self.send(watcher::Event::InitDone)
    }

    /// Object added or updated
    pub fn apply(&self, obj: K) -> bool {
        self.send(watcher::Event::Apply(obj))
    }

    /// Object deleted (carrying its last known state)
    pub fn delete(&self, obj: K) -> bool {
        self.send(watcher::Event::Delete(obj))
    }
}

/// Receiving side: a live collection that can be subscribed to once
#[derive(Debug)]
pub struct ChannelCollection<K> {
    name: String,
    rx: Mutex<Option<mpsc::UnboundedReceiver<watcher::Event<K>>>>,
}

impl<K: Send + Sync + 'static> LiveCollection<K> for ChannelCollection<K> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn subscribe(&self) -> Result<EventStream<K>> {
        let rx = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                IndexerError::Configuration(format!(
                    "collection {} is already attached to an index",
                    self.name
                ))
            })?;

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (Ok(event), rx))
        })
        .boxed())
    }
}
