//! Collections backed by the Kubernetes watch API

use std::fmt::Debug;

use futures::StreamExt;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

use super::{EventStream, LiveCollection};
use crate::error::Result;

/// A live collection driven by `kube::runtime::watcher` with the default
/// exponential backoff.
///
/// Every subscription opens its own watch, so one `WatchedCollection` can feed
/// any number of indexers.
pub struct WatchedCollection<K>
where
    K: Resource,
{
    api: Api<K>,
    config: watcher::Config,
    name: String,
}

impl<K> WatchedCollection<K>
where
    K: Resource<DynamicType = ()>,
{
    pub fn new(api: Api<K>, config: watcher::Config) -> Self {
        Self {
            api,
            config,
            name: K::kind(&()).to_string(),
        }
    }

    /// Watch one namespace, or all namespaces when `namespace` is `None`
    pub fn namespaced(client: Client, namespace: Option<&str>, config: watcher::Config) -> Self
    where
        K: Resource<Scope = kube::core::NamespaceResourceScope>,
    {
        let api = match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        };
        Self::new(api, config)
    }
}

impl<K> LiveCollection<K> for WatchedCollection<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Send + Sync,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    fn subscribe(&self) -> Result<EventStream<K>> {
        tracing::debug!(collection = %self.name, "Starting watch");
        Ok(watcher(self.api.clone(), self.config.clone())
            .default_backoff()
            .boxed())
    }
}
