//! Controlled pods indexer
//!
//! Answers "which Pods are controlled by this object" from two continuously
//! updated secondary indices: Pods by controller uid, and ReplicaSets by
//! controller uid. Direct controllers (ReplicaSet, DaemonSet, ...) are looked
//! up in the Pods index; Deployments take one hop through the ReplicaSet index.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Pod;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::collection::{
    IndexObserver, LiveCollection, NoopObserver, SyncSignal, spawn_indexing,
};
use crate::error::{IndexerError, Result};
use crate::identity::{ObjectIdentity, controller_ref_of, identity_of};
use crate::index::{ObjectKey, SecondaryIndex, object_uid};
use crate::kinds::{ControllerClass, ControllerKinds};

/// Index sizes, for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub pods: usize,
    pub replica_sets: usize,
    pub retired_replica_sets: usize,
}

/// Efficiently finds the Pods controlled by an object.
///
/// ## Consistency
///
/// Both indices follow their collections asynchronously and independently.
/// A query reads whatever the two indices hold at that moment, which may
/// transiently reflect one collection ahead of the other (for example a Pod
/// observed before its new ReplicaSet has been indexed). Results converge once
/// both collections have delivered the pending events.
///
/// Resolution is driven by the Pods' own controller references: a Pod keeps
/// resolving to its controller after that controller was deleted, and a
/// Deployment keeps resolving to the Pods of its deleted ReplicaSets for as
/// long as those Pods are still indexed.
pub struct ControlledPodsIndexer {
    pods: SecondaryIndex<Pod>,
    replica_sets: SecondaryIndex<ReplicaSet>,
    pods_synced: SyncSignal,
    replica_sets_synced: SyncSignal,
    kinds: ControllerKinds,
    tasks: Vec<JoinHandle<()>>,
}

impl ControlledPodsIndexer {
    /// Attach to the Pod and ReplicaSet collections with the default
    /// controller kinds. Must be called within a tokio runtime.
    pub fn new<P, R>(pods: &P, replica_sets: &R) -> Result<Self>
    where
        P: LiveCollection<Pod> + ?Sized,
        R: LiveCollection<ReplicaSet> + ?Sized,
    {
        Self::with_kinds(pods, replica_sets, ControllerKinds::default())
    }

    /// Attach to the Pod and ReplicaSet collections.
    ///
    /// Fails with [`IndexerError::Configuration`] when `kinds` is inconsistent
    /// or either collection cannot be subscribed; no background work is left
    /// running in that case.
    pub fn with_kinds<P, R>(pods: &P, replica_sets: &R, kinds: ControllerKinds) -> Result<Self>
    where
        P: LiveCollection<Pod> + ?Sized,
        R: LiveCollection<ReplicaSet> + ?Sized,
    {
        kinds.validate()?;

        let pod_events = subscribe(pods)?;
        let replica_set_events = subscribe(replica_sets)?;

        let pod_index = SecondaryIndex::<Pod>::by_controller_uid("pods");
        let replica_set_index = {
            let pods = pod_index.clone();
            SecondaryIndex::<ReplicaSet>::by_controller_uid("replicasets").with_retention(
                Arc::new(move |rs: &ReplicaSet| {
                    object_uid(rs).is_some_and(|uid| !pods.by_key(&uid).is_empty())
                }),
            )
        };

        let (pods_synced, pods_task) = spawn_indexing(
            pods.name(),
            pod_events,
            pod_index.clone(),
            RetiredOwnerPruner {
                pods: pod_index.clone(),
                replica_sets: replica_set_index.clone(),
            },
        );
        let (replica_sets_synced, replica_sets_task) = spawn_indexing(
            replica_sets.name(),
            replica_set_events,
            replica_set_index.clone(),
            NoopObserver,
        );

        tracing::debug!(
            pods = %pods.name(),
            replica_sets = %replica_sets.name(),
            "Controlled pods indexer started"
        );

        Ok(Self {
            pods: pod_index,
            replica_sets: replica_set_index,
            pods_synced,
            replica_sets_synced,
            kinds,
            tasks: vec![pods_task, replica_sets_task],
        })
    }

    /// Wait until both collections loaded their initial listing.
    ///
    /// Returns `false` when `cancelled` completes first (pass e.g.
    /// `tokio::time::sleep(timeout)` or a shutdown signal), or when a
    /// collection's event stream ended before it synced.
    pub async fn wait_for_cache_sync<F: Future>(&self, cancelled: F) -> bool {
        let synced = async {
            self.pods_synced.wait().await && self.replica_sets_synced.wait().await
        };

        tokio::select! {
            synced = synced => {
                if synced {
                    tracing::info!(stats = ?self.stats(), "Caches synced");
                } else {
                    tracing::warn!("Event stream ended before caches synced");
                }
                synced
            }
            _ = cancelled => {
                tracing::debug!(
                    pods_synced = self.pods_synced.is_synced(),
                    replica_sets_synced = self.replica_sets_synced.is_synced(),
                    "Cache sync cancelled"
                );
                false
            }
        }
    }

    /// Whether both collections have loaded their initial listing
    pub fn has_synced(&self) -> bool {
        self.pods_synced.is_synced() && self.replica_sets_synced.is_synced()
    }

    /// Pods controlled by `obj`, directly or through its ReplicaSets.
    ///
    /// `obj` may be a typed object, a `DynamicObject` or a JSON document; only
    /// its kind and uid are used, so it may already be deleted. Returns an
    /// empty list when nothing is indexed under it. The Pods are shared
    /// snapshots of the cached objects, ordered by namespace and name.
    pub fn pods_controlled_by<O: ObjectIdentity + ?Sized>(&self, obj: &O) -> Result<Vec<Arc<Pod>>> {
        let id = identity_of(obj)?;

        let pods = match self.kinds.classify(&id.kind) {
            Some(ControllerClass::Direct) => self.pods.by_key(&id.uid),
            Some(ControllerClass::Indirect) => self.pods_via_replica_sets(&id.uid),
            None => return Err(IndexerError::UnresolvableKind { kind: id.kind }),
        };

        tracing::debug!(object = %id, pods = pods.len(), "Resolved controlled pods");
        Ok(pods)
    }

    /// Current index sizes
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            pods: self.pods.len(),
            replica_sets: self.replica_sets.len(),
            retired_replica_sets: self.replica_sets.retired_len(),
        }
    }

    pub fn kinds(&self) -> &ControllerKinds {
        &self.kinds
    }

    fn pods_via_replica_sets(&self, owner_uid: &str) -> Vec<Arc<Pod>> {
        let live = self.replica_sets.by_key(owner_uid);
        let retired = self.replica_sets.retired_by_key(owner_uid);

        let mut seen = HashSet::new();
        let mut pods = Vec::new();
        for rs in live.iter().chain(retired.iter()) {
            let Some(rs_uid) = object_uid(&**rs) else {
                continue;
            };
            for pod in self.pods.by_key(&rs_uid) {
                let dedup_key = object_uid(&*pod)
                    .or_else(|| ObjectKey::of(&*pod).map(|key| key.to_string()))
                    .unwrap_or_default();
                if seen.insert(dedup_key) {
                    pods.push(pod);
                }
            }
        }
        pods.sort_by_key(|pod| ObjectKey::of(&**pod));
        pods
    }
}

impl Drop for ControlledPodsIndexer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn subscribe<K, C>(collection: &C) -> Result<crate::collection::EventStream<K>>
where
    K: Send + Sync + 'static,
    C: LiveCollection<K> + ?Sized,
{
    collection.subscribe().map_err(|e| match e {
        IndexerError::Configuration(_) => e,
        other => IndexerError::Configuration(format!(
            "cannot attach to collection {}: {}",
            collection.name(),
            other
        )),
    })
}

/// Drops retired ReplicaSet entries once no indexed Pod refers to them
struct RetiredOwnerPruner {
    pods: SecondaryIndex<Pod>,
    replica_sets: SecondaryIndex<ReplicaSet>,
}

impl RetiredOwnerPruner {
    fn prune_unreferenced(&self, owner_uid: &str) {
        if self.pods.by_key(owner_uid).is_empty() {
            self.replica_sets
                .forget_retired_where(|rs| object_uid(rs).as_deref() == Some(owner_uid));
        }
    }
}

impl IndexObserver<Pod> for RetiredOwnerPruner {
    fn moved(&self, left_keys: &[String]) {
        for owner_uid in left_keys {
            self.prune_unreferenced(owner_uid);
        }
    }

    fn deleted(&self, pod: &Pod) {
        if let Some(controller) = controller_ref_of(pod) {
            self.prune_unreferenced(&controller.uid);
        }
    }

    fn relisted(&self) {
        self.replica_sets.forget_retired_where(|rs| {
            object_uid(rs).is_none_or(|uid| self.pods.by_key(&uid).is_empty())
        });
    }
}
