//! Kubernetes client module
//!
//! Connects to the API server and wires the Pod and ReplicaSet watches into a
//! [`ControlledPodsIndexer`].

use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Pod;
use kube::core::{DynamicObject, GroupVersionKind, TypeMeta};
use kube::discovery::{self, Scope};
use kube::{Api, Client};

use crate::collection::WatchedCollection;
use crate::config::Config;
use crate::identity::split_api_version;
use crate::indexer::ControlledPodsIndexer;

/// Initialize and return a Kubernetes client
///
/// Uses the default kubeconfig loading strategy:
/// 1. In-cluster config (if running in a pod)
/// 2. KUBECONFIG environment variable
/// 3. ~/.kube/config
pub async fn create_client() -> Result<Client> {
    let config = kube::Config::infer()
        .await
        .context("Failed to infer Kubernetes configuration")?;
    tracing::debug!("Connecting to {}", config.cluster_url);
    let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
    Ok(client)
}

/// Start an indexer watching Pods and ReplicaSets as configured
pub fn start_indexer(client: &Client, config: &Config) -> Result<ControlledPodsIndexer> {
    let namespace = config.namespace.as_deref();
    let pods = WatchedCollection::<Pod>::namespaced(client.clone(), namespace, config.watcher_config());
    let replica_sets =
        WatchedCollection::<ReplicaSet>::namespaced(client.clone(), namespace, config.watcher_config());

    let indexer = ControlledPodsIndexer::with_kinds(&pods, &replica_sets, config.controller_kinds())
        .context("Failed to start controlled pods indexer")?;
    Ok(indexer)
}

/// Fetch an arbitrary object as a `DynamicObject`
///
/// The API resource is resolved through discovery, so any kind served by the
/// cluster (including CRDs) can be fetched. Namespaced objects default to the
/// client's namespace when `namespace` is `None`.
pub async fn fetch_object(
    client: &Client,
    api_version: &str,
    kind: &str,
    namespace: Option<&str>,
    name: &str,
) -> Result<DynamicObject> {
    let (group, version) = split_api_version(api_version);
    let gvk = GroupVersionKind::gvk(group, version, kind);
    let (api_resource, capabilities) = discovery::pinned_kind(client, &gvk)
        .await
        .with_context(|| format!("Failed to discover {} {}", api_version, kind))?;

    let api: Api<DynamicObject> = match (&capabilities.scope, namespace) {
        (Scope::Cluster, _) => Api::all_with(client.clone(), &api_resource),
        (Scope::Namespaced, Some(ns)) => Api::namespaced_with(client.clone(), ns, &api_resource),
        (Scope::Namespaced, None) => Api::default_namespaced_with(client.clone(), &api_resource),
    };

    let mut obj = api
        .get(name)
        .await
        .with_context(|| format!("Failed to fetch {} {}", kind, name))?;

    // Some servers omit apiVersion/kind on single-object reads
    if obj.types.is_none() {
        obj.types = Some(TypeMeta {
            api_version: api_resource.api_version.clone(),
            kind: api_resource.kind.clone(),
        });
    }
    Ok(obj)
}
