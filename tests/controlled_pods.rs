//! Controlled pods indexer tests
//!
//! Drives the indexer through in-process collections the same way a
//! list+watch would: an initial listing, then add/update/delete events and
//! occasional re-lists. Index updates are asynchronous, so assertions after an
//! event poll until the index caught up.

use std::time::Duration;

use controlled_pods::{
    ControlledPodsIndexer, ControllerKinds, IndexerError, channel, collection::CollectionFeed,
};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Pod, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use kube::core::DynamicObject;
use serde_json::json;

const NAMESPACE: &str = "default";

fn meta(name: &str, uid: &str, controller: Option<OwnerReference>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        uid: Some(uid.to_string()),
        owner_references: controller.map(|owner| vec![owner]),
        ..Default::default()
    }
}

fn daemon_set(name: &str, uid: &str) -> DaemonSet {
    DaemonSet {
        metadata: meta(name, uid, None),
        ..Default::default()
    }
}

fn deployment(name: &str, uid: &str) -> Deployment {
    Deployment {
        metadata: meta(name, uid, None),
        ..Default::default()
    }
}

fn replica_set(name: &str, uid: &str, owner: &Deployment) -> ReplicaSet {
    ReplicaSet {
        metadata: meta(name, uid, owner.controller_owner_ref(&())),
        ..Default::default()
    }
}

fn pod<O: Resource<DynamicType = ()>>(name: &str, uid: &str, owner: &O) -> Pod {
    Pod {
        metadata: meta(name, uid, owner.controller_owner_ref(&())),
        ..Default::default()
    }
}

fn orphan_pod(name: &str, uid: &str) -> Pod {
    Pod {
        metadata: meta(name, uid, None),
        ..Default::default()
    }
}

/// daemonset-1 (uid-1) controls pod-1 (uid-4); deployment-1 (uid-2) controls
/// rs-1 (uid-3), which controls pod-2 (uid-5)
struct Cluster {
    ds: DaemonSet,
    deploy: Deployment,
    rs: ReplicaSet,
    pod1: Pod,
    pod2: Pod,
}

impl Cluster {
    fn new() -> Self {
        let ds = daemon_set("daemonset-1", "uid-1");
        let deploy = deployment("deployment-1", "uid-2");
        let rs = replica_set("rs-1", "uid-3", &deploy);
        let pod1 = pod("pod-1", "uid-4", &ds);
        let pod2 = pod("pod-2", "uid-5", &rs);
        Self {
            ds,
            deploy,
            rs,
            pod1,
            pod2,
        }
    }
}

struct Harness {
    pods: CollectionFeed<Pod>,
    replica_sets: CollectionFeed<ReplicaSet>,
    indexer: ControlledPodsIndexer,
}

fn attach(kinds: ControllerKinds) -> Harness {
    let (pods, pod_collection) = channel::<Pod>("pods");
    let (replica_sets, replica_set_collection) = channel::<ReplicaSet>("replicasets");
    let indexer =
        ControlledPodsIndexer::with_kinds(&pod_collection, &replica_set_collection, kinds)
            .expect("indexer should attach");
    Harness {
        pods,
        replica_sets,
        indexer,
    }
}

async fn start(pods: Vec<Pod>, replica_sets: Vec<ReplicaSet>) -> Harness {
    let harness = attach(ControllerKinds::default());
    assert!(harness.pods.list(pods));
    assert!(harness.replica_sets.list(replica_sets));
    assert!(
        harness
            .indexer
            .wait_for_cache_sync(tokio::time::sleep(Duration::from_secs(5)))
            .await,
        "caches should sync"
    );
    harness
}

async fn start_cluster(cluster: &Cluster) -> Harness {
    start(
        vec![cluster.pod1.clone(), cluster.pod2.clone()],
        vec![cluster.rs.clone()],
    )
    .await
}

/// Poll until `condition` holds, failing the test after two seconds
async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {}", what);
}

fn names(harness: &Harness, obj: &(impl controlled_pods::ObjectIdentity + ?Sized)) -> Vec<String> {
    harness
        .indexer
        .pods_controlled_by(obj)
        .expect("query should succeed")
        .iter()
        .filter_map(|pod| pod.metadata.name.clone())
        .collect()
}

#[tokio::test]
async fn test_daemonset_pods() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    assert_eq!(names(&harness, &cluster.ds), vec!["pod-1"]);
}

#[tokio::test]
async fn test_deployment_pods_through_replica_set() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    assert_eq!(names(&harness, &cluster.deploy), vec!["pod-2"]);
}

#[tokio::test]
async fn test_replica_set_pods() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    assert_eq!(names(&harness, &cluster.rs), vec!["pod-2"]);
}

#[tokio::test]
async fn test_returned_pod_is_the_cached_object() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    let pods = harness.indexer.pods_controlled_by(&cluster.ds).unwrap();
    assert_eq!(pods.len(), 1);
    assert_eq!(*pods[0], cluster.pod1);
}

#[tokio::test]
async fn test_json_document_input() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    let deploy = json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": "deployment-1",
            "namespace": NAMESPACE,
            "uid": "uid-2",
        },
        "spec": { "replicas": 1 },
    });
    assert_eq!(names(&harness, &deploy), vec!["pod-2"]);

    let ds = serde_json::to_value(&cluster.ds).unwrap();
    assert_eq!(ds["kind"], "DaemonSet");
    assert_eq!(names(&harness, &ds), vec!["pod-1"]);
}

#[tokio::test]
async fn test_dynamic_object_input() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    let deploy: DynamicObject = serde_json::from_value(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": "deployment-1", "namespace": NAMESPACE, "uid": "uid-2" },
    }))
    .unwrap();
    assert_eq!(names(&harness, &deploy), vec!["pod-2"]);
}

#[tokio::test]
async fn test_shared_pointer_input() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    let ds = std::sync::Arc::new(cluster.ds.clone());
    assert_eq!(names(&harness, &ds), vec!["pod-1"]);
}

#[tokio::test]
async fn test_bare_string_is_unsupported() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    let err = harness
        .indexer
        .pods_controlled_by(&json!("deployment-1"))
        .unwrap_err();
    assert!(matches!(err, IndexerError::UnsupportedType(_)));
    assert!(err.to_string().starts_with("Unsupported object type"));
}

#[tokio::test]
async fn test_object_without_uid_is_unsupported() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    let mut ds = cluster.ds.clone();
    ds.metadata.uid = None;
    let err = harness.indexer.pods_controlled_by(&ds).unwrap_err();
    assert!(matches!(err, IndexerError::UnsupportedType(_)));
}

#[tokio::test]
async fn test_non_controller_kind_is_unresolvable() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    let service = json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": "web", "namespace": NAMESPACE, "uid": "uid-9" },
    });
    let err = harness.indexer.pods_controlled_by(&service).unwrap_err();
    assert!(matches!(err, IndexerError::UnresolvableKind { ref kind } if kind == "Service"));
    assert!(err.is_unsupported());
}

#[tokio::test]
async fn test_unknown_uid_is_empty() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    let other = daemon_set("daemonset-2", "uid-42");
    assert!(names(&harness, &other).is_empty());
    let other = deployment("deployment-2", "uid-43");
    assert!(names(&harness, &other).is_empty());
}

#[tokio::test]
async fn test_pods_without_controller_are_ignored() {
    let ds = daemon_set("daemonset-1", "uid-1");
    let mut adopted = pod("pod-1", "uid-4", &ds);
    // Plain owner, not the controller
    if let Some(owners) = adopted.metadata.owner_references.as_mut() {
        owners[0].controller = Some(false);
    }
    let harness = start(vec![adopted, orphan_pod("pod-2", "uid-5")], vec![]).await;

    assert!(names(&harness, &ds).is_empty());
    assert_eq!(harness.indexer.stats().pods, 2);
}

#[tokio::test]
async fn test_pods_added_after_sync() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    let pod3 = pod("pod-3", "uid-6", &cluster.rs);
    assert!(harness.pods.apply(pod3));
    eventually("pod-3 indexed", || {
        names(&harness, &cluster.deploy) == vec!["pod-2", "pod-3"]
    })
    .await;
    assert_eq!(names(&harness, &cluster.rs), vec!["pod-2", "pod-3"]);
}

#[tokio::test]
async fn test_deployment_with_several_replica_sets() {
    let deploy = deployment("web", "uid-d");
    let old_rs = replica_set("web-old", "uid-rs-old", &deploy);
    let new_rs = replica_set("web-new", "uid-rs-new", &deploy);
    let harness = start(
        vec![
            pod("web-new-b", "uid-p3", &new_rs),
            pod("web-old-a", "uid-p1", &old_rs),
            pod("web-new-a", "uid-p2", &new_rs),
        ],
        vec![old_rs.clone(), new_rs.clone()],
    )
    .await;

    assert_eq!(
        names(&harness, &deploy),
        vec!["web-new-a", "web-new-b", "web-old-a"]
    );
    assert_eq!(names(&harness, &old_rs), vec!["web-old-a"]);
}

#[tokio::test]
async fn test_deleted_controllers_still_resolve_their_pods() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    // The deployment itself is not watched; only its ReplicaSet disappears
    assert!(harness.replica_sets.delete(cluster.rs.clone()));
    eventually("rs-1 removed from the live index", || {
        harness.indexer.stats().replica_sets == 0
    })
    .await;

    assert_eq!(harness.indexer.stats().retired_replica_sets, 1);
    assert_eq!(names(&harness, &cluster.deploy), vec!["pod-2"]);
    assert_eq!(names(&harness, &cluster.rs), vec!["pod-2"]);
    assert_eq!(names(&harness, &cluster.ds), vec!["pod-1"]);
}

#[tokio::test]
async fn test_retired_replica_set_pruned_with_its_last_pod() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    assert!(harness.replica_sets.delete(cluster.rs.clone()));
    eventually("rs-1 retired", || {
        harness.indexer.stats().retired_replica_sets == 1
    })
    .await;

    assert!(harness.pods.delete(cluster.pod2.clone()));
    eventually("retired rs-1 pruned", || {
        harness.indexer.stats().retired_replica_sets == 0
    })
    .await;
    assert!(names(&harness, &cluster.deploy).is_empty());
}

#[tokio::test]
async fn test_pod_update_after_controllers_deleted() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    assert!(harness.replica_sets.delete(cluster.rs.clone()));
    eventually("rs-1 retired", || {
        harness.indexer.stats().retired_replica_sets == 1
    })
    .await;

    let mut running = cluster.pod2.clone();
    running.status = Some(PodStatus {
        phase: Some("Running".to_string()),
        ..Default::default()
    });
    assert!(harness.pods.apply(running.clone()));

    eventually("pod-2 updated", || {
        harness
            .indexer
            .pods_controlled_by(&cluster.deploy)
            .is_ok_and(|pods| pods.len() == 1 && *pods[0] == running)
    })
    .await;
    assert_eq!(harness.indexer.stats().retired_replica_sets, 1);
}

#[tokio::test]
async fn test_orphaning_pods_prunes_retired_replica_set() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    // Orphaning delete: the ReplicaSet goes first, then its pods lose the reference
    assert!(harness.replica_sets.delete(cluster.rs.clone()));
    eventually("rs-1 retired", || {
        harness.indexer.stats().retired_replica_sets == 1
    })
    .await;

    assert!(harness.pods.apply(orphan_pod("pod-2", "uid-5")));
    eventually("retired rs-1 pruned", || {
        harness.indexer.stats().retired_replica_sets == 0
    })
    .await;
    assert!(names(&harness, &cluster.deploy).is_empty());
    assert_eq!(harness.indexer.stats().pods, 2);
}

#[tokio::test]
async fn test_adopting_pods_prunes_retired_replica_set() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    assert!(harness.replica_sets.delete(cluster.rs.clone()));
    eventually("rs-1 retired", || {
        harness.indexer.stats().retired_replica_sets == 1
    })
    .await;

    let rs2 = replica_set("rs-2", "uid-7", &cluster.deploy);
    assert!(harness.replica_sets.apply(rs2.clone()));
    assert!(harness.pods.apply(pod("pod-2", "uid-5", &rs2)));

    eventually("pod-2 adopted by rs-2", || {
        harness.indexer.stats().retired_replica_sets == 0
            && names(&harness, &rs2) == vec!["pod-2"]
    })
    .await;
    assert!(names(&harness, &cluster.rs).is_empty());
    assert_eq!(names(&harness, &cluster.deploy), vec!["pod-2"]);
}

#[tokio::test]
async fn test_replica_set_without_pods_is_dropped_on_delete() {
    let deploy = deployment("idle", "uid-d");
    let rs = replica_set("idle-rs", "uid-rs", &deploy);
    let harness = start(vec![], vec![rs.clone()]).await;
    assert_eq!(harness.indexer.stats().replica_sets, 1);

    assert!(harness.replica_sets.delete(rs));
    eventually("idle-rs removed", || {
        harness.indexer.stats().replica_sets == 0
    })
    .await;
    assert_eq!(harness.indexer.stats().retired_replica_sets, 0);
}

#[tokio::test]
async fn test_deleted_pod_is_removed() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    assert!(harness.pods.delete(cluster.pod1.clone()));
    eventually("pod-1 removed", || names(&harness, &cluster.ds).is_empty()).await;
    assert_eq!(harness.indexer.stats().pods, 1);
}

#[tokio::test]
async fn test_pod_update_is_visible() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    let mut running = cluster.pod1.clone();
    running.status = Some(PodStatus {
        phase: Some("Running".to_string()),
        ..Default::default()
    });
    assert!(harness.pods.apply(running.clone()));

    eventually("pod-1 updated", || {
        harness
            .indexer
            .pods_controlled_by(&cluster.ds)
            .is_ok_and(|pods| pods.len() == 1 && *pods[0] == running)
    })
    .await;
}

#[tokio::test]
async fn test_reparented_pod_moves_to_new_controller() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    let adopted = pod("pod-1", "uid-4", &cluster.rs);
    assert!(harness.pods.apply(adopted));

    eventually("pod-1 re-parented", || {
        names(&harness, &cluster.ds).is_empty()
            && names(&harness, &cluster.deploy) == vec!["pod-1", "pod-2"]
    })
    .await;
}

#[tokio::test]
async fn test_orphaned_pod_leaves_controller() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    assert!(harness.pods.apply(orphan_pod("pod-1", "uid-4")));
    eventually("pod-1 orphaned", || names(&harness, &cluster.ds).is_empty()).await;
    assert_eq!(harness.indexer.stats().pods, 2);
}

#[tokio::test]
async fn test_relist_replaces_contents() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    // Watch desync: pod-1 was deleted and pod-3 created while disconnected
    let pod3 = pod("pod-3", "uid-6", &cluster.ds);
    assert!(harness.pods.list(vec![pod3, cluster.pod2.clone()]));

    eventually("pods re-listed", || names(&harness, &cluster.ds) == vec!["pod-3"]).await;
    assert_eq!(names(&harness, &cluster.deploy), vec!["pod-2"]);
    assert!(harness.indexer.has_synced());
}

#[tokio::test]
async fn test_relist_after_replica_set_loss_prunes_retired_entry() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    // rs-1 vanished from the listing while its pod still exists
    assert!(harness.replica_sets.list(Vec::new()));
    eventually("rs-1 retired", || {
        harness.indexer.stats().retired_replica_sets == 1
    })
    .await;
    assert_eq!(names(&harness, &cluster.deploy), vec!["pod-2"]);

    // Next pod listing no longer has pod-2 either
    assert!(harness.pods.list(vec![cluster.pod1.clone()]));
    eventually("retired rs-1 pruned", || {
        harness.indexer.stats().retired_replica_sets == 0
    })
    .await;
    assert!(names(&harness, &cluster.deploy).is_empty());
}

#[tokio::test]
async fn test_replica_set_reappearing_is_live_again() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    assert!(harness.replica_sets.delete(cluster.rs.clone()));
    eventually("rs-1 retired", || {
        harness.indexer.stats().retired_replica_sets == 1
    })
    .await;

    assert!(harness.replica_sets.apply(cluster.rs.clone()));
    eventually("rs-1 live", || {
        let stats = harness.indexer.stats();
        stats.replica_sets == 1 && stats.retired_replica_sets == 0
    })
    .await;
    assert_eq!(names(&harness, &cluster.deploy), vec!["pod-2"]);
}

#[tokio::test]
async fn test_custom_direct_kind() {
    let clone_set = json!({
        "apiVersion": "apps.kruise.io/v1alpha1",
        "kind": "CloneSet",
        "metadata": { "name": "web", "namespace": NAMESPACE, "uid": "uid-cs" },
    });
    let mut managed = orphan_pod("web-abcde", "uid-p");
    managed.metadata.owner_references = Some(vec![OwnerReference {
        api_version: "apps.kruise.io/v1alpha1".to_string(),
        kind: "CloneSet".to_string(),
        name: "web".to_string(),
        uid: "uid-cs".to_string(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }]);

    let harness = attach(ControllerKinds::default().with_direct("CloneSet"));
    assert!(harness.pods.list(vec![managed]));
    assert!(harness.replica_sets.list(vec![]));
    assert!(
        harness
            .indexer
            .wait_for_cache_sync(tokio::time::sleep(Duration::from_secs(5)))
            .await
    );

    assert_eq!(names(&harness, &clone_set), vec!["web-abcde"]);
}

#[tokio::test]
async fn test_cache_sync_cancelled() {
    let harness = attach(ControllerKinds::default());
    assert!(harness.pods.list(vec![]));
    // ReplicaSets never list

    let synced = harness
        .indexer
        .wait_for_cache_sync(tokio::time::sleep(Duration::from_millis(50)))
        .await;
    assert!(!synced);
    assert!(!harness.indexer.has_synced());
}

#[tokio::test]
async fn test_cache_sync_fails_when_collection_closes() {
    let Harness {
        pods,
        replica_sets,
        indexer,
    } = attach(ControllerKinds::default());
    assert!(pods.list(vec![]));
    drop(replica_sets);

    let synced = indexer
        .wait_for_cache_sync(tokio::time::sleep(Duration::from_secs(5)))
        .await;
    assert!(!synced);
}

#[tokio::test]
async fn test_queries_before_sync_are_empty() {
    let cluster = Cluster::new();
    let harness = attach(ControllerKinds::default());

    assert!(!harness.indexer.has_synced());
    assert!(names(&harness, &cluster.ds).is_empty());
    assert!(names(&harness, &cluster.deploy).is_empty());
}

#[tokio::test]
async fn test_collection_attaches_once() {
    let (_pod_feed, pods) = channel::<Pod>("pods");
    let (_rs_feed, replica_sets) = channel::<ReplicaSet>("replicasets");
    let _indexer = ControlledPodsIndexer::new(&pods, &replica_sets).unwrap();

    let err = ControlledPodsIndexer::new(&pods, &replica_sets)
        .err()
        .expect("second attach should fail");
    assert!(matches!(err, IndexerError::Configuration(_)));
}

#[tokio::test]
async fn test_stats_serialize_camel_case() {
    let cluster = Cluster::new();
    let harness = start_cluster(&cluster).await;

    let stats = serde_json::to_value(harness.indexer.stats()).unwrap();
    assert_eq!(
        stats,
        json!({ "pods": 2, "replicaSets": 1, "retiredReplicaSets": 0 })
    );
}
