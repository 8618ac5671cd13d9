//! Object identity extraction
//!
//! Produces a uniform [`Identity`] and [`ControllerRef`] from any object the
//! indexer may be handed, whether it is a typed `k8s-openapi` struct, a
//! `DynamicObject` returned by a dynamic API, or a raw JSON document.
//!
//! The two representations of the same object must always yield the same
//! identity: callers pick whichever representation their retrieval path
//! produced and the resolver treats them interchangeably.
//!
//! ## Adding a Typed Kind
//!
//! Typed kinds get their adapter from `impl_object_identity!`. To support a new
//! `k8s-openapi` (or `kube::CustomResource`) type, add it to the macro call
//! below; its group, version and kind come from its `kube::Resource` impl.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Pod, ReplicationController};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::core::{DynamicObject, GroupVersionKind, TypeMeta};
use serde_json::Value;

use crate::error::{IndexerError, Result};

/// Uniform identity of a Kubernetes object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// API group, empty for the core group
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Empty for cluster-scoped objects
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

impl Identity {
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    /// The `apiVersion` string as it appears on the wire
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{} ({})", self.kind, self.name, self.uid)
        } else {
            write!(
                f,
                "{}/{}/{} ({})",
                self.kind, self.namespace, self.name, self.uid
            )
        }
    }
}

/// The owner reference flagged as the controller of an object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControllerRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

impl From<&OwnerReference> for ControllerRef {
    fn from(owner: &OwnerReference) -> Self {
        Self {
            api_version: owner.api_version.clone(),
            kind: owner.kind.clone(),
            name: owner.name.clone(),
            uid: owner.uid.clone(),
        }
    }
}

/// Minimal capability set needed to identify an object.
///
/// Adapters return `None` when the representation does not carry the
/// corresponding part at all; validation of the individual fields happens in
/// [`identity_of`].
pub trait ObjectIdentity {
    /// `apiVersion` and `kind`
    fn type_meta(&self) -> Option<TypeMeta>;

    /// Standard object metadata (namespace, name, uid, owner references)
    fn object_meta(&self) -> Option<Cow<'_, ObjectMeta>>;
}

macro_rules! impl_object_identity {
    ($($type:ty),+ $(,)?) => {
        $(
            impl ObjectIdentity for $type {
                fn type_meta(&self) -> Option<TypeMeta> {
                    Some(TypeMeta {
                        api_version: <$type as kube::Resource>::api_version(&()).into_owned(),
                        kind: <$type as kube::Resource>::kind(&()).into_owned(),
                    })
                }

                fn object_meta(&self) -> Option<Cow<'_, ObjectMeta>> {
                    Some(Cow::Borrowed(<$type as kube::Resource>::meta(self)))
                }
            }
        )+
    };
}

impl_object_identity!(
    Pod,
    ReplicaSet,
    Deployment,
    DaemonSet,
    StatefulSet,
    Job,
    CronJob,
    ReplicationController,
);

impl ObjectIdentity for DynamicObject {
    fn type_meta(&self) -> Option<TypeMeta> {
        self.types.clone()
    }

    fn object_meta(&self) -> Option<Cow<'_, ObjectMeta>> {
        Some(Cow::Borrowed(&self.metadata))
    }
}

/// Raw JSON documents, e.g. the output of `kubectl get -o json` or a
/// serialized `DynamicObject`. Anything that is not a JSON object with
/// `apiVersion`, `kind` and `metadata` fails identification.
impl ObjectIdentity for Value {
    fn type_meta(&self) -> Option<TypeMeta> {
        let api_version = self.get("apiVersion")?.as_str()?;
        let kind = self.get("kind")?.as_str()?;
        Some(TypeMeta {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        })
    }

    fn object_meta(&self) -> Option<Cow<'_, ObjectMeta>> {
        let metadata = self.get("metadata")?;
        match serde_json::from_value::<ObjectMeta>(metadata.clone()) {
            Ok(meta) => Some(Cow::Owned(meta)),
            Err(e) => {
                tracing::debug!("Ignoring malformed metadata: {}", e);
                None
            }
        }
    }
}

impl<T: ObjectIdentity + ?Sized> ObjectIdentity for &T {
    fn type_meta(&self) -> Option<TypeMeta> {
        (**self).type_meta()
    }

    fn object_meta(&self) -> Option<Cow<'_, ObjectMeta>> {
        (**self).object_meta()
    }
}

impl<T: ObjectIdentity + ?Sized> ObjectIdentity for Arc<T> {
    fn type_meta(&self) -> Option<TypeMeta> {
        (**self).type_meta()
    }

    fn object_meta(&self) -> Option<Cow<'_, ObjectMeta>> {
        (**self).object_meta()
    }
}

/// Split an `apiVersion` into group and version (`"v1"` is the core group)
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Extract the identity of an object
pub fn identity_of<O: ObjectIdentity + ?Sized>(obj: &O) -> Result<Identity> {
    let types = obj.type_meta().ok_or_else(|| {
        IndexerError::UnsupportedType("object does not expose apiVersion and kind".to_string())
    })?;
    if types.api_version.is_empty() || types.kind.is_empty() {
        return Err(IndexerError::UnsupportedType(format!(
            "object has empty apiVersion ({:?}) or kind ({:?})",
            types.api_version, types.kind
        )));
    }

    let meta = obj.object_meta().ok_or_else(|| {
        IndexerError::UnsupportedType(format!("{} object does not expose metadata", types.kind))
    })?;

    let name = non_empty(meta.name.as_deref()).ok_or_else(|| {
        IndexerError::UnsupportedType(format!("{} object has no metadata.name", types.kind))
    })?;
    let uid = non_empty(meta.uid.as_deref()).ok_or_else(|| {
        IndexerError::UnsupportedType(format!("{} {} has no metadata.uid", types.kind, name))
    })?;

    let (group, version) = split_api_version(&types.api_version);
    Ok(Identity {
        group: group.to_string(),
        version: version.to_string(),
        kind: types.kind.clone(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        name: name.to_string(),
        uid: uid.to_string(),
    })
}

/// Extract the controller reference of an object, if it has one.
///
/// Only the owner reference with `controller: true` counts; any number of
/// plain owner references is ignored.
pub fn controller_ref_of<O: ObjectIdentity + ?Sized>(obj: &O) -> Option<ControllerRef> {
    let meta = obj.object_meta()?;
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|owner| owner.controller == Some(true))
        .map(ControllerRef::from)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
