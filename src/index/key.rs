//! Object keys and index functions

use std::fmt;

use crate::identity::{ObjectIdentity, controller_ref_of};

/// Primary key of an object inside a collection (`namespace/name`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an object, `None` when it has no name
    pub fn of<O: ObjectIdentity + ?Sized>(obj: &O) -> Option<Self> {
        let meta = obj.object_meta()?;
        let name = meta.name.as_deref().filter(|n| !n.is_empty())?;
        Some(Self::new(
            meta.namespace.clone().unwrap_or_default(),
            name.to_string(),
        ))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Index function: the secondary keys an object is filed under
pub type IndexFn<K> = std::sync::Arc<dyn Fn(&K) -> Vec<String> + Send + Sync>;

/// Files an object under the uid of its controller, or nowhere when unowned
pub fn controller_uid_index<K: ObjectIdentity>(obj: &K) -> Vec<String> {
    controller_ref_of(obj)
        .map(|controller| vec![controller.uid])
        .unwrap_or_default()
}

pub(crate) fn object_uid<O: ObjectIdentity + ?Sized>(obj: &O) -> Option<String> {
    obj.object_meta()?.uid.clone().filter(|uid| !uid.is_empty())
}
