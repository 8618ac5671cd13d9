//! Secondary indices
//!
//! A [`SecondaryIndex`] mirrors one live collection and files every object
//! under the keys produced by its index function (for the indexer: the uid of
//! the object's controller). It is updated incrementally from collection
//! notifications and answers "which objects are filed under this key".
//!
//! All mutations happen under a single write lock, so a reader always sees
//! each key's member set either before or after a notification, never half
//! applied.

mod key;

pub use key::*;
pub(crate) use key::object_uid;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::identity::ObjectIdentity;

/// Decides whether a deleted object is kept as a retired entry
pub type RetentionFn<K> = Arc<dyn Fn(&K) -> bool + Send + Sync>;

struct Entry<K> {
    object: Arc<K>,
    keys: Vec<String>,
}

struct IndexState<K> {
    /// Live objects by primary key
    entries: HashMap<ObjectKey, Entry<K>>,
    /// Secondary key -> primary keys of live objects
    by_key: HashMap<String, BTreeSet<ObjectKey>>,
    /// (secondary key, object uid) -> deleted object kept for ownership lookups
    retired: BTreeMap<(String, String), Arc<K>>,
}

impl<K> IndexState<K> {
    fn insert(&mut self, primary: ObjectKey, entry: Entry<K>) {
        for key in &entry.keys {
            self.by_key
                .entry(key.clone())
                .or_default()
                .insert(primary.clone());
        }
        self.entries.insert(primary, entry);
    }

    fn remove(&mut self, primary: &ObjectKey) -> Option<Entry<K>> {
        let entry = self.entries.remove(primary)?;
        for key in &entry.keys {
            if let Some(members) = self.by_key.get_mut(key) {
                members.remove(primary);
                if members.is_empty() {
                    self.by_key.remove(key);
                }
            }
        }
        Some(entry)
    }

    fn retire(&mut self, uid: String, entry: Entry<K>) {
        for key in entry.keys {
            self.retired
                .insert((key, uid.clone()), Arc::clone(&entry.object));
        }
    }

    fn forget_retired_uid(&mut self, uid: &str) {
        self.retired.retain(|(_, retired_uid), _| retired_uid != uid);
    }
}

/// Thread-safe secondary index over one collection
pub struct SecondaryIndex<K> {
    name: Arc<str>,
    index_fn: IndexFn<K>,
    retention: Option<RetentionFn<K>>,
    inner: Arc<RwLock<IndexState<K>>>,
}

impl<K> Clone for SecondaryIndex<K> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            index_fn: Arc::clone(&self.index_fn),
            retention: self.retention.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> SecondaryIndex<K>
where
    K: ObjectIdentity + Send + Sync + 'static,
{
    /// Create an empty index with a custom index function
    pub fn new(name: impl Into<String>, index_fn: IndexFn<K>) -> Self {
        Self {
            name: Arc::from(name.into()),
            index_fn,
            retention: None,
            inner: Arc::new(RwLock::new(IndexState {
                entries: HashMap::new(),
                by_key: HashMap::new(),
                retired: BTreeMap::new(),
            })),
        }
    }

    /// Create an empty index keyed by controller uid
    pub fn by_controller_uid(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(controller_uid_index::<K>))
    }

    /// Keep deleted objects as retired entries while `retention` holds for them.
    ///
    /// `retention` runs while this index is write-locked and must not call
    /// back into it.
    ///
    /// Retired entries are invisible to [`by_key`](Self::by_key) and only
    /// returned by [`retired_by_key`](Self::retired_by_key).
    pub fn with_retention(mut self, retention: RetentionFn<K>) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add or update an object, moving it between keys when they changed.
    ///
    /// Returns the keys the object was filed under before and no longer is.
    pub fn apply(&self, obj: K) -> Vec<String> {
        let Some(primary) = ObjectKey::of(&obj) else {
            tracing::warn!(index = %self.name, "Ignoring object without a name");
            return Vec::new();
        };
        let keys = (self.index_fn)(&obj);
        let uid = object_uid(&obj);

        let mut state = self.write();
        let previous = state.remove(&primary);
        if let Some(uid) = &uid {
            state.forget_retired_uid(uid);
        }
        let left = match &previous {
            Some(prev) if prev.keys != keys => {
                tracing::debug!(index = %self.name, object = %primary, from = ?prev.keys, to = ?keys, "Object moved between keys");
                prev.keys
                    .iter()
                    .filter(|key| !keys.contains(key))
                    .cloned()
                    .collect()
            }
            Some(_) => {
                tracing::trace!(index = %self.name, object = %primary, "Object updated");
                Vec::new()
            }
            None => {
                tracing::debug!(index = %self.name, object = %primary, keys = ?keys, "Object added");
                Vec::new()
            }
        };
        state.insert(
            primary,
            Entry {
                object: Arc::new(obj),
                keys,
            },
        );
        left
    }

    /// Remove an object. With a retention policy, an object still needed for
    /// ownership lookups is moved to the retired set instead.
    pub fn delete(&self, obj: &K) {
        let Some(primary) = ObjectKey::of(obj) else {
            return;
        };

        let mut state = self.write();
        let Some(entry) = state.remove(&primary) else {
            tracing::debug!(index = %self.name, object = %primary, "Delete for unknown object");
            return;
        };
        // Under the write lock, so pruning of retired entries orders after it
        let retain = !entry.keys.is_empty() && self.should_retain(obj);
        match (retain, object_uid(obj)) {
            (true, Some(uid)) => {
                tracing::debug!(index = %self.name, object = %primary, "Object deleted, keeping retired entry");
                state.retire(uid, entry);
            }
            _ => {
                tracing::debug!(index = %self.name, object = %primary, "Object deleted");
            }
        }
    }

    /// Replace the whole contents with a fresh listing.
    ///
    /// Live objects missing from the listing are treated as deleted.
    pub fn replace(&self, objects: Vec<K>) {
        let mut fresh = HashMap::with_capacity(objects.len());
        for obj in objects {
            let Some(primary) = ObjectKey::of(&obj) else {
                continue;
            };
            let keys = (self.index_fn)(&obj);
            fresh.insert(
                primary,
                Entry {
                    object: Arc::new(obj),
                    keys,
                },
            );
        }

        let fresh_uids: HashSet<String> = fresh
            .values()
            .filter_map(|entry| object_uid(&*entry.object))
            .collect();

        let mut state = self.write();
        let previous = std::mem::take(&mut state.entries);
        state.by_key.clear();
        state
            .retired
            .retain(|(_, uid), _| !fresh_uids.contains(uid));
        for (primary, entry) in previous {
            if fresh.contains_key(&primary) || entry.keys.is_empty() {
                continue;
            }
            if !self.should_retain(&entry.object) {
                continue;
            }
            if let Some(uid) = object_uid(&*entry.object) {
                state.retire(uid, entry);
            }
        }
        let count = fresh.len();
        for (primary, entry) in fresh {
            state.insert(primary, entry);
        }
        tracing::debug!(index = %self.name, objects = count, retired = state.retired.len(), "Index rebuilt from listing");
    }

    /// Live objects filed under `key`, ordered by `namespace/name`
    pub fn by_key(&self, key: &str) -> Vec<Arc<K>> {
        let state = self.read();
        state
            .by_key
            .get(key)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|primary| state.entries.get(primary))
                    .map(|entry| Arc::clone(&entry.object))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Retired objects that were filed under `key` when deleted
    pub fn retired_by_key(&self, key: &str) -> Vec<Arc<K>> {
        let state = self.read();
        state
            .retired
            .range((key.to_string(), String::new())..)
            .take_while(|((retired_key, _), _)| retired_key == key)
            .map(|(_, obj)| Arc::clone(obj))
            .collect()
    }

    /// Drop retired entries for which `pred` holds; returns how many were dropped
    pub fn forget_retired_where(&self, pred: impl Fn(&K) -> bool) -> usize {
        let mut state = self.write();
        let before = state.retired.len();
        state.retired.retain(|_, obj| !pred(&**obj));
        let dropped = before - state.retired.len();
        if dropped > 0 {
            tracing::debug!(index = %self.name, dropped, "Dropped retired entries");
        }
        dropped
    }

    /// Get a live object by primary key
    pub fn get(&self, primary: &ObjectKey) -> Option<Arc<K>> {
        self.read()
            .entries
            .get(primary)
            .map(|entry| Arc::clone(&entry.object))
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct secondary keys with at least one live object
    pub fn key_count(&self) -> usize {
        self.read().by_key.len()
    }

    /// Number of retired entries
    pub fn retired_len(&self) -> usize {
        self.read().retired.len()
    }

    fn should_retain(&self, obj: &K) -> bool {
        self.retention.as_ref().is_some_and(|retain| retain(obj))
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexState<K>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState<K>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
