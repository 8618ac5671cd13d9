//! Controlled Pods Indexer
//!
//! Answers "which Pods does this controller own?" for any Kubernetes object,
//! following controller references from Pods directly and through
//! ReplicaSets. Both collections are kept current from list+watch streams and
//! indexed by controller UID.

pub mod cluster;
pub mod collection;
pub mod config;
pub mod error;
pub mod identity;
pub mod index;
pub mod indexer;
pub mod kinds;

// Re-export commonly used types for convenience
pub use collection::{
    ChannelCollection, CollectionFeed, LiveCollection, SyncSignal, WatchedCollection, channel,
};
pub use error::{IndexerError, Result};
pub use identity::{ControllerRef, Identity, ObjectIdentity, controller_ref_of, identity_of};
pub use index::{ObjectKey, SecondaryIndex};
pub use indexer::{ControlledPodsIndexer, IndexStats};
pub use kinds::{ControllerClass, ControllerKinds};
