//! Indexer errors

/// Errors returned by identity extraction, construction, and queries.
///
/// An empty result is never an error: a controller with no indexed Pods
/// resolves to an empty list, and an unsynced cache is reported by
/// [`wait_for_cache_sync`](crate::ControlledPodsIndexer::wait_for_cache_sync)
/// returning `false`.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    /// The value does not expose the metadata needed to identify it
    #[error("Unsupported object type: {0}")]
    UnsupportedType(String),

    /// The object is well-formed but its kind does not control Pods
    #[error("Unsupported object type: kind {kind:?} is not a known pod controller")]
    UnresolvableKind { kind: String },

    /// The indexer could not be attached to its collections
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl IndexerError {
    /// True for both flavours of "this input cannot be resolved"
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            IndexerError::UnsupportedType(_) | IndexerError::UnresolvableKind { .. }
        )
    }
}

pub type Result<T, E = IndexerError> = std::result::Result<T, E>;
