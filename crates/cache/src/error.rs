use crate::key::PreviewKey;
use crate::transport::TransportError;

/// Errors returned by the preview cache.
///
/// `Clone` so one failed fetch can be handed to every caller awaiting it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    #[error("failed to fetch preview {key}: {source}")]
    Fetch {
        key: PreviewKey,
        #[source]
        source: TransportError,
    },

    #[error("handle {0} has been revoked")]
    Revoked(String),
}
