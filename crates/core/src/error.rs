use pdf_compare_cache::CacheError;
use pdf_compare_render::RenderError;

/// Errors surfaced by viewers and the preview service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewerError {
    /// The preview bytes could not be produced.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The decoder rejected the document. Terminal for that session.
    #[error("failed to open document: {0}")]
    Open(RenderError),

    /// A newer source replaced the session before it settled.
    #[error("render session {ticket} was superseded")]
    Superseded { ticket: u64 },

    /// The viewer or service was shut down.
    #[error("viewer is closed")]
    Closed,

    /// Constructed outside a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,
}

impl ViewerError {
    /// `true` for outcomes that are not failures from the user's point of view.
    pub fn is_superseded(&self) -> bool {
        matches!(self, ViewerError::Superseded { .. })
    }
}

/// Result type for viewer and service operations.
pub type ViewerResult<T> = Result<T, ViewerError>;
