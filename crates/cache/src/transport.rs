//! Task result transport boundary.

use crate::key::PreviewVariant;
use async_trait::async_trait;

/// Errors returned by a result transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The task or the requested variant does not exist (yet).
    #[error("result not available: {0}")]
    NotFound(String),

    /// The service answered with an unexpected status.
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Request(String),
}

/// Produces the raw bytes of a finished task's output.
#[async_trait]
pub trait ResultTransport: Send + Sync {
    async fn fetch_result_bytes(
        &self,
        task_id: &str,
        variant: PreviewVariant,
    ) -> Result<Vec<u8>, TransportError>;
}
