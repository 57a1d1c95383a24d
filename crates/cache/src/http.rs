//! HTTP transport against the translation service's result endpoint.

use crate::key::PreviewVariant;
use crate::transport::{ResultTransport, TransportError};
use async_trait::async_trait;

/// Fetches `GET {base}/api/tasks/{id}/result?mode=<variant>&disposition=inline`.
pub struct HttpResultTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpResultTransport {
    /// Create a transport for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client: reqwest::Client::new(), base_url, token: None }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// URL of the result document for `task_id` in `variant`.
    pub fn result_url(&self, task_id: &str, variant: PreviewVariant) -> String {
        format!(
            "{}/api/tasks/{}/result?mode={}&disposition=inline",
            self.base_url,
            urlencoding::encode(task_id),
            variant.as_str()
        )
    }
}

#[async_trait]
impl ResultTransport for HttpResultTransport {
    async fn fetch_result_bytes(
        &self,
        task_id: &str,
        variant: PreviewVariant,
    ) -> Result<Vec<u8>, TransportError> {
        let url = self.result_url(task_id, variant);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Request(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound(format!("{} ({})", task_id, variant)));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status: status.as_u16(), message });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Request(format!("reading body of {}: {}", url, e)))?;
        tracing::debug!(task_id, %variant, bytes = bytes.len(), "fetched task result");
        Ok(bytes.to_vec())
    }
}
