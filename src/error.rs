// Errors from outbound provider calls (EKS, Kubernetes, Bedrock, the aws CLI).
// Handlers never propagate these; they are turned into textual results.

use crate::bedrock::event_stream::EventStreamError;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} stream exception {kind}: {message}")]
    StreamException {
        service: &'static str,
        kind: String,
        message: String,
    },

    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("event stream: {0}")]
    EventStream(#[from] EventStreamError),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("unknown cluster: {0}")]
    UnknownCluster(String),

    #[error("cluster token: {0}")]
    Token(String),

    #[error("{program} failed: {message}")]
    Command { program: String, message: String },

    #[error("{program} timed out after {timeout:?}")]
    CommandTimeout {
        program: String,
        timeout: std::time::Duration,
    },
}

impl ProviderError {
    /// True for 401/403 answers, which the dashboard reports as a permission problem.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ProviderError::Status { status: 401 | 403, .. })
    }
}

/// Turn a non-2xx response into `ProviderError::Status`, keeping the body for the message.
pub(crate) async fn ensure_success(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}
