//! Failure kinds raised by the HTTP collaborators

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error: {status} for {url}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Request rejected by {url}: {body}")]
    Rejected { url: String, body: String },

    #[error("Malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

impl ProviderError {
    /// Whether the failure came from the network or HTTP layer rather than the payload.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProviderError::Transport { .. } | ProviderError::Status { .. }
        )
    }

    pub fn url(&self) -> &str {
        match self {
            ProviderError::Transport { url, .. }
            | ProviderError::Status { url, .. }
            | ProviderError::Rejected { url, .. }
            | ProviderError::Malformed { url, .. } => url,
        }
    }
}
