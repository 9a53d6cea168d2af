use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {endpoint} failed with status code {status}")]
    RequestFailed {
        endpoint: String,
        status: StatusCode,
    },

    #[error("{endpoint} returned 404 where a resource was required")]
    UnexpectedNotFound { endpoint: String },

    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("execution client rpc error: {0}")]
    Rpc(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    UnknownFork(#[from] stakescope_consensus::fork::UnknownForkError),
}

impl ClientError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(_) => true,
            ClientError::RequestFailed { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}
