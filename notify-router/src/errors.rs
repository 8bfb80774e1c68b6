use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while relaying a notification
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("Request body exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Decision service timed out after {0:?}")]
    DecisionTimeout(Duration),

    #[error("Decision service request failed: {0}")]
    DecisionRequestFailed(String),

    #[error("Postback timed out after {0:?}")]
    PostbackTimeout(Duration),

    #[error("Postback request failed: {0}")]
    PostbackRequestFailed(String),

    #[error("HTTP client error: {0}")]
    HttpClientError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
