//! Notification errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("no revision recorded for {stage}/{action} in pipeline '{pipeline}'")]
    MissingRevision {
        pipeline: String,
        stage: String,
        action: String,
    },

    #[error("pipeline state unavailable: {0}")]
    State(String),

    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Core(#[from] pipewright_core::Error),
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        NotifyError::Request(e.to_string())
    }
}
