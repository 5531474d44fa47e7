use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("dispatch: subject has no contact metadata")]
    MissingContact,

    #[error("dispatch: timed out after {0:?}")]
    Timeout(Duration),

    #[error("dispatch: transport error: {0}")]
    Transport(String),

    #[error("dispatch: HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("dispatch: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for DispatchError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
