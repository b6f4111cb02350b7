use thiserror::Error;

/// Failures of the local key-value persistence
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Failures talking to the remote assessment service
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("session expired, please log in again")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// A result already exists for this application
    #[error("{0}")]
    Conflict(String),

    #[error("server error ({status}): {detail}")]
    Server { status: u16, detail: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Transport failures are the only ones worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Refusal to begin a new session
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("a test was already started for application {0}; it cannot be retaken")]
    AlreadyStarted(String),
}
