//! Error types for the sync engine
//!
//! Two layers: [`RequestError`] is what the HTTP client reports
//! mechanically (transport, non-2xx status, bad body); [`SyncError`] is
//! the three-way taxonomy the repository exposes to callers. Only the
//! repository maps one into the other.

use thiserror::Error;

/// A failure reported by the HTTP client, before classification
#[derive(Debug, Error)]
pub enum RequestError {
    /// Transport-level failure: DNS, connect, timeout, reset
    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    /// The server responded with a non-2xx status
    #[error("server returned {code}: {message}")]
    Status {
        /// HTTP status code
        code: u16,
        /// Status text or response body excerpt
        message: String,
    },

    /// The response body was absent or malformed
    #[error("malformed response body: {0}")]
    Decode(#[source] reqwest::Error),
}

impl RequestError {
    /// Split a raw reqwest error into transport vs. decode
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err)
        } else {
            Self::Transport(err)
        }
    }
}

/// The repository-level error taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Could not reach the server at all
    #[error("network error")]
    Network,

    /// The server responded but signaled failure
    #[error("api error {code}: {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Server-provided message
        message: String,
    },

    /// Anything uncategorized
    #[error("unknown error")]
    Unknown,
}

impl From<RequestError> for SyncError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Transport(_) => Self::Network,
            RequestError::Status { code, message } => Self::Api { code, message },
            RequestError::Decode(_) => Self::Unknown,
        }
    }
}
