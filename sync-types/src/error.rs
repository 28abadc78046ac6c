//! Error types for feedsync.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a failed page fetch.
///
/// The retry policy decides on the kind alone; the detail lives in
/// [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// HTTP 401: the credential was refused.
    InvalidCredential,
    /// HTTP 5xx, or any status outside the other classes.
    RateLimitedOrServerError,
    /// HTTP 4xx other than 401. The request itself is wrong.
    ClientError,
    /// Connection-level failure, no HTTP status.
    TransportError,
    /// The payload did not decode into the expected structure.
    DecodeError,
}

impl ErrorKind {
    /// Classify an HTTP status code.
    ///
    /// Returns `None` for 2xx statuses, which are not failures.
    pub fn from_status(status: u16) -> Option<ErrorKind> {
        match status {
            200..=299 => None,
            401 => Some(ErrorKind::InvalidCredential),
            400..=499 => Some(ErrorKind::ClientError),
            _ => Some(ErrorKind::RateLimitedOrServerError),
        }
    }

    /// Whether waiting (for time or for a credential) can fix this failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::ClientError)
    }

    /// A short message suitable for showing to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidCredential => "Your credential was rejected. Please sign in again.",
            ErrorKind::RateLimitedOrServerError => {
                "The server is busy or unavailable. Try again later."
            }
            ErrorKind::ClientError => "The request was rejected by the server.",
            ErrorKind::TransportError => "Could not reach the server. Check your connection.",
            ErrorKind::DecodeError => "The server sent a response that could not be read.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidCredential => "invalid credential",
            ErrorKind::RateLimitedOrServerError => "rate limited or server error",
            ErrorKind::ClientError => "client error",
            ErrorKind::TransportError => "transport error",
            ErrorKind::DecodeError => "decode error",
        };
        f.write_str(name)
    }
}

/// A failed page fetch with its detail.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {kind}")]
    Status {
        /// Raw status code
        status: u16,
        /// Classification of the status
        kind: ErrorKind,
    },

    /// The request never produced a response.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The response body was not the expected shape.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The request could not be built (bad endpoint URL).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Build the error for a non-success status.
    ///
    /// A 2xx status passed here is treated as a server error, since the caller
    /// already decided it was a failure.
    pub fn from_status(status: u16) -> Self {
        let kind = ErrorKind::from_status(status).unwrap_or(ErrorKind::RateLimitedOrServerError);
        FetchError::Status { status, kind }
    }

    /// Classification used by the retry policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Status { kind, .. } => *kind,
            FetchError::Transport(_) => ErrorKind::TransportError,
            FetchError::Decode(_) => ErrorKind::DecodeError,
            FetchError::InvalidRequest(_) => ErrorKind::ClientError,
        }
    }
}
