use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Access token is unknown or expired")]
    InvalidToken,

    #[error("Location is outside the store geofence")]
    LocationRejected { distance_meters: Option<f64> },

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Wrap a backend failure (driver error, timeout) as `StorageUnavailable`.
    pub fn unavailable(err: impl fmt::Display) -> Self {
        Error::StorageUnavailable(err.to_string())
    }

    /// Classification reported to callers alongside the message.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidToken => ErrorKind::InvalidToken,
            Error::LocationRejected { .. } | Error::InvalidLocation(_) => {
                ErrorKind::LocationRejected
            }
            Error::Validation(_) => ErrorKind::ValidationError,
            Error::StorageUnavailable(_) | Error::Json(_) | Error::Other(_) => {
                ErrorKind::StorageUnavailable
            }
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::StorageUnavailable
    }
}

/// Machine-distinguishable rejection kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidToken,
    LocationRejected,
    ValidationError,
    StorageUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidToken => "InvalidToken",
            ErrorKind::LocationRejected => "LocationRejected",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::StorageUnavailable => "StorageUnavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
