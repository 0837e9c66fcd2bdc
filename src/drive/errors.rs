//! Drive API error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriveError {
    #[error("Drive API error (status {status_code}) while {operation}: {message}")]
    ApiError {
        operation: String,
        status_code: u16,
        message: String,
    },

    #[error("Failed to parse Drive response while {operation}: {source}")]
    ResponseError {
        operation: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl DriveError {
    /// HTTP status for API errors, if the backend answered at all
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DriveError::ApiError { status_code, .. } => Some(*status_code),
            DriveError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
