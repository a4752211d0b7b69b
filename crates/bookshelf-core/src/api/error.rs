use thiserror::Error;

use crate::auth::CredentialError;
use crate::slot::SlotError;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Unauthorized user: {0} is not allowed to sign in")]
    NotAllowed(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - identity token rejected")]
    Unauthorized,

    #[error("Login endpoint not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Backend issued an unusable credential: {0}")]
    InvalidCredential(#[from] CredentialError),

    #[error("Backend issued an expired credential")]
    ExpiredCredential,

    #[error("Failed to store credential: {0}")]
    Storage(#[from] SlotError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ExchangeError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ExchangeError::Unauthorized,
            403 => ExchangeError::AccessDenied(truncated),
            404 => ExchangeError::NotFound(truncated),
            429 => ExchangeError::RateLimited,
            500..=599 => ExchangeError::ServerError(truncated),
            _ => ExchangeError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}
