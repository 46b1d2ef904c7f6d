use serde::Deserialize;
use thiserror::Error;

use crate::auth::AuthError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - invalid credentials or expired session")]
    Unauthorized,

    #[error("Still unauthorized after renewing credentials: {0}")]
    RetryExhausted(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body produced by the backend's exception handlers.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    field: Option<String>,
    message: Option<String>,
}

impl ErrorResponse {
    fn summary(&self) -> Option<String> {
        let message = self.message.clone()?;
        let details: Vec<String> = self
            .details
            .iter()
            .filter_map(|d| match (&d.field, &d.message) {
                (Some(field), Some(msg)) => Some(format!("{}: {}", field, msg)),
                (None, Some(msg)) => Some(msg.clone()),
                _ => None,
            })
            .collect();
        if details.is_empty() {
            Some(message)
        } else {
            Some(format!("{} ({})", message, details.join("; ")))
        }
    }
}

/// Truncate a response body to avoid logging excessive data
pub fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

impl ApiError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorResponse>(body)
            .ok()
            .and_then(|e| e.summary())
            .unwrap_or_else(|| body.to_string());
        let truncated = truncate_body(&message);
        match status.as_u16() {
            400 | 422 => ApiError::BadRequest(truncated),
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// True when the error means the user has to log in again.
    pub fn is_session_ended(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized | ApiError::RetryExhausted(_) | ApiError::Auth(_)
        )
    }
}
