use thiserror::Error;

/// Failure of a single `/auth/refresh` exchange.
#[derive(Error, Debug)]
pub enum RenewalError {
    #[error("Refresh token rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network unavailable during renewal: {0}")]
    NetworkUnavailable(String),

    #[error("Invalid renewal response: {0}")]
    InvalidResponse(String),
}

/// Why a session ended. Every waiter of a failed renewal gets its own copy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TerminalCause {
    #[error("no refresh token available")]
    NoCredential,

    #[error("refresh token rejected: {0}")]
    RenewalRejected(String),

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),
}

impl From<RenewalError> for TerminalCause {
    fn from(err: RenewalError) -> Self {
        match err {
            RenewalError::NetworkUnavailable(msg) => TerminalCause::NetworkUnavailable(msg),
            other => TerminalCause::RenewalRejected(other.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Session expired - please log in again ({0})")]
    SessionExpired(#[source] TerminalCause),

    #[error("Access token contains characters not valid in a header")]
    MalformedToken,
}

impl AuthError {
    /// The terminal cause, if this error ended the session.
    pub fn cause(&self) -> Option<&TerminalCause> {
        match self {
            AuthError::SessionExpired(cause) => Some(cause),
            AuthError::MalformedToken => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renewal_error_to_terminal_cause() {
        let cause: TerminalCause = RenewalError::NetworkUnavailable("reset".to_string()).into();
        assert_eq!(cause, TerminalCause::NetworkUnavailable("reset".to_string()));

        let cause: TerminalCause = RenewalError::Rejected {
            status: 401,
            message: "expired".to_string(),
        }
        .into();
        assert!(matches!(cause, TerminalCause::RenewalRejected(ref m) if m.contains("expired")));

        let cause: TerminalCause = RenewalError::InvalidResponse("not json".to_string()).into();
        assert!(matches!(cause, TerminalCause::RenewalRejected(_)));
    }

    #[test]
    fn test_auth_error_cause() {
        let err = AuthError::SessionExpired(TerminalCause::NoCredential);
        assert_eq!(err.cause(), Some(&TerminalCause::NoCredential));
        assert_eq!(AuthError::MalformedToken.cause(), None);
    }
}
