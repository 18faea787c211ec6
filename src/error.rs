// Error handling module
// Defines the failure taxonomy surfaced by the portal client

use thiserror::Error;

/// Errors surfaced to callers of the portal client
#[derive(Error, Debug)]
pub enum ClientError {
    /// Authentication with the portal failed (bad credentials, malformed
    /// login response)
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Terminal error response from the portal API. Auth failures land
    /// here too once the single retry has been spent or the path is
    /// exempt from refresh.
    #[error("portal API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Session recovery failed; the stored session has been terminated
    #[error("session refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// Transport-level failure (connect, timeout, decode)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Why a token exchange failed. Cloneable so a single in-flight outcome
/// can be fanned out to every queued caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// No stored token to exchange
    #[error("no session to refresh")]
    NoSession,

    /// The portal rejected the exchange (error status, `status: false`,
    /// or a body we could not make sense of)
    #[error("refresh rejected: {0}")]
    Rejected(String),

    /// The refresh call never produced a usable response
    #[error("refresh unreachable: {0}")]
    Unreachable(String),

    /// The in-flight refresh was dropped before settling
    #[error("refresh abandoned before completion")]
    Abandoned,
}

/// Result type alias for portal client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ClientError::Auth("invalid credentials".to_string());
        assert_eq!(err.to_string(), "authentication failed: invalid credentials");

        let err = ClientError::Api {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "portal API error: 500 - boom");

        let err = ClientError::Refresh(RefreshError::NoSession);
        assert_eq!(err.to_string(), "session refresh failed: no session to refresh");
    }

    #[test]
    fn test_refresh_error_is_cloneable() {
        let err = RefreshError::Rejected("status=false".to_string());
        assert_eq!(err.clone(), err);
    }
}
