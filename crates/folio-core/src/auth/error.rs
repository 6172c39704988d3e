use thiserror::Error;

use crate::api::TransportError;

/// Why an access token payload could not be read. Never escapes
/// classification: any of these means `Expired`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Token does not have three segments")]
    Malformed,

    #[error("Token payload is not valid base64url")]
    Encoding,

    #[error("Token payload is not valid JSON: {0}")]
    Payload(String),

    #[error("Token has no exp claim")]
    MissingExpiry,
}

/// Outcome of a refresh, shared by every caller waiting on the same operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Refresh token rejected by server")]
    Denied,

    #[error("Refresh unavailable: {0}")]
    Unavailable(String),

    /// The session ended while the refresh was in flight
    #[error("Refresh result discarded - session ended")]
    Discarded,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session refresh was rejected - please sign in again")]
    RefreshDenied,

    #[error("Could not refresh session: {0}")]
    RefreshUnavailable(String),

    #[error("Authentication lost - please sign in again")]
    AuthenticationLost,

    #[error("Session expired - please sign in again")]
    SessionExpired,

    #[error("Session ended")]
    SessionEnded,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Invalid email or password")]
    LoginRejected,

    #[error("Unable to reach the sign-in service: {0}")]
    LoginUnavailable(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Credential storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// The session is gone and the user must sign in again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuthError::RefreshDenied
                | AuthError::AuthenticationLost
                | AuthError::SessionExpired
                | AuthError::SessionEnded
                | AuthError::NotAuthenticated
        )
    }

    /// The session is intact and the caller may try the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::RefreshUnavailable(_) | AuthError::LoginUnavailable(_) | AuthError::Transport(_)
        )
    }
}

impl From<RefreshError> for AuthError {
    fn from(e: RefreshError) -> Self {
        match e {
            RefreshError::Denied => AuthError::RefreshDenied,
            RefreshError::Unavailable(reason) => AuthError::RefreshUnavailable(reason),
            RefreshError::Discarded => AuthError::SessionEnded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_errors_map_onto_taxonomy() {
        assert_eq!(AuthError::from(RefreshError::Denied), AuthError::RefreshDenied);
        assert!(AuthError::from(RefreshError::Denied).is_terminal());

        let unavailable = AuthError::from(RefreshError::Unavailable("timeout".into()));
        assert!(unavailable.is_retryable());
        assert!(!unavailable.is_terminal());

        assert_eq!(AuthError::from(RefreshError::Discarded), AuthError::SessionEnded);
    }

    #[test]
    fn test_permission_denied_is_neither() {
        assert!(!AuthError::PermissionDenied.is_terminal());
        assert!(!AuthError::PermissionDenied.is_retryable());
    }
}
