//! The two calls that mint credentials: login and refresh.
//!
//! Both carry a finite timeout and fail closed. Status mapping keeps the line
//! between "the server said no" (rejected/denied) and "we could not get an
//! answer" (unavailable) sharp, because only the latter is retryable.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::{ApiRequest, ApiResponse, Transport, TransportError};
use crate::config::Config;

use super::error::{AuthError, RefreshError};
use super::Credential;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh-token";

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

/// Server rejected what we sent, as opposed to failing to answer
fn is_rejection(status: StatusCode) -> bool {
    matches!(status.as_u16(), 400 | 401 | 403)
}

fn parse_credential(response: &ApiResponse) -> Result<Credential, String> {
    let credential: Credential = response
        .json()
        .map_err(|e| format!("Invalid credential response: {}", e))?;
    if !credential.is_complete() {
        return Err("Credential response is missing a token".to_string());
    }
    Ok(credential)
}

/// Client for the auth endpoints.
/// Clone is cheap - the transport is shared.
#[derive(Clone)]
pub struct AuthApi {
    transport: Arc<dyn Transport>,
    login_timeout: Duration,
    refresh_timeout: Duration,
}

impl AuthApi {
    pub fn new(transport: Arc<dyn Transport>, login_timeout: Duration, refresh_timeout: Duration) -> Self {
        Self {
            transport,
            login_timeout,
            refresh_timeout,
        }
    }

    pub fn from_config(transport: Arc<dyn Transport>, config: &Config) -> Self {
        Self::new(transport, config.login_timeout(), config.refresh_timeout())
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<Credential, AuthError> {
        let api_request = ApiRequest::post(LOGIN_PATH)
            .anonymous()
            .json(request)
            .map_err(|e| AuthError::LoginUnavailable(e.to_string()))?;

        let response = match tokio::time::timeout(self.login_timeout, self.transport.execute(api_request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(AuthError::LoginUnavailable(e.to_string())),
            Err(_) => return Err(AuthError::LoginUnavailable(TransportError::Timeout.to_string())),
        };

        if is_rejection(response.status) {
            debug!(status = response.status.as_u16(), "Login rejected");
            return Err(AuthError::LoginRejected);
        }
        if !response.is_success() {
            return Err(AuthError::LoginUnavailable(format!("Status {}", response.status)));
        }
        parse_credential(&response).map_err(AuthError::LoginUnavailable)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<Credential, RefreshError> {
        let api_request = ApiRequest::post(REFRESH_PATH)
            .anonymous()
            .json(&RefreshBody { refresh_token })
            .map_err(|e| RefreshError::Unavailable(e.to_string()))?;

        let response = match tokio::time::timeout(self.refresh_timeout, self.transport.execute(api_request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(error = %e, "Refresh request failed");
                return Err(RefreshError::Unavailable(e.to_string()));
            }
            Err(_) => {
                warn!(timeout_secs = self.refresh_timeout.as_secs(), "Refresh request timed out");
                return Err(RefreshError::Unavailable(TransportError::Timeout.to_string()));
            }
        };

        if is_rejection(response.status) {
            warn!(status = response.status.as_u16(), "Refresh token rejected");
            return Err(RefreshError::Denied);
        }
        if !response.is_success() {
            return Err(RefreshError::Unavailable(format!("Status {}", response.status)));
        }
        parse_credential(&response).map_err(RefreshError::Unavailable)
    }
}
