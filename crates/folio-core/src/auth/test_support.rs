//! Token and transport fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures::future::{BoxFuture, FutureExt};
use reqwest::StatusCode;

use crate::api::{ApiRequest, ApiResponse, Transport, TransportError};

use super::endpoints::{LOGIN_PATH, REFRESH_PATH};
use super::Credential;

pub(crate) fn token_with_claims(claims: serde_json::Value) -> String {
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

pub(crate) fn token_expiring_at(exp: i64, permissions: &[&str]) -> String {
    token_with_claims(serde_json::json!({
        "exp": exp,
        "sub": "investor-1",
        "role": "investor",
        "permissions": permissions,
    }))
}

pub(crate) fn credential_expiring_at(exp: i64, refresh_token: &str) -> Credential {
    Credential::new(token_expiring_at(exp, &["view_portfolio"]), refresh_token, 900)
}

/// Replies to `/auth/refresh-token` from a queue and to everything else with
/// a fixed status, recording what it saw.
pub(crate) struct FakeTransport {
    refresh_replies: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
    login_replies: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
    resource_status: Mutex<StatusCode>,
    refresh_delay: Duration,
    pub refresh_calls: AtomicUsize,
    refresh_tokens: Mutex<Vec<String>>,
    pub bearers: Mutex<Vec<Option<String>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            refresh_replies: Mutex::new(VecDeque::new()),
            login_replies: Mutex::new(VecDeque::new()),
            resource_status: Mutex::new(StatusCode::OK),
            refresh_delay: Duration::from_millis(20),
            refresh_calls: AtomicUsize::new(0),
            refresh_tokens: Mutex::new(Vec::new()),
            bearers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn push_refresh(&self, reply: Result<ApiResponse, TransportError>) {
        self.refresh_replies.lock().unwrap().push_back(reply);
    }

    pub fn push_refreshed(&self, credential: &Credential) {
        let body = serde_json::to_string(credential).unwrap();
        self.push_refresh(Ok(ApiResponse::new(StatusCode::OK, body)));
    }

    pub fn push_login(&self, reply: Result<ApiResponse, TransportError>) {
        self.login_replies.lock().unwrap().push_back(reply);
    }

    pub fn set_resource_status(&self, status: StatusCode) {
        *self.resource_status.lock().unwrap() = status;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens presented to the refresh endpoint, in order
    pub fn refresh_tokens(&self) -> Vec<String> {
        self.refresh_tokens.lock().unwrap().clone()
    }

    pub fn bearers(&self) -> Vec<Option<String>> {
        self.bearers.lock().unwrap().clone()
    }
}

impl Transport for FakeTransport {
    fn execute(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, TransportError>> {
        async move {
            if request.path == REFRESH_PATH {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                if let Some(token) = request.body.as_ref().and_then(|b| b["refreshToken"].as_str()) {
                    self.refresh_tokens.lock().unwrap().push(token.to_string());
                }
                tokio::time::sleep(self.refresh_delay).await;
                let reply = self.refresh_replies.lock().unwrap().pop_front();
                return reply.unwrap_or_else(|| Err(TransportError::Network("no scripted reply".into())));
            }
            if request.path == LOGIN_PATH {
                let reply = self.login_replies.lock().unwrap().pop_front();
                return reply.unwrap_or_else(|| Err(TransportError::Network("no scripted reply".into())));
            }
            self.bearers
                .lock()
                .unwrap()
                .push(request.bearer().map(str::to_string));
            // Let sibling requests reach the wire before any response lands.
            tokio::task::yield_now().await;
            let status = *self.resource_status.lock().unwrap();
            Ok(ApiResponse::new(status, "{}"))
        }
        .boxed()
    }
}
