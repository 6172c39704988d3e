//! The transport seam between the session core and the network.
//!
//! Everything that leaves the process, including the login and refresh
//! calls, goes through a [`Transport`]. `HttpTransport` is the production
//! implementation; tests script their own.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use reqwest::{header, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;

/// Whether a request may go out without a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthRequirement {
    /// Deny locally when no credential is stored
    #[default]
    Required,
    /// Public endpoint; attach a token only if one is held
    Optional,
}

#[derive(Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub auth: AuthRequirement,
    bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            auth: AuthRequirement::Required,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Mark the endpoint as public
    pub fn anonymous(mut self) -> Self {
        self.auth = AuthRequirement::Optional;
        self
    }

    pub(crate) fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }

    /// The access token that will be sent as `Authorization: Bearer`, if any
    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("auth", &self.auth)
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

pub trait Transport: Send + Sync {
    fn execute(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, TransportError>>;
}

/// `reqwest`-backed transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.api_base_url.clone(), config.request_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, TransportError>> {
        async move {
            let url = self.url(&request.path);
            let mut builder = self
                .client
                .request(request.method.clone(), &url)
                .header(header::ACCEPT, "application/json");
            if let Some(token) = request.bearer() {
                builder = builder.bearer_auth(token);
            }
            if let Some(ref body) = request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await?;
            let status = response.status();
            let body = response.text().await?;
            debug!(method = %request.method, path = %request.path, status = status.as_u16(), "Request completed");
            Ok(ApiResponse { status, body })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let transport = HttpTransport::new("https://folio.example.com/api/", Duration::from_secs(5))
            .expect("Failed to build transport");
        assert_eq!(
            transport.url("/holdings"),
            "https://folio.example.com/api/holdings"
        );
        assert_eq!(
            transport.url("auth/refresh-token"),
            "https://folio.example.com/api/auth/refresh-token"
        );
    }

    #[test]
    fn test_debug_redacts_bearer() {
        let request = ApiRequest::get("/holdings").with_bearer(Some("secret-token".to_string()));
        let rendered = format!("{:?}", request);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_builder_defaults_to_required_auth() {
        let request = ApiRequest::post("/orders")
            .json(&serde_json::json!({"symbol": "VTI"}))
            .expect("Failed to encode body");
        assert_eq!(request.auth, AuthRequirement::Required);
        assert_eq!(ApiRequest::get("/prices").anonymous().auth, AuthRequirement::Optional);
        assert!(request.body.is_some());
    }
}
