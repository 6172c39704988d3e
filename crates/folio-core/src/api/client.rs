//! Typed API client for the folio backend.
//!
//! `ApiClient` sends every call through the [`RequestAuthorizer`], so callers
//! never handle tokens themselves. Rate-limited (429) responses are retried
//! with exponential backoff; auth failures are never retried here.

use std::time::Duration;

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::auth::RequestAuthorizer;

use super::{ApiError, ApiRequest, ApiResponse};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Clone is cheap - the authorizer shares its components through `Arc`s.
#[derive(Clone)]
pub struct ApiClient {
    authorizer: RequestAuthorizer,
}

impl ApiClient {
    pub fn new(authorizer: RequestAuthorizer) -> Self {
        Self { authorizer }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(ApiRequest::get(path)).await?;
        Self::parse(&response, path)
    }

    /// GET against a public endpoint; a token is attached only if held
    pub async fn get_public<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(ApiRequest::get(path).anonymous()).await?;
        Self::parse(&response, path)
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let request = Self::with_body(ApiRequest::post(path), body)?;
        let response = self.send(request).await?;
        Self::parse(&response, path)
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let request = Self::with_body(ApiRequest::new(Method::PUT, path), body)?;
        let response = self.send(request).await?;
        Self::parse(&response, path)
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::new(Method::DELETE, path)).await?;
        Ok(())
    }

    /// Send a request, retrying on 429, and turn non-success statuses into errors.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.authorizer.send(request.clone()).await?;

            if response.is_success() {
                return Ok(response);
            }
            if response.status.as_u16() != 429 {
                return Err(ApiError::from_status(response.status, &response.body));
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(path = %request.path, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2; // Exponential backoff
        }
    }

    fn with_body<B: Serialize>(request: ApiRequest, body: &B) -> Result<ApiRequest, ApiError> {
        request
            .json(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request body: {}", e)))
    }

    fn parse<T: DeserializeOwned>(response: &ApiResponse, path: &str) -> Result<T, ApiError> {
        response.json().map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", path, e))
        })
    }
}
