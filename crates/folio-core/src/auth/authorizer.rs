//! Request interceptor: every outgoing API call passes through here.
//!
//! Per request:
//! 1. No credential: public requests go out bare, others are denied locally.
//! 2. `Valid`: attach the bearer token.
//! 3. `ExpiringSoon`: refresh (single-flight) and attach the new token.
//! 4. `Expired`: recover through refresh, or end the session, per
//!    [`ExpiredPolicy`]. A token already judged expired is never sent.
//! 5. A 401 from the server overrides whatever we concluded locally: the
//!    session is terminated and the caller gets `AuthenticationLost`.

use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::api::{ApiRequest, ApiResponse, AuthRequirement, Transport};
use crate::clock::Clock;
use crate::config::ExpiredPolicy;

use super::lifecycle::{self, LifecycleState};
use super::refresh::RefreshCoordinator;
use super::{AuthError, Credential, CredentialStore, SessionTerminator, TerminationReason};

/// Clone is cheap - every component is shared.
#[derive(Clone)]
pub struct RequestAuthorizer {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    coordinator: RefreshCoordinator,
    terminator: Arc<SessionTerminator>,
    clock: Arc<dyn Clock>,
    expired_policy: ExpiredPolicy,
}

impl RequestAuthorizer {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        coordinator: RefreshCoordinator,
        terminator: Arc<SessionTerminator>,
        clock: Arc<dyn Clock>,
        expired_policy: ExpiredPolicy,
    ) -> Self {
        Self {
            transport,
            store,
            coordinator,
            terminator,
            clock,
            expired_policy,
        }
    }

    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, AuthError> {
        let bearer = match self.store.read() {
            Some(credential) => Some(self.access_token_for(credential).await?),
            None if request.auth == AuthRequirement::Optional => None,
            None => {
                debug!(path = %request.path, "No credential for protected request");
                return Err(AuthError::NotAuthenticated);
            }
        };

        let path = request.path.clone();
        let response = self.transport.execute(request.with_bearer(bearer)).await?;

        if response.status == StatusCode::UNAUTHORIZED {
            warn!(path = %path, "Server rejected credential");
            self.terminator.terminate(TerminationReason::Denied);
            return Err(AuthError::AuthenticationLost);
        }
        Ok(response)
    }

    /// A token that is safe to send, refreshing first if needed
    async fn access_token_for(&self, credential: Credential) -> Result<String, AuthError> {
        let state = lifecycle::classify(&credential, self.clock.now());
        debug!(?state, "Classified credential");

        match state {
            LifecycleState::Valid => Ok(credential.access_token),
            LifecycleState::ExpiringSoon => self.recover(&credential).await,
            LifecycleState::Expired => match self.expired_policy {
                ExpiredPolicy::Refresh => self.recover(&credential).await,
                ExpiredPolicy::Terminate => {
                    self.terminator.terminate(TerminationReason::Expired);
                    Err(AuthError::SessionExpired)
                }
            },
            // Unreachable with a credential in hand; deny rather than send.
            LifecycleState::Absent => Err(AuthError::NotAuthenticated),
        }
    }

    async fn recover(&self, credential: &Credential) -> Result<String, AuthError> {
        let refreshed = self.coordinator.refresh(&credential.refresh_token).await?;
        Ok(refreshed.access_token)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use futures::future::join_all;

    use super::*;
    use crate::api::TransportError;
    use crate::auth::endpoints::AuthApi;
    use crate::auth::test_support::{credential_expiring_at, FakeTransport};
    use crate::auth::SessionEvent;
    use crate::clock::ManualClock;

    const EXP: i64 = 1_900_000_000;

    struct Fixture {
        store: Arc<CredentialStore>,
        terminator: Arc<SessionTerminator>,
        transport: Arc<FakeTransport>,
        authorizer: RequestAuthorizer,
    }

    fn fixture(remaining_ms: i64, policy: ExpiredPolicy) -> Fixture {
        let store = Arc::new(CredentialStore::in_memory());
        store.save(&credential_expiring_at(EXP, "rt-1")).expect("save");
        let terminator = Arc::new(SessionTerminator::new(Arc::clone(&store)));
        let transport = Arc::new(FakeTransport::new());
        let api = AuthApi::new(transport.clone(), Duration::from_secs(5), Duration::from_secs(5));
        let now = DateTime::<Utc>::from_timestamp_millis(EXP * 1000 - remaining_ms).expect("timestamp");
        let clock = Arc::new(ManualClock::new(now));
        let coordinator =
            RefreshCoordinator::new(Arc::clone(&store), api, Arc::clone(&terminator), clock.clone());
        let authorizer = RequestAuthorizer::new(
            transport.clone(),
            Arc::clone(&store),
            coordinator,
            Arc::clone(&terminator),
            clock,
            policy,
        );
        Fixture {
            store,
            terminator,
            transport,
            authorizer,
        }
    }

    #[tokio::test]
    async fn test_valid_token_is_attached() {
        let f = fixture(600_000, ExpiredPolicy::Refresh);
        let stored = f.store.read().expect("credential");

        f.authorizer.send(ApiRequest::get("/holdings")).await.expect("send");

        assert_eq!(f.transport.bearers(), vec![Some(stored.access_token)]);
        assert_eq!(f.transport.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_absent_credential() {
        let f = fixture(600_000, ExpiredPolicy::Refresh);
        f.store.clear();

        let denied = f.authorizer.send(ApiRequest::get("/holdings")).await;
        assert_eq!(denied.err(), Some(AuthError::NotAuthenticated));
        assert!(f.transport.bearers().is_empty());

        f.authorizer
            .send(ApiRequest::get("/prices").anonymous())
            .await
            .expect("public request");
        assert_eq!(f.transport.bearers(), vec![None]);
    }

    #[tokio::test]
    async fn test_expiring_soon_requests_share_one_refresh() {
        let f = fixture(120_000, ExpiredPolicy::Refresh);
        let fresh = credential_expiring_at(EXP + 3600, "rt-2");
        f.transport.push_refreshed(&fresh);

        let results = join_all((0..5).map(|_| f.authorizer.send(ApiRequest::get("/holdings")))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(f.transport.refresh_calls(), 1);
        assert_eq!(f.transport.bearers(), vec![Some(fresh.access_token.clone()); 5]);
    }

    #[tokio::test]
    async fn test_refresh_denied_terminates_and_denies() {
        let f = fixture(120_000, ExpiredPolicy::Refresh);
        f.transport
            .push_refresh(Ok(ApiResponse::new(StatusCode::FORBIDDEN, "")));
        let mut events = f.terminator.subscribe();

        let result = f.authorizer.send(ApiRequest::get("/holdings")).await;

        assert_eq!(result.err(), Some(AuthError::RefreshDenied));
        assert!(f.transport.bearers().is_empty());
        assert!(f.store.read().is_none());
        assert_eq!(
            events.try_recv(),
            Ok(SessionEvent::Terminated { reason: TerminationReason::Denied })
        );
    }

    #[tokio::test]
    async fn test_refresh_unavailable_is_retryable_and_keeps_session() {
        let f = fixture(120_000, ExpiredPolicy::Refresh);
        f.transport
            .push_refresh(Err(TransportError::Network("offline".into())));

        let err = f
            .authorizer
            .send(ApiRequest::get("/holdings"))
            .await
            .expect_err("refresh should fail");

        assert!(err.is_retryable());
        assert!(f.store.read().is_some());
        assert!(f.transport.bearers().is_empty());
    }

    #[tokio::test]
    async fn test_expired_token_is_never_sent() {
        let f = fixture(-1_000, ExpiredPolicy::Refresh);
        let fresh = credential_expiring_at(EXP + 3600, "rt-2");
        f.transport.push_refreshed(&fresh);

        f.authorizer.send(ApiRequest::get("/holdings")).await.expect("send");

        assert_eq!(f.transport.refresh_calls(), 1);
        assert_eq!(f.transport.bearers(), vec![Some(fresh.access_token)]);
    }

    #[tokio::test]
    async fn test_expired_with_terminate_policy() {
        let f = fixture(-1_000, ExpiredPolicy::Terminate);
        let mut events = f.terminator.subscribe();

        let result = f.authorizer.send(ApiRequest::get("/holdings")).await;

        assert_eq!(result.err(), Some(AuthError::SessionExpired));
        assert_eq!(f.transport.refresh_calls(), 0);
        assert!(f.transport.bearers().is_empty());
        assert_eq!(
            events.try_recv(),
            Ok(SessionEvent::Terminated { reason: TerminationReason::Expired })
        );
    }

    #[tokio::test]
    async fn test_unauthorized_overrides_local_judgment() {
        let f = fixture(600_000, ExpiredPolicy::Refresh);
        f.transport.set_resource_status(StatusCode::UNAUTHORIZED);
        let mut events = f.terminator.subscribe();

        let results = join_all((0..2).map(|_| f.authorizer.send(ApiRequest::get("/holdings")))).await;

        assert!(results.iter().all(|r| r.as_ref().err() == Some(&AuthError::AuthenticationLost)));
        assert!(f.store.read().is_none());
        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_err(), "only one termination event");
    }

    #[tokio::test]
    async fn test_other_statuses_pass_through() {
        let f = fixture(600_000, ExpiredPolicy::Refresh);
        f.transport.set_resource_status(StatusCode::FORBIDDEN);

        let response = f.authorizer.send(ApiRequest::get("/admin")).await.expect("send");

        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert!(f.store.read().is_some());
    }
}
