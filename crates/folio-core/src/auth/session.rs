use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::api::{ApiClient, HttpTransport, Transport};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;

use super::backend::{open_backend, CredentialBackend};
use super::endpoints::{AuthApi, LoginRequest};
use super::lifecycle::{self, LifecycleState};
use super::monitor::{ExpiryMonitor, ReauthPrompt};
use super::refresh::RefreshCoordinator;
use super::{
    AuthError, CapabilityGuard, CredentialStore, Principal, RequestAuthorizer, SessionEvent,
    SessionTerminator, TerminationReason,
};

/// One application session: a single store, terminator, refresh coordinator,
/// authorizer, and guard, wired together at startup and handed to consumers
/// by reference.
pub struct Session {
    config: Config,
    store: Arc<CredentialStore>,
    terminator: Arc<SessionTerminator>,
    coordinator: RefreshCoordinator,
    authorizer: RequestAuthorizer,
    guard: CapabilityGuard,
    auth_api: AuthApi,
    login_fallback: Option<AuthApi>,
    clock: Arc<dyn Clock>,
}

impl Session {
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        backend: Box<dyn CredentialBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Arc::new(CredentialStore::new(backend));
        let terminator = Arc::new(SessionTerminator::new(Arc::clone(&store)));
        let auth_api = AuthApi::from_config(Arc::clone(&transport), &config);
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&store),
            auth_api.clone(),
            Arc::clone(&terminator),
            Arc::clone(&clock),
        );
        let authorizer = RequestAuthorizer::new(
            transport,
            Arc::clone(&store),
            coordinator.clone(),
            Arc::clone(&terminator),
            Arc::clone(&clock),
            config.expired_policy,
        );
        let guard = CapabilityGuard::new(
            Arc::clone(&store),
            Arc::clone(&terminator),
            Arc::clone(&clock),
            &config,
        );

        Self {
            config,
            store,
            terminator,
            coordinator,
            authorizer,
            guard,
            auth_api,
            login_fallback: None,
            clock,
        }
    }

    /// Production wiring: HTTP transport, configured storage, wall clock
    pub fn open(config: Config) -> Result<Self> {
        let transport = Arc::new(HttpTransport::from_config(&config)?);
        let backend = open_backend(&config)?;
        Ok(Self::new(config, transport, backend, Arc::new(SystemClock)))
    }

    /// Alternate login endpoint, tried only when the primary cannot be
    /// reached. A rejected password is final.
    pub fn with_login_fallback(mut self, fallback: AuthApi) -> Self {
        self.login_fallback = Some(fallback);
        self
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<Principal, AuthError> {
        let credential = match (self.auth_api.login(request).await, &self.login_fallback) {
            (Err(AuthError::LoginUnavailable(reason)), Some(fallback)) => {
                warn!(%reason, "Primary login unavailable, trying fallback");
                fallback.login(request).await?
            }
            (result, _) => result?,
        };

        if !lifecycle::classify(&credential, self.clock.now()).is_usable() {
            return Err(AuthError::LoginUnavailable(
                "Server issued an unusable access token".to_string(),
            ));
        }
        let token = lifecycle::decode(&credential.access_token)
            .map_err(|e| AuthError::LoginUnavailable(e.to_string()))?;

        self.store
            .replace(&credential)
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        let principal = Principal::from_claims(&token.claims);
        info!(subject = %principal.subject, "Login successful");
        Ok(principal)
    }

    /// Returns whether there was a session to end
    pub fn logout(&self) -> bool {
        self.terminator.terminate(TerminationReason::UserInitiated)
    }

    pub fn state(&self) -> LifecycleState {
        lifecycle::classify_stored(self.store.read().as_ref(), self.clock.now())
    }

    /// Minutes left on the access token (for display)
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.store
            .read()
            .map(|credential| lifecycle::minutes_until_expiry(&credential, self.clock.now()))
    }

    pub fn principal(&self) -> Option<Principal> {
        self.guard.principal()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.terminator.subscribe()
    }

    pub fn authorizer(&self) -> &RequestAuthorizer {
        &self.authorizer
    }

    pub fn guard(&self) -> &CapabilityGuard {
        &self.guard
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn api_client(&self) -> ApiClient {
        ApiClient::new(self.authorizer.clone())
    }

    pub fn monitor(&self, prompt: Arc<dyn ReauthPrompt>) -> ExpiryMonitor {
        ExpiryMonitor::new(
            Arc::clone(&self.store),
            self.coordinator.clone(),
            Arc::clone(&self.terminator),
            Arc::clone(&self.clock),
            prompt,
            self.config.expired_policy,
        )
    }
}
