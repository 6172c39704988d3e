//! Background expiry watch with user confirmation.
//!
//! When the token nears expiry the monitor asks the UI, through
//! [`ReauthPrompt`], whether the user wants to stay signed in. The core only
//! awaits the answer; it never touches UI itself.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::ExpiredPolicy;

use super::lifecycle::{self, LifecycleState};
use super::refresh::RefreshCoordinator;
use super::{AuthError, CredentialStore, SessionTerminator, TerminationReason};

/// Implemented by the UI collaborator (a modal, a banner, a CLI prompt).
pub trait ReauthPrompt: Send + Sync {
    /// Resolve `true` to refresh the session, `false` to sign out.
    fn confirm(&self, minutes_left: i64) -> BoxFuture<'_, bool>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// Nothing to do
    Idle,
    Refreshed,
    Terminated(TerminationReason),
    /// Refresh failed; the error says whether the session survived
    RefreshFailed(AuthError),
}

pub struct ExpiryMonitor {
    store: Arc<CredentialStore>,
    coordinator: RefreshCoordinator,
    terminator: Arc<SessionTerminator>,
    clock: Arc<dyn Clock>,
    prompt: Arc<dyn ReauthPrompt>,
    expired_policy: ExpiredPolicy,
    /// `exp` of the token the user was last asked about
    prompted_for: Mutex<Option<i64>>,
}

impl ExpiryMonitor {
    pub fn new(
        store: Arc<CredentialStore>,
        coordinator: RefreshCoordinator,
        terminator: Arc<SessionTerminator>,
        clock: Arc<dyn Clock>,
        prompt: Arc<dyn ReauthPrompt>,
        expired_policy: ExpiredPolicy,
    ) -> Self {
        Self {
            store,
            coordinator,
            terminator,
            clock,
            prompt,
            expired_policy,
            prompted_for: Mutex::new(None),
        }
    }

    pub async fn check(&self) -> MonitorOutcome {
        let Some(credential) = self.store.read() else {
            return MonitorOutcome::Idle;
        };
        let now = self.clock.now();

        match lifecycle::classify(&credential, now) {
            LifecycleState::Valid | LifecycleState::Absent => return MonitorOutcome::Idle,
            LifecycleState::Expired if self.expired_policy == ExpiredPolicy::Terminate => {
                self.terminator.terminate(TerminationReason::Expired);
                return MonitorOutcome::Terminated(TerminationReason::Expired);
            }
            LifecycleState::Expired | LifecycleState::ExpiringSoon => {}
        }

        // Ask once per token; an unreadable token is never prompted for.
        let exp = lifecycle::decode(&credential.access_token).map(|t| t.exp).ok();
        {
            let mut prompted = self.prompted_for.lock().unwrap_or_else(PoisonError::into_inner);
            if exp.is_none() || *prompted == exp {
                return MonitorOutcome::Idle;
            }
            *prompted = exp;
        }

        let minutes_left = lifecycle::minutes_until_expiry(&credential, now);
        debug!(minutes_left, "Asking user to extend session");
        if !self.prompt.confirm(minutes_left).await {
            info!("User declined to extend session");
            self.terminator.terminate(TerminationReason::UserInitiated);
            return MonitorOutcome::Terminated(TerminationReason::UserInitiated);
        }

        // The prompt may have been open for minutes; the session can have
        // ended or been refreshed by a request in the meantime.
        if self.store.read().is_none() {
            debug!("Session ended while prompting");
            return MonitorOutcome::Idle;
        }

        match self.coordinator.refresh(&credential.refresh_token).await {
            Ok(_) => MonitorOutcome::Refreshed,
            Err(e) => {
                let error = AuthError::from(e);
                if error.is_retryable() {
                    // Ask again on the next check.
                    *self.prompted_for.lock().unwrap_or_else(PoisonError::into_inner) = None;
                }
                MonitorOutcome::RefreshFailed(error)
            }
        }
    }

    /// Check every `period` until the task is aborted
    pub async fn run(&self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let outcome = self.check().await;
            if outcome != MonitorOutcome::Idle {
                debug!(?outcome, "Expiry check acted");
            }
        }
    }
}
