//! Single-flight token refresh.
//!
//! At most one refresh request is on the wire per session epoch. Callers that
//! arrive while it is pending await the same shared result, so N requests
//! hitting an expiring token cause exactly one call to the refresh endpoint
//! and nobody races to overwrite the store with a different token pair.
//!
//! The network call runs on its own task: dropping every waiter does not
//! cancel it, because a half-finished refresh could burn the refresh token
//! without installing its replacement. If the session is terminated while it
//! runs, the result is dropped at write time (see `CredentialStore::replace_if_current`).
//!
//! A caller may hold a refresh token that a sibling already rotated. The
//! store is checked before every new request: a rotated, still valid
//! credential is returned as is, otherwise the stored refresh token is used.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::clock::Clock;

use super::endpoints::AuthApi;
use super::error::RefreshError;
use super::lifecycle::{self, LifecycleState};
use super::{Credential, CredentialStore, SessionTerminator, TerminationReason};

type PendingRefresh = Shared<BoxFuture<'static, Result<Credential, RefreshError>>>;

struct InFlight {
    id: u64,
    epoch: u64,
    result: PendingRefresh,
}

struct Inner {
    store: Arc<CredentialStore>,
    api: AuthApi,
    terminator: Arc<SessionTerminator>,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<Option<InFlight>>,
    next_id: AtomicU64,
}

/// Clone is cheap - all clones share one in-flight slot.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        api: AuthApi,
        terminator: Arc<SessionTerminator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                api,
                terminator,
                clock,
                in_flight: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Exchange `refresh_token` for a new credential, or join the refresh
    /// already in flight for this session.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Credential, RefreshError> {
        let pending = {
            let mut slot = self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            let epoch = self.inner.store.epoch();
            match slot.as_ref() {
                Some(op) if op.epoch == epoch => {
                    debug!(id = op.id, "Joining in-flight refresh");
                    op.result.clone()
                }
                _ => {
                    let token = match self.inner.store.read() {
                        None => {
                            debug!("No session to refresh");
                            return Err(RefreshError::Discarded);
                        }
                        Some(current) if current.refresh_token != refresh_token => {
                            let state = lifecycle::classify(&current, self.inner.clock.now());
                            if state == LifecycleState::Valid {
                                debug!("Refresh token already rotated, using stored credential");
                                return Ok(current);
                            }
                            debug!(?state, "Refresh token already rotated, refreshing stored credential");
                            current.refresh_token
                        }
                        Some(_) => refresh_token.to_string(),
                    };

                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                    debug!(id, epoch, "Starting refresh");
                    let task = tokio::spawn(Inner::run(Arc::clone(&self.inner), id, epoch, token));
                    let result = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(RefreshError::Unavailable(format!("Refresh task failed: {}", e)))
                        })
                    }
                    .boxed()
                    .shared();
                    *slot = Some(InFlight {
                        id,
                        epoch,
                        result: result.clone(),
                    });
                    result
                }
            }
        };
        pending.await
    }

    /// Whether a refresh is currently pending
    pub fn is_refreshing(&self) -> bool {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Inner {
    async fn run(self: Arc<Self>, id: u64, epoch: u64, refresh_token: String) -> Result<Credential, RefreshError> {
        let outcome = match self.api.refresh(&refresh_token).await {
            Ok(credential) => match self.store.replace_if_current(epoch, &credential) {
                Ok(true) => {
                    info!(id, "Session refreshed");
                    Ok(credential)
                }
                Ok(false) => {
                    info!(id, "Session ended during refresh, discarding result");
                    Err(RefreshError::Discarded)
                }
                Err(e) => {
                    warn!(id, error = %e, "Failed to store refreshed credential");
                    Err(RefreshError::Unavailable(format!("Failed to store credential: {}", e)))
                }
            },
            Err(e) => Err(e),
        };

        self.release(id);

        if outcome == Err(RefreshError::Denied) {
            self.terminator.terminate(TerminationReason::Denied);
        }
        outcome
    }

    /// Empty the slot if it still holds operation `id`
    fn release(&self, id: u64) {
        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().map(|op| op.id) == Some(id) {
            *slot = None;
        }
    }
}
