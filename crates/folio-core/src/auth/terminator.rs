use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::CredentialStore;

/// Buffer size for the session event channel.
/// Termination is rare; 16 leaves room for slow subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum TerminationReason {
    UserInitiated,
    Expired,
    Denied,
}

/// Consumed by the navigation layer to redirect to login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Terminated { reason: TerminationReason },
}

/// Ends the session: clears the store and announces it once.
pub struct SessionTerminator {
    store: Arc<CredentialStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionTerminator {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { store, events }
    }

    /// Clear all session state. The store's epoch moves, so an in-flight
    /// refresh will drop its result instead of resurrecting the session.
    ///
    /// Returns `false` without emitting anything when there was no session.
    pub fn terminate(&self, reason: TerminationReason) -> bool {
        if !self.store.clear() {
            debug!(?reason, "Session already clear");
            return false;
        }
        info!(?reason, "Session terminated");
        // No subscribers is fine; the store is the source of truth.
        let _ = self.events.send(SessionEvent::Terminated { reason });
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
