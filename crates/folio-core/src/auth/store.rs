use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tracing::{debug, warn};

use super::backend::{CredentialBackend, MemoryBackend};
use super::Credential;

#[derive(Debug, Default)]
struct StoreState {
    epoch: u64,
    /// Set when the backend failed to clear; reads report absent until the
    /// next successful write.
    cleared_in_memory: bool,
}

/// The single source of truth for the current credential.
///
/// Every read goes to the backend; nothing above this type keeps its own
/// copy. Writes are serialised and every `clear()` or `replace()` starts a new
/// session epoch, which is how a refresh that finishes after logout or a new
/// login knows to drop its result.
pub struct CredentialStore {
    backend: Box<dyn CredentialBackend>,
    state: Mutex<StoreState>,
}

impl CredentialStore {
    pub fn new(backend: Box<dyn CredentialBackend>) -> Self {
        Self {
            backend,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::default()))
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current credential, or `None` when absent, incomplete, or unreadable
    pub fn read(&self) -> Option<Credential> {
        let state = self.lock();
        self.load(&state)
    }

    fn load(&self, state: &StoreState) -> Option<Credential> {
        if state.cleared_in_memory {
            return None;
        }
        match self.backend.load() {
            Ok(Some(credential)) if credential.is_complete() => Some(credential),
            Ok(Some(_)) => {
                warn!("Stored credential is incomplete, treating as absent");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Credential storage unavailable, treating as absent");
                None
            }
        }
    }

    fn write(&self, state: &mut StoreState, credential: &Credential) -> Result<()> {
        self.backend.save(credential)?;
        state.cleared_in_memory = false;
        Ok(())
    }

    /// Write within the current session (same epoch)
    pub fn save(&self, credential: &Credential) -> Result<()> {
        let mut state = self.lock();
        self.write(&mut state, credential)?;
        debug!("Credential saved");
        Ok(())
    }

    /// Install the credential of a new session. Any refresh still in flight
    /// for the previous one is discarded when it lands.
    pub fn replace(&self, credential: &Credential) -> Result<()> {
        let mut state = self.lock();
        self.write(&mut state, credential)?;
        state.epoch += 1;
        debug!(epoch = state.epoch, "New session credential installed");
        Ok(())
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Save only if no `clear()` or `replace()` happened since `epoch` was read.
    /// Returns whether the credential was written.
    pub fn replace_if_current(&self, epoch: u64, credential: &Credential) -> Result<bool> {
        let mut state = self.lock();
        if state.epoch != epoch {
            debug!(expected = epoch, current = state.epoch, "Session epoch moved, dropping credential");
            return Ok(false);
        }
        self.write(&mut state, credential)?;
        debug!("Credential replaced");
        Ok(true)
    }

    /// Remove the whole record. Returns whether a credential was present.
    ///
    /// If the backend cannot delete the record it stays on disk, but this
    /// store reports absent from then on.
    pub fn clear(&self) -> bool {
        let mut state = self.lock();
        let present = self.load(&state).is_some();
        state.cleared_in_memory = match self.backend.clear() {
            Ok(()) => false,
            Err(e) => {
                warn!(error = %e, "Failed to clear credential storage, suppressing stored record");
                true
            }
        };
        state.epoch += 1;
        debug!(epoch = state.epoch, present, "Credential store cleared");
        present
    }
}
