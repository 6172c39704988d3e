//! Authentication module for managing the client session.
//!
//! This module provides:
//! - `CredentialStore`: the single source of truth for the token pair, over a
//!   memory, file, or OS keychain backend
//! - `lifecycle`: JWT payload decoding and Valid/ExpiringSoon/Expired classification
//! - `RefreshCoordinator`: single-flight token refresh
//! - `RequestAuthorizer`: attaches, refreshes, or withholds credentials per request
//! - `CapabilityGuard`: route activation by capability set
//! - `SessionTerminator`: clears the session and announces it once
//! - `ExpiryMonitor`: asks the user to extend a session about to lapse
//! - `Session`: wires one of each together
//!
//! Access tokens count as expiring soon 5 minutes before their `exp` claim.

pub mod authorizer;
pub mod backend;
pub mod credential;
pub mod endpoints;
pub mod error;
pub mod guard;
pub mod lifecycle;
pub mod monitor;
pub mod principal;
pub mod refresh;
pub mod session;
pub mod store;
pub mod terminator;

#[cfg(test)]
pub(crate) mod test_support;

pub use authorizer::RequestAuthorizer;
pub use backend::{CredentialBackend, FileBackend, KeyringBackend, MemoryBackend};
pub use credential::Credential;
pub use endpoints::{AuthApi, LoginRequest};
pub use error::{AuthError, DecodeError, RefreshError};
pub use guard::{CapabilityGuard, Navigation, Redirect, Route, RouteAccess};
pub use lifecycle::{LifecycleState, EXPIRY_THRESHOLD_MS};
pub use monitor::{ExpiryMonitor, MonitorOutcome, ReauthPrompt};
pub use principal::{Capability, CapabilitySet, Principal};
pub use refresh::RefreshCoordinator;
pub use session::Session;
pub use store::CredentialStore;
pub use terminator::{SessionEvent, SessionTerminator, TerminationReason};
