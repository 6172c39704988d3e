//! Core library for folio - session and authorization for the investment tracker client.
//!
//! This crate decides, for every outgoing API call and every protected
//! navigation, whether the caller holds a usable credential. It contains:
//! - `auth`: credential storage, token lifecycle, single-flight refresh,
//!   request authorization, route guards, and session termination
//! - `api`: the transport seam, the `reqwest` transport, and a typed client
//! - `config`: application configuration
//! - `clock`: the time source used for expiry decisions

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;

pub use api::{ApiClient, ApiError, ApiRequest, ApiResponse, HttpTransport, Transport, TransportError};
pub use auth::{
    AuthError, Capability, CapabilityGuard, CapabilitySet, Credential, CredentialStore,
    LifecycleState, Navigation, Principal, RequestAuthorizer, Route, RouteAccess, Session,
    SessionEvent, TerminationReason,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
