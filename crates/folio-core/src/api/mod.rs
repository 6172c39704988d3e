//! REST API plumbing for the folio backend.
//!
//! This module provides:
//! - `Transport`: the seam every outgoing request passes through, with
//!   `HttpTransport` as the `reqwest` implementation
//! - `ApiClient`: typed JSON helpers on top of the request authorizer,
//!   including rate-limit backoff
//!
//! Authenticated calls carry a JWT bearer token obtained from `/auth/login`
//! and renewed through `/auth/refresh-token`.

pub mod client;
pub mod error;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use transport::{ApiRequest, ApiResponse, AuthRequirement, HttpTransport, Transport, TransportError};
