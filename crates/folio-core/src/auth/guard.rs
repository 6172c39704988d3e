//! Route guards.
//!
//! The router asks [`CapabilityGuard::activate`] before showing a route. The
//! principal is derived from the store on every call. Denials are uniform: an
//! unauthorized principal is sent to the neutral route and is never told which
//! capability it lacked.

use std::sync::Arc;

use reqwest::Url;
use tracing::debug;

use crate::clock::Clock;
use crate::config::Config;

use super::lifecycle;
use super::{AuthError, CapabilitySet, CredentialStore, Principal, SessionTerminator, TerminationReason};

/// Base used only to borrow `Url`'s query encoding for app-relative paths
const LOCAL_BASE: &str = "http://localhost";

const RETURN_URL_PARAM: &str = "returnUrl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAccess {
    /// Anyone, session untouched
    Public,
    /// Public page that ends any current session (landing, registration)
    SignedOut,
    /// The login page itself
    Login,
    Protected(CapabilitySet),
}

/// A navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub access: RouteAccess,
    /// `returnUrl` carried by the navigation, if any
    pub return_url: Option<String>,
}

impl Route {
    pub fn new(path: impl Into<String>, access: RouteAccess) -> Self {
        Self {
            path: path.into(),
            access,
            return_url: None,
        }
    }

    pub fn public(path: impl Into<String>) -> Self {
        Self::new(path, RouteAccess::Public)
    }

    pub fn signed_out(path: impl Into<String>) -> Self {
        Self::new(path, RouteAccess::SignedOut)
    }

    pub fn login(path: impl Into<String>) -> Self {
        Self::new(path, RouteAccess::Login)
    }

    pub fn protected(path: impl Into<String>, required: impl Into<CapabilitySet>) -> Self {
        Self::new(path, RouteAccess::Protected(required.into()))
    }

    pub fn returning_to(mut self, return_url: impl Into<String>) -> Self {
        self.return_url = Some(return_url.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub path: String,
    pub return_url: Option<String>,
}

impl Redirect {
    fn to(path: &str) -> Self {
        Self {
            path: path.to_string(),
            return_url: None,
        }
    }

    /// Path plus encoded query, e.g. `/login?returnUrl=%2Fholdings`
    pub fn location(&self) -> String {
        let Some(ref return_url) = self.return_url else {
            return self.path.clone();
        };
        let Ok(mut url) = Url::parse(LOCAL_BASE) else {
            return self.path.clone();
        };
        url.query_pairs_mut().append_pair(RETURN_URL_PARAM, return_url);
        format!("{}?{}", self.path, url.query().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Proceed,
    Redirect(Redirect),
}

/// Only app-relative paths are followed after login
fn is_local_path(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.contains('\\')
}

#[derive(Clone)]
pub struct CapabilityGuard {
    store: Arc<CredentialStore>,
    terminator: Arc<SessionTerminator>,
    clock: Arc<dyn Clock>,
    login_path: String,
    denied_path: String,
    home_path: String,
}

impl CapabilityGuard {
    pub fn new(
        store: Arc<CredentialStore>,
        terminator: Arc<SessionTerminator>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            terminator,
            clock,
            login_path: config.login_path.clone(),
            denied_path: config.denied_path.clone(),
            home_path: config.home_path.clone(),
        }
    }

    /// `required ⊆ principal.capabilities`; an empty requirement always passes
    pub fn can_activate(required: &CapabilitySet, principal: &Principal) -> bool {
        required.is_subset(&principal.capabilities)
    }

    /// The principal behind a usable (valid or expiring) access token
    pub fn principal(&self) -> Option<Principal> {
        let credential = self.store.read()?;
        if !lifecycle::classify(&credential, self.clock.now()).is_usable() {
            return None;
        }
        let token = lifecycle::decode(&credential.access_token).ok()?;
        Some(Principal::from_claims(&token.claims))
    }

    /// Check a capability requirement outside of navigation (feature gating)
    pub fn require(&self, required: &CapabilitySet) -> Result<Principal, AuthError> {
        let principal = self.principal().ok_or(AuthError::NotAuthenticated)?;
        if Self::can_activate(required, &principal) {
            Ok(principal)
        } else {
            Err(AuthError::PermissionDenied)
        }
    }

    pub fn activate(&self, route: &Route) -> Navigation {
        match route.access {
            RouteAccess::Public => Navigation::Proceed,
            RouteAccess::SignedOut => {
                self.terminator.terminate(TerminationReason::UserInitiated);
                Navigation::Proceed
            }
            RouteAccess::Login => self.activate_login(route),
            RouteAccess::Protected(ref required) => self.activate_protected(route, required),
        }
    }

    /// Already signed in: skip the login page
    fn activate_login(&self, route: &Route) -> Navigation {
        if self.principal().is_none() {
            return Navigation::Proceed;
        }
        let redirect_to = route
            .return_url
            .as_deref()
            .filter(|url| is_local_path(url))
            .unwrap_or(&self.home_path);
        debug!(redirect_to, "Already authenticated, skipping login");
        Navigation::Redirect(Redirect::to(redirect_to))
    }

    fn activate_protected(&self, route: &Route, required: &CapabilitySet) -> Navigation {
        match self.principal() {
            None => {
                debug!(path = %route.path, "Unauthenticated navigation, redirecting to login");
                Navigation::Redirect(Redirect {
                    path: self.login_path.clone(),
                    return_url: Some(route.path.clone()),
                })
            }
            Some(principal) if Self::can_activate(required, &principal) => Navigation::Proceed,
            Some(_) => {
                debug!(path = %route.path, "Navigation denied");
                Navigation::Redirect(Redirect::to(&self.denied_path))
            }
        }
    }

    /// Where to send the user when a session ends
    pub fn login_redirect(&self, return_url: Option<&str>) -> Redirect {
        Redirect {
            path: self.login_path.clone(),
            return_url: return_url.filter(|url| is_local_path(url)).map(str::to_string),
        }
    }
}
