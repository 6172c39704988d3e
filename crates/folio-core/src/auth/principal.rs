//! The authenticated identity and what it may do.
//!
//! Capabilities are a closed set: the `permissions` claim of an access token
//! is parsed into [`Capability`] values and anything unrecognised is dropped,
//! so a misspelt tag can never satisfy a route requirement.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::lifecycle::Claims;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum Capability {
    ViewPortfolio,
    ManagePortfolio,
    ViewPricing,
    ManagePricing,
    ViewReports,
    ManageUsers,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::ViewPortfolio,
        Capability::ManagePortfolio,
        Capability::ViewPricing,
        Capability::ManagePricing,
        Capability::ViewReports,
        Capability::ManageUsers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ViewPortfolio => "view_portfolio",
            Capability::ManagePortfolio => "manage_portfolio",
            Capability::ViewPricing => "view_pricing",
            Capability::ManagePricing => "manage_pricing",
            Capability::ViewReports => "view_reports",
            Capability::ManageUsers => "manage_users",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCapability(pub String);

impl fmt::Display for UnknownCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown capability '{}'", self.0)
    }
}

impl std::error::Error for UnknownCapability {}

impl FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

/// A set of capabilities. Used both for what a principal holds and for what a
/// route requires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when every capability in `self` is also in `other`
    pub fn is_subset(&self, other: &CapabilitySet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Parse tags from a token, keeping only known capabilities
    pub fn from_tags<S: AsRef<str>>(tags: &[S]) -> Self {
        let mut set = Self::new();
        for tag in tags {
            match tag.as_ref().parse::<Capability>() {
                Ok(capability) => {
                    set.insert(capability);
                }
                Err(e) => debug!(error = %e, "Ignoring permission tag"),
            }
        }
        set
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Capability; N]> for CapabilitySet {
    fn from(capabilities: [Capability; N]) -> Self {
        capabilities.into_iter().collect()
    }
}

/// Who the access token says the caller is. Always derived from the token
/// currently in the store, never kept across a token replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub role: Option<String>,
    pub capabilities: CapabilitySet,
}

impl Principal {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            subject: claims.sub.clone().unwrap_or_default(),
            role: claims.role.clone(),
            capabilities: CapabilitySet::from_tags(&claims.permissions),
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }
}
