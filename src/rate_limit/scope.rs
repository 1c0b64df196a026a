//! Scope identifiers and request targets.

use std::fmt;

use url::Url;

use crate::priority::Priority;

/// Name used for the global scope in statistics and concurrency tables.
pub const GLOBAL_SCOPE: &str = "global";

/// Where a configuration is attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    Global,
    Retailer(String),
    Domain(String),
}

impl ScopeKey {
    pub fn retailer(name: impl Into<String>) -> Self {
        ScopeKey::Retailer(name.into())
    }

    pub fn domain(name: impl Into<String>) -> Self {
        ScopeKey::Domain(name.into())
    }

    /// Identifier used for bookkeeping.
    pub fn name(&self) -> &str {
        match self {
            ScopeKey::Global => GLOBAL_SCOPE,
            ScopeKey::Retailer(name) | ScopeKey::Domain(name) => name,
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Global => f.write_str(GLOBAL_SCOPE),
            ScopeKey::Retailer(name) => write!(f, "retailer:{}", name),
            ScopeKey::Domain(name) => write!(f, "domain:{}", name),
        }
    }
}

/// The retailer and/or domain an outbound request is aimed at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestTarget {
    pub retailer: Option<String>,
    pub domain: Option<String>,
    pub priority: Priority,
}

impl RequestTarget {
    /// Target with neither retailer nor domain; uses the global scope.
    pub fn global() -> Self {
        Self::default()
    }

    pub fn retailer(name: impl Into<String>) -> Self {
        Self {
            retailer: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn domain(name: impl Into<String>) -> Self {
        Self {
            domain: Some(name.into()),
            ..Default::default()
        }
    }

    /// Target the host of a request URL. Returns `None` for URLs without a host.
    pub fn from_url(url: &str) -> Option<Self> {
        Self::extract_domain(url).map(Self::domain)
    }

    /// Extract the host from a URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_ascii_lowercase()))
    }

    pub fn with_retailer(mut self, name: impl Into<String>) -> Self {
        self.retailer = Some(name.into());
        self
    }

    pub fn with_domain(mut self, name: impl Into<String>) -> Self {
        self.domain = Some(name.into());
        self
    }

    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }
}
