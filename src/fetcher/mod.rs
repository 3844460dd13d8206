//! The contract every source integration implements, plus the registry that
//! tracks registered fetchers and their health.

mod registry;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::models::RawPosting;
use crate::proxy::ProxyIdentity;

pub use registry::{DEFAULT_STATUS_COOLDOWN, FetcherRegistry};

/// How a fetcher reaches its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    PageFetch,
    ApiFetch,
    BrowserAutomation,
    Fallback,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Capability::PageFetch => "page-fetch",
            Capability::ApiFetch => "api-fetch",
            Capability::BrowserAutomation => "browser-automation",
            Capability::Fallback => "fallback",
        };
        f.write_str(tag)
    }
}

/// Availability of a registered fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetcherStatus {
    Active,
    RateLimited,
    Blocked,
    Error,
    Disabled,
    /// Abandoned at the batch deadline
    Timeout,
}

impl FetcherStatus {
    /// Whether `select_for` may hand the fetcher out.
    pub fn is_selectable(self) -> bool {
        matches!(self, FetcherStatus::Active | FetcherStatus::RateLimited)
    }

    /// Statuses that fall back to `Active` after the cool-down.
    pub fn recovers(self) -> bool {
        matches!(
            self,
            FetcherStatus::Error | FetcherStatus::Blocked | FetcherStatus::Timeout
        )
    }
}

impl From<&FetchError> for FetcherStatus {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::Blocked(_) => FetcherStatus::Blocked,
            FetchError::RateLimited(_) => FetcherStatus::RateLimited,
            FetchError::Timeout(_) => FetcherStatus::Timeout,
            FetchError::ParseFailure(_) | FetchError::Unavailable(_) => FetcherStatus::Error,
        }
    }
}

impl fmt::Display for FetcherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FetcherStatus::Active => "active",
            FetcherStatus::RateLimited => "rate-limited",
            FetcherStatus::Blocked => "blocked",
            FetcherStatus::Error => "error",
            FetcherStatus::Disabled => "disabled",
            FetcherStatus::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// Registry-side view of a fetcher: identity, priority, status, counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetcherDescriptor {
    pub name: String,
    pub capability: Capability,
    /// Lower runs first and wins dedup ties
    pub priority: u32,
    pub status: FetcherStatus,
    pub successes: u64,
    pub errors: u64,
    pub items_produced: u64,
    pub last_error: Option<String>,
    pub status_changed_at: DateTime<Utc>,
}

/// A pluggable source of postings.
///
/// Implementations report failures through [`FetchError`] and leave block
/// detection to [`crate::utils::block`] or their own heuristics.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Unique name, also used as the `source` of emitted postings.
    fn name(&self) -> &str;

    fn capability(&self) -> Capability;

    /// Whether this source can search `location`.
    fn supports_location(&self, _location: &str) -> bool {
        true
    }

    /// Whether the fetcher wants a proxy from the pool.
    fn needs_proxy(&self) -> bool {
        true
    }

    /// Retrieve up to `limit` postings, egressing through `proxy` if given.
    async fn fetch(
        &self,
        keyword: &str,
        location: &str,
        limit: usize,
        proxy: Option<&ProxyIdentity>,
    ) -> Result<Vec<RawPosting>, FetchError>;

    /// Resource-release hook called on deregistration.
    async fn release(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_statuses() {
        assert_eq!(
            FetcherStatus::from(&FetchError::blocked("403")),
            FetcherStatus::Blocked
        );
        assert_eq!(
            FetcherStatus::from(&FetchError::rate_limited("429")),
            FetcherStatus::RateLimited
        );
        assert_eq!(
            FetcherStatus::from(&FetchError::timeout("60s")),
            FetcherStatus::Timeout
        );
        assert_eq!(
            FetcherStatus::from(&FetchError::parse("bad html")),
            FetcherStatus::Error
        );
    }

    #[test]
    fn only_active_and_rate_limited_are_selectable() {
        assert!(FetcherStatus::Active.is_selectable());
        assert!(FetcherStatus::RateLimited.is_selectable());
        assert!(!FetcherStatus::Blocked.is_selectable());
        assert!(!FetcherStatus::Disabled.is_selectable());
        assert!(!FetcherStatus::Timeout.is_selectable());
    }

    #[test]
    fn capability_tags() {
        assert_eq!(Capability::PageFetch.to_string(), "page-fetch");
        assert_eq!(
            serde_json::to_string(&Capability::BrowserAutomation).unwrap(),
            "\"browser-automation\""
        );
    }
}
