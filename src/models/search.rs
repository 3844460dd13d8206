//! Search request and result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, FetchErrorKind, Result};
use crate::models::RawPosting;

/// A search submitted by a caller. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub keyword: String,

    #[serde(default)]
    pub location: String,

    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Restrict the search to these fetcher names
    #[serde(default)]
    pub sources: Option<Vec<String>>,

    /// Post-filter on experience level keywords
    #[serde(default)]
    pub experience_level: Option<String>,
}

fn default_limit() -> usize {
    25
}

impl SearchRequest {
    pub fn new(keyword: impl Into<String>, location: impl Into<String>, limit: usize) -> Self {
        Self {
            keyword: keyword.into(),
            location: location.into(),
            limit,
            sources: None,
            experience_level: None,
        }
    }

    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_experience_level(mut self, level: impl Into<String>) -> Self {
        self.experience_level = Some(level.into());
        self
    }

    /// Reject requests that cannot produce a meaningful search.
    pub fn validate(&self) -> Result<()> {
        if self.keyword.trim().is_empty() {
            return Err(AppError::validation("keyword is empty"));
        }
        Ok(())
    }

    /// Whether the caller asked for this fetcher (no subset means all).
    pub fn wants_source(&self, name: &str) -> bool {
        match &self.sources {
            Some(sources) if !sources.is_empty() => {
                sources.iter().any(|s| s.trim().eq_ignore_ascii_case(name))
            }
            _ => true,
        }
    }
}

/// Diagnostics for one fetcher in one search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetcherStats {
    pub name: String,
    pub priority: u32,
    pub attempted: bool,
    pub succeeded: bool,
    pub attempts: u32,
    pub items: usize,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FetchErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Proxy ids used, in attempt order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proxies: Vec<String>,
}

impl FetcherStats {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            ..Self::default()
        }
    }
}

/// Aggregate statistics for a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub fetchers_attempted: usize,
    pub fetchers_succeeded: usize,
    pub total_raw_before_dedup: usize,
    pub duplicates_removed: usize,
    pub filtered_out: usize,
    pub total_returned: usize,
    /// Batch deadline was hit before every unit finished
    pub deadline_hit: bool,
    /// Served from the recent-search cache
    #[serde(default)]
    pub cached: bool,
    pub fetchers: Vec<FetcherStats>,
}

/// Deduplicated postings plus execution statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub jobs: Vec<RawPosting>,
    pub stats: ExecutionStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let req: SearchRequest = serde_json::from_str(r#"{"keyword":"rust"}"#).unwrap();
        assert_eq!(req.limit, 25);
        assert_eq!(req.location, "");
        assert!(req.sources.is_none());
    }

    #[test]
    fn wants_source_is_case_insensitive() {
        let req = SearchRequest::new("rust", "Remote", 10).with_sources(["Indeed", " board "]);
        assert!(req.wants_source("indeed"));
        assert!(req.wants_source("BOARD"));
        assert!(!req.wants_source("other"));
    }

    #[test]
    fn empty_source_subset_means_all() {
        let req = SearchRequest::new("rust", "Remote", 10).with_sources(Vec::<String>::new());
        assert!(req.wants_source("anything"));
    }

    #[test]
    fn validate_rejects_blank_keyword() {
        assert!(SearchRequest::new("  ", "Remote", 10).validate().is_err());
        assert!(SearchRequest::new("rust", "", 10).validate().is_ok());
    }
}
