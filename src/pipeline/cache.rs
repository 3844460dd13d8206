// src/pipeline/cache.rs

//! Bounded, TTL-evicting cache of recent search results.

use std::time::Duration;

use moka::sync::Cache;

use crate::models::{CacheConfig, SearchRequest, SearchResult};

/// Normalised form of a request used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    keyword: String,
    location: String,
    limit: usize,
    sources: Vec<String>,
    experience_level: String,
}

impl From<&SearchRequest> for CacheKey {
    fn from(request: &SearchRequest) -> Self {
        let mut sources: Vec<String> = request
            .sources
            .iter()
            .flatten()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        sources.sort();
        sources.dedup();

        Self {
            keyword: normalize(&request.keyword),
            location: normalize(&request.location),
            limit: request.limit,
            sources,
            experience_level: request
                .experience_level
                .as_deref()
                .map(normalize)
                .unwrap_or_default(),
        }
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Recent-search cache, constructed once per process and shared by reference.
#[derive(Clone)]
pub struct SearchCache {
    inner: Cache<CacheKey, SearchResult>,
}

impl SearchCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// `None` when caching is disabled.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.max_entries, Duration::from_secs(config.ttl_secs)))
    }

    /// Cached result for an equivalent request, flagged as cached.
    pub fn get(&self, request: &SearchRequest) -> Option<SearchResult> {
        self.inner.get(&CacheKey::from(request)).map(|mut result| {
            result.stats.cached = true;
            result
        })
    }

    pub fn insert(&self, request: &SearchRequest, result: SearchResult) {
        self.inner.insert(CacheKey::from(request), result);
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{ExecutionStats, RawPosting};

    fn result() -> SearchResult {
        SearchResult {
            jobs: vec![RawPosting::new("Rust Dev", "Acme", "a", "https://a.com/1")],
            stats: ExecutionStats {
                started_at: Utc::now(),
                duration_ms: 10,
                fetchers_attempted: 1,
                fetchers_succeeded: 1,
                total_raw_before_dedup: 1,
                duplicates_removed: 0,
                filtered_out: 0,
                total_returned: 1,
                deadline_hit: false,
                cached: false,
                fetchers: Vec::new(),
            },
        }
    }

    #[test]
    fn equivalent_requests_share_an_entry() {
        let cache = SearchCache::new(16, Duration::from_secs(60));
        let stored = SearchRequest::new("Rust  Developer", "Remote", 10).with_sources(["b", "A"]);
        cache.insert(&stored, result());

        let lookup = SearchRequest::new("rust developer", " remote ", 10).with_sources(["a", "B", "a"]);
        let hit = cache.get(&lookup).unwrap();
        assert!(hit.stats.cached);
        assert_eq!(hit.jobs.len(), 1);

        assert!(cache.get(&SearchRequest::new("rust developer", "remote", 11)).is_none());
    }

    #[test]
    fn invalidate_all_clears() {
        let cache = SearchCache::new(16, Duration::from_secs(60));
        let request = SearchRequest::new("rust", "", 5);
        cache.insert(&request, result());
        cache.invalidate_all();
        assert!(cache.get(&request).is_none());
    }

    #[test]
    fn disabled_config_builds_nothing() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        assert!(SearchCache::from_config(&config).is_none());
    }
}
