// src/models/mod.rs

//! Domain models for the crawler.
//!
//! This module contains the data structures shared by fetchers, the
//! orchestrator and the aggregator.

mod config;
mod posting;
mod search;

// Re-export all public types
pub use config::{
    CacheConfig, Config, CrawlerConfig, HealthConfig, HtmlSelectors, JsonFields, ProxyConfig,
    ProxySourceConfig, SchedulerConfig, SourceConfig, SourceKind,
};
pub use posting::RawPosting;
pub use search::{ExecutionStats, FetcherStats, SearchRequest, SearchResult};
