// src/api.rs

//! Search API consumed by callers such as the CLI or a dashboard.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ExecutionStats, RawPosting, SearchRequest, SearchResult};
use crate::pipeline::{Orchestrator, SearchCache, aggregate};

/// Response body of a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub jobs: Vec<RawPosting>,
    pub total_jobs: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_stats: Option<ExecutionStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<SearchResult> for SearchResponse {
    fn from(result: SearchResult) -> Self {
        Self {
            success: true,
            total_jobs: result.jobs.len(),
            jobs: result.jobs,
            execution_stats: Some(result.stats),
            error: None,
        }
    }
}

impl SearchResponse {
    pub fn failure(error: impl ToString) -> Self {
        Self {
            success: false,
            jobs: Vec::new(),
            total_jobs: 0,
            execution_stats: None,
            error: Some(error.to_string()),
        }
    }
}

/// Runs searches through the orchestrator, aggregator and cache.
pub struct SearchService {
    orchestrator: Arc<Orchestrator>,
    cache: Option<SearchCache>,
}

impl SearchService {
    pub fn new(orchestrator: Arc<Orchestrator>, cache: Option<SearchCache>) -> Self {
        Self {
            orchestrator,
            cache,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Run a search. Only an invalid request or `NoEligibleFetchers` fails;
    /// per-fetcher failures are reported in the execution stats.
    pub async fn search_result(&self, request: &SearchRequest) -> Result<SearchResult> {
        request.validate()?;

        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(request)) {
            log::info!("Cache hit for '{}' in '{}'", request.keyword, request.location);
            return Ok(hit);
        }

        let outcome = self.orchestrator.run(request).await?;
        let result = aggregate(request, outcome);

        // Only complete results are cached.
        if let Some(cache) = &self.cache {
            if !result.stats.deadline_hit && result.stats.fetchers_succeeded > 0 {
                cache.insert(request, result.clone());
            }
        }
        Ok(result)
    }

    /// Run a search and shape the outcome as a [`SearchResponse`].
    pub async fn search(&self, request: SearchRequest) -> SearchResponse {
        match self.search_result(&request).await {
            Ok(result) => result.into(),
            Err(e) => {
                log::error!("Search for '{}' failed: {}", request.keyword, e);
                SearchResponse::failure(e)
            }
        }
    }
}
