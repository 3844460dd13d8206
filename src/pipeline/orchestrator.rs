// src/pipeline/orchestrator.rs

//! Concurrent fetcher scheduling.
//!
//! Every eligible fetcher runs as an independent unit of work on a bounded
//! worker pool. A unit owns its own counters and proxy history; results are
//! published to the registry only after the batch barrier. The batch deadline
//! is a hard ceiling: units still running when it passes are aborted and
//! reported as timed out.

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::retry::Backoff;
use crate::error::{AppError, FetchError, Result};
use crate::fetcher::{Fetcher, FetcherRegistry};
use crate::models::{FetcherStats, RawPosting, SchedulerConfig, SearchRequest};
use crate::proxy::{AcquireConstraints, ProxyIdentity, ProxyPool, ProxyStrategy};

/// Scheduling parameters.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_workers: usize,
    pub batch_timeout: Duration,
    pub fetch_timeout: Duration,
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub proxy_strategy: ProxyStrategy,
    pub require_proxy: bool,
}

impl From<&SchedulerConfig> for OrchestratorSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_workers: config.max_workers.max(1),
            batch_timeout: config.batch_timeout(),
            fetch_timeout: config.fetch_timeout(),
            max_attempts: config.max_attempts.max(1),
            backoff: Backoff::from_config(config),
            proxy_strategy: config.proxy_strategy,
            require_proxy: config.require_proxy,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

/// Outcome of one unit of work.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub stats: FetcherStats,
    /// Empty unless the unit succeeded
    pub postings: Vec<RawPosting>,
    pub error: Option<FetchError>,
}

impl UnitReport {
    fn failed(mut stats: FetcherStats, error: FetchError, via: Option<&str>) -> Self {
        stats.succeeded = false;
        stats.items = 0;
        stats.error_kind = Some(error.kind());
        stats.error = Some(match via {
            Some(proxy) => format!("{error} (via {proxy})"),
            None => error.to_string(),
        });
        Self {
            stats,
            postings: Vec::new(),
            error: Some(error),
        }
    }
}

/// Everything that completed before the barrier, in (priority, name) order.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub reports: Vec<UnitReport>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub deadline_hit: bool,
}

/// Runs eligible fetchers concurrently with retries and proxy rotation.
pub struct Orchestrator {
    registry: Arc<FetcherRegistry>,
    pool: Arc<ProxyPool>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<FetcherRegistry>,
        pool: Arc<ProxyPool>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            registry,
            pool,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<FetcherRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run every eligible fetcher for `request` and wait for all of them or
    /// the batch deadline, whichever comes first.
    pub async fn run(&self, request: &SearchRequest) -> Result<BatchOutcome> {
        let selected = self.registry.select_for(request);
        if selected.is_empty() {
            return Err(AppError::NoEligibleFetchers {
                keyword: request.keyword.clone(),
                location: request.location.clone(),
            });
        }

        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.settings.batch_timeout;
        let semaphore = Arc::new(Semaphore::new(self.settings.max_workers));
        let request = Arc::new(request.clone());

        log::info!(
            "Dispatching {} fetcher(s) for '{}' in '{}' ({} workers)",
            selected.len(),
            request.keyword,
            request.location,
            self.settings.max_workers
        );

        let mut pending: BTreeMap<String, u32> = BTreeMap::new();
        let mut units = JoinSet::new();
        for (fetcher, descriptor) in selected {
            pending.insert(descriptor.name.clone(), descriptor.priority);
            let unit = Unit {
                fetcher,
                priority: descriptor.priority,
                request: Arc::clone(&request),
                pool: Arc::clone(&self.pool),
                settings: self.settings.clone(),
            };
            let semaphore = Arc::clone(&semaphore);
            units.spawn(async move {
                match semaphore.acquire_owned().await {
                    Ok(_permit) => unit.run().await,
                    Err(_) => unit.abandoned(FetchError::unavailable("worker pool closed")),
                }
            });
        }

        let mut reports = Vec::with_capacity(pending.len());
        let mut deadline_hit = false;
        loop {
            match tokio::time::timeout_at(deadline, units.join_next()).await {
                Ok(Some(Ok(report))) => {
                    pending.remove(&report.stats.name);
                    reports.push(report);
                }
                Ok(Some(Err(e))) => log::error!("Worker task failed: {}", e),
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    units.abort_all();
                    break;
                }
            }
        }

        self.publish(&reports);

        for (name, priority) in pending {
            let mut stats = FetcherStats::new(&name, priority);
            stats.attempted = true;
            stats.duration_ms = started.elapsed().as_millis() as u64;
            let error = if deadline_hit {
                log::warn!("{}: abandoned at batch deadline", name);
                self.registry
                    .record_timeout(&name, self.settings.batch_timeout)
            } else {
                let error = FetchError::unavailable("worker task failed");
                self.registry.record_failure(&name, &error);
                error
            };
            reports.push(UnitReport::failed(stats, error, None));
        }
        reports.sort_by(|a, b| {
            a.stats
                .priority
                .cmp(&b.stats.priority)
                .then_with(|| a.stats.name.cmp(&b.stats.name))
        });

        Ok(BatchOutcome {
            reports,
            started_at,
            duration: started.elapsed(),
            deadline_hit,
        })
    }

    /// Push completed units' results into the registry's descriptors.
    fn publish(&self, reports: &[UnitReport]) {
        for report in reports {
            match &report.error {
                None => self
                    .registry
                    .record_success(&report.stats.name, report.postings.len()),
                Some(err) => self.registry.record_failure(&report.stats.name, err),
            }
        }
    }
}

/// One fetcher's unit of work.
struct Unit {
    fetcher: Arc<dyn Fetcher>,
    priority: u32,
    request: Arc<SearchRequest>,
    pool: Arc<ProxyPool>,
    settings: OrchestratorSettings,
}

impl Unit {
    fn stats(&self) -> FetcherStats {
        let mut stats = FetcherStats::new(self.fetcher.name(), self.priority);
        stats.attempted = true;
        stats
    }

    fn abandoned(&self, error: FetchError) -> UnitReport {
        UnitReport::failed(self.stats(), error, None)
    }

    async fn run(self) -> UnitReport {
        let name = self.fetcher.name().to_string();
        let mut stats = self.stats();
        let started = Instant::now();
        let max_attempts = self.settings.max_attempts;
        let mut tried: HashSet<String> = HashSet::new();
        let mut last_error = FetchError::unavailable("no attempt made");
        let mut last_proxy: Option<String> = None;

        for attempt in 1..=max_attempts {
            stats.attempts = attempt;

            let proxy = if self.fetcher.needs_proxy() {
                self.acquire_proxy(&tried)
            } else {
                None
            };
            if self.fetcher.needs_proxy() && proxy.is_none() && self.settings.require_proxy {
                last_error = FetchError::unavailable("no active proxy available");
                break;
            }
            if let Some(p) = &proxy {
                tried.insert(p.id());
                stats.proxies.push(p.id());
            }
            last_proxy = proxy.as_ref().map(ProxyIdentity::id);

            let attempt_started = Instant::now();
            match self.attempt(proxy.as_ref()).await {
                Ok(postings) => {
                    if let Some(p) = &proxy {
                        self.pool.mark_success(&p.id(), attempt_started.elapsed());
                    }
                    stats.succeeded = true;
                    stats.items = postings.len();
                    stats.duration_ms = started.elapsed().as_millis() as u64;
                    log::info!(
                        "{}: {} posting(s) on attempt {}/{}",
                        name,
                        postings.len(),
                        attempt,
                        max_attempts
                    );
                    return UnitReport {
                        stats,
                        postings,
                        error: None,
                    };
                }
                Err(err) => {
                    let via = last_proxy.as_deref().unwrap_or("direct");
                    log::warn!(
                        "{}: attempt {}/{} via {} failed: {}",
                        name,
                        attempt,
                        max_attempts,
                        via,
                        err
                    );
                    if err.is_retryable() {
                        if let Some(p) = &proxy {
                            self.pool.mark_failure(&p.id());
                        }
                    }
                    let retry = err.is_retryable() && attempt < max_attempts;
                    last_error = err;
                    if !retry {
                        break;
                    }
                    let delay = self.settings.backoff.delay(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        UnitReport::failed(stats, last_error, last_proxy.as_deref())
    }

    /// Draw an identity not yet tried by this unit. When every active
    /// identity has been tried, reuse the best available one.
    fn acquire_proxy(&self, tried: &HashSet<String>) -> Option<ProxyIdentity> {
        let strategy = self.settings.proxy_strategy;
        let mut constraints = AcquireConstraints::for_location(&self.request.location);
        constraints.exclude = tried.clone();
        self.pool.acquire(strategy, &constraints).or_else(|| {
            if tried.is_empty() {
                None
            } else {
                self.pool
                    .acquire(strategy, &AcquireConstraints::for_location(&self.request.location))
            }
        })
    }

    /// One fetch under the per-attempt timeout. Panics become `Unavailable`.
    async fn attempt(
        &self,
        proxy: Option<&ProxyIdentity>,
    ) -> std::result::Result<Vec<RawPosting>, FetchError> {
        let request = &self.request;
        let fetch = self
            .fetcher
            .fetch(&request.keyword, &request.location, request.limit, proxy);
        let timeout = self.settings.fetch_timeout;

        match AssertUnwindSafe(tokio::time::timeout(timeout, fetch))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(FetchError::timeout(format!("no response within {timeout:?}"))),
            Err(panic) => Err(FetchError::unavailable(format!(
                "fetcher panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
