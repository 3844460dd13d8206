// src/proxy/health.rs

//! Background proxy health checking.
//!
//! Every pass probes a random sample of known-good endpoints through each
//! identity that is not cooling down. A majority of passing probes counts as
//! a success for the identity, anything less as a failure; the pool then
//! retires or reinstates it through the usual counters.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use tokio::task::JoinHandle;

use super::{ProxyIdentity, ProxyPool};
use crate::models::{CrawlerConfig, HealthConfig};
use crate::utils::http::create_client_with_timeout;

/// Identities probed concurrently within one pass.
const PROBE_CONCURRENCY: usize = 8;

/// Checks one endpoint through one identity.
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    /// Returns the round-trip time when the endpoint answered acceptably.
    async fn probe(
        &self,
        proxy: &ProxyIdentity,
        endpoint: &str,
    ) -> std::result::Result<Duration, String>;
}

/// Probe that issues a GET through the proxy with reqwest.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    crawler: CrawlerConfig,
    timeout: Duration,
    accepted_statuses: Vec<u16>,
}

impl HttpProbe {
    pub fn new(crawler: CrawlerConfig, health: &HealthConfig) -> Self {
        Self {
            crawler,
            timeout: health.probe_timeout(),
            accepted_statuses: health.accepted_statuses.clone(),
        }
    }
}

#[async_trait]
impl ProxyProbe for HttpProbe {
    async fn probe(
        &self,
        proxy: &ProxyIdentity,
        endpoint: &str,
    ) -> std::result::Result<Duration, String> {
        let client = create_client_with_timeout(&self.crawler, Some(proxy), self.timeout)
            .map_err(|e| e.to_string())?;
        let started = Instant::now();
        let response = client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        if self.accepted_statuses.contains(&status) {
            Ok(started.elapsed())
        } else {
            Err(format!("{endpoint} answered HTTP {status}"))
        }
    }
}

/// Outcome of one health-check pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub probed: usize,
    pub passed: usize,
    pub failed: usize,
    pub retired: usize,
    pub reinstated: usize,
    /// Failed-set entries dropped after their cool-down
    pub pruned: usize,
}

/// Periodically probes the pool's identities.
pub struct HealthChecker {
    pool: Arc<ProxyPool>,
    probe: Arc<dyn ProxyProbe>,
    config: HealthConfig,
}

impl HealthChecker {
    pub fn new(pool: Arc<ProxyPool>, probe: Arc<dyn ProxyProbe>, config: HealthConfig) -> Self {
        Self {
            pool,
            probe,
            config,
        }
    }

    /// Health checker probing over HTTP with the configured client settings.
    pub fn with_http_probe(
        pool: Arc<ProxyPool>,
        crawler: &CrawlerConfig,
        config: &HealthConfig,
    ) -> Self {
        let probe = HttpProbe::new(crawler.clone(), config);
        Self::new(pool, Arc::new(probe), config.clone())
    }

    /// Run a single pass over the pool.
    pub async fn run_once(&self) -> HealthReport {
        let mut report = HealthReport {
            pruned: self.pool.prune_failed(),
            ..HealthReport::default()
        };

        let targets = self.pool.probe_targets();
        if targets.is_empty() || self.config.endpoints.is_empty() {
            return report;
        }

        let outcomes: Vec<(ProxyIdentity, std::result::Result<Duration, String>)> =
            stream::iter(targets)
                .map(|target| async move {
                    let outcome = self.check_identity(&target).await;
                    (target, outcome)
                })
                .buffer_unordered(PROBE_CONCURRENCY)
                .collect()
                .await;

        for (before, outcome) in outcomes {
            let id = before.id();
            report.probed += 1;
            if outcome.is_ok() {
                report.passed += 1;
            } else {
                report.failed += 1;
            }
            self.pool.record_probe(&id, outcome);

            if let Some(after) = self.pool.get(&id) {
                match (before.active, after.active) {
                    (true, false) => report.retired += 1,
                    (false, true) => report.reinstated += 1,
                    _ => {}
                }
            }
        }

        log::info!(
            "Proxy health check: {} probed, {} passed, {} retired, {} reinstated, {} pruned",
            report.probed,
            report.passed,
            report.retired,
            report.reinstated,
            report.pruned
        );
        report
    }

    /// Probe a sample of endpoints; a majority must pass.
    async fn check_identity(&self, proxy: &ProxyIdentity) -> std::result::Result<Duration, String> {
        let sample: Vec<String> = {
            let mut rng = rand::thread_rng();
            self.config
                .endpoints
                .choose_multiple(&mut rng, self.config.sample_size.max(1))
                .cloned()
                .collect()
        };

        let timeout = self.config.probe_timeout();
        let mut passed = Vec::new();
        let mut last_error = String::new();
        for endpoint in &sample {
            match tokio::time::timeout(timeout, self.probe.probe(proxy, endpoint)).await {
                Ok(Ok(elapsed)) => passed.push(elapsed),
                Ok(Err(e)) => last_error = e,
                Err(_) => last_error = format!("{endpoint} timed out after {timeout:?}"),
            }
        }

        if !passed.is_empty() && passed.len() * 2 >= sample.len() {
            let total: Duration = passed.iter().sum();
            Ok(total / passed.len() as u32)
        } else {
            Err(last_error)
        }
    }

    /// Start the periodic loop. The first pass runs immediately.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
