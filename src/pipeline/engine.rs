// src/pipeline/engine.rs

//! Process-wide wiring of registry, proxy pool, health checker,
//! orchestrator, cache and search service.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::{Orchestrator, OrchestratorSettings, SearchCache};
use crate::api::SearchService;
use crate::error::Result;
use crate::fetcher::FetcherRegistry;
use crate::models::Config;
use crate::proxy::{HealthChecker, ProxyPool, ProxyProbe, ProxySource, StaticProxySource};
use crate::services;

/// Everything a search needs, built once at process start.
pub struct Engine {
    config: Arc<Config>,
    registry: Arc<FetcherRegistry>,
    pool: Arc<ProxyPool>,
    proxy_sources: Vec<Arc<dyn ProxySource>>,
    health: Arc<HealthChecker>,
    health_task: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
    service: SearchService,
}

impl Engine {
    /// Validate the configuration, register the configured sources and load
    /// the static proxy lists.
    pub async fn from_config(config: Arc<Config>) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(
            FetcherRegistry::new().with_status_cooldown(config.scheduler.status_cooldown()),
        );
        let registered = services::register_all(&registry, &config)?;

        let pool = Arc::new(ProxyPool::from_config(&config.proxy));
        let proxy_sources = config
            .proxy
            .sources
            .iter()
            .map(|source| {
                StaticProxySource::from_config(source)
                    .map(|s| Arc::new(s) as Arc<dyn ProxySource>)
            })
            .collect::<Result<Vec<_>>>()?;
        pool.refresh(&proxy_sources).await;

        let health = Arc::new(HealthChecker::with_http_probe(
            Arc::clone(&pool),
            &config.crawler,
            &config.health,
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&pool),
            OrchestratorSettings::from(&config.scheduler),
        ));
        let service = SearchService::new(orchestrator, SearchCache::from_config(&config.cache));

        log::info!(
            "Engine ready: {} fetcher(s), {} proxy identities",
            registered,
            pool.len()
        );

        Ok(Self {
            config,
            registry,
            pool,
            proxy_sources,
            health,
            health_task: Mutex::new(None),
            shut_down: AtomicBool::new(false),
            service,
        })
    }

    /// Replace the HTTP health probe, e.g. with a source-specific check.
    pub fn with_health_probe(mut self, probe: Arc<dyn ProxyProbe>) -> Self {
        self.health = Arc::new(HealthChecker::new(
            Arc::clone(&self.pool),
            probe,
            self.config.health.clone(),
        ));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<FetcherRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    pub fn service(&self) -> &SearchService {
        &self.service
    }

    pub fn health_checker(&self) -> &Arc<HealthChecker> {
        &self.health
    }

    /// Pull new identities from the proxy sources.
    pub async fn refresh_proxies(&self) -> usize {
        self.pool.refresh(&self.proxy_sources).await
    }

    /// Start the background health loop. Returns `false` when health checks
    /// are disabled, the pool is empty, the loop already runs, or the engine
    /// was shut down.
    pub fn start_health_checks(&self) -> bool {
        if !self.config.health.enabled
            || self.pool.is_empty()
            || self.shut_down.load(Ordering::Acquire)
        {
            return false;
        }
        let mut task = self.health_task.lock();
        if task.is_some() {
            return false;
        }
        *task = Some(Arc::clone(&self.health).spawn());
        log::info!(
            "Proxy health checks every {}s",
            self.config.health.interval_secs
        );
        true
    }

    pub fn health_checks_running(&self) -> bool {
        self.health_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop the health loop and release every fetcher.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        let task = self.health_task.lock().take();
        if let Some(task) = task {
            task.abort();
            // Wait for the abort so no pass outlives the engine.
            let _ = task.await;
        }
        let released = self.registry.release_all().await;
        log::info!("Engine shut down, {} fetcher(s) released", released);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::fetcher::FetcherStatus;
    use crate::models::SearchRequest;
    use crate::proxy::ProxyIdentity;

    /// Answers instantly and counts every call.
    #[derive(Default)]
    struct CountingProbe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProxyProbe for CountingProbe {
        async fn probe(
            &self,
            _proxy: &ProxyIdentity,
            _endpoint: &str,
        ) -> std::result::Result<Duration, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Duration::from_millis(50))
        }
    }

    const CONFIG: &str = r#"
        [health]
        enabled = false

        [[proxy.sources]]
        name = "static"
        region = "us"
        urls = ["http://10.0.0.1:8080", "http://10.0.0.2:8080"]

        [[sources]]
        name = "board"
        url = "https://jobs.example.com/search?q={keyword}"
        selectors = { row = "li", title = "a" }
        enabled = false
    "#;

    #[tokio::test]
    async fn wires_sources_and_proxies() {
        let config = Arc::new(Config::from_toml(CONFIG).unwrap());
        let engine = Engine::from_config(config).await.unwrap();
        assert_eq!(engine.pool().len(), 2);
        assert_eq!(engine.pool().groups(), vec!["static"]);
        assert_eq!(
            engine.registry().descriptor("board").unwrap().status,
            FetcherStatus::Disabled
        );
        assert!(!engine.start_health_checks());
        assert_eq!(engine.refresh_proxies().await, 0);
    }

    #[tokio::test]
    async fn disabled_sources_leave_nothing_to_search() {
        let config = Arc::new(Config::from_toml(CONFIG).unwrap());
        let engine = Engine::from_config(config).await.unwrap();
        let response = engine
            .service()
            .search(SearchRequest::new("rust", "Remote", 5))
            .await;
        assert!(!response.success);

        engine.shutdown().await;
        assert!(engine.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn health_loop_runs_until_shutdown() {
        let mut config = Config::from_toml(CONFIG).unwrap();
        config.health.enabled = true;
        config.health.interval_secs = 60;
        config.health.sample_size = 1;
        let probe = Arc::new(CountingProbe::default());
        let engine = Engine::from_config(Arc::new(config))
            .await
            .unwrap()
            .with_health_probe(Arc::clone(&probe) as Arc<dyn ProxyProbe>);

        assert!(engine.start_health_checks());
        assert!(!engine.start_health_checks());
        assert!(engine.health_checks_running());

        // First pass runs immediately, then one per interval.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 6);

        engine.shutdown().await;
        assert!(!engine.health_checks_running());
        assert!(!engine.start_health_checks());
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let mut config = Config::default();
        config.scheduler.max_attempts = 0;
        assert!(Engine::from_config(Arc::new(config)).await.is_err());
    }
}
