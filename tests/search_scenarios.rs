//! End-to-end search scenarios with stub fetchers.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use jobcrawl::api::SearchService;
use jobcrawl::error::FetchError;
use jobcrawl::fetcher::{Capability, Fetcher, FetcherRegistry, FetcherStatus};
use jobcrawl::models::{RawPosting, SearchRequest};
use jobcrawl::pipeline::{Backoff, Orchestrator, OrchestratorSettings, SearchCache};
use jobcrawl::proxy::{ProxyIdentity, ProxyPool, ProxyProtocol, ProxyStrategy};

/// Stub source: fails with queued errors first, then returns its postings.
struct StubBoard {
    name: &'static str,
    postings: Vec<RawPosting>,
    failures: Mutex<VecDeque<FetchError>>,
    delay: Duration,
    calls: AtomicUsize,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl StubBoard {
    fn new(name: &'static str, postings: Vec<RawPosting>) -> Self {
        Self {
            name,
            postings,
            failures: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing_first(self, errors: Vec<FetchError>) -> Self {
        *self.failures.lock() = errors.into();
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn sharing_gauge(mut self, running: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> Self {
        self.running = Arc::clone(running);
        self.peak = Arc::clone(peak);
        self
    }
}

#[async_trait]
impl Fetcher for StubBoard {
    fn name(&self) -> &str {
        self.name
    }

    fn capability(&self) -> Capability {
        Capability::PageFetch
    }

    async fn fetch(
        &self,
        _keyword: &str,
        _location: &str,
        limit: usize,
        _proxy: Option<&ProxyIdentity>,
    ) -> Result<Vec<RawPosting>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        Ok(self.postings.iter().take(limit).cloned().collect())
    }
}

fn postings(source: &str, title: &str, urls: &[String]) -> Vec<RawPosting> {
    urls.iter()
        .enumerate()
        .map(|(i, url)| RawPosting::new(format!("{title} {i}"), format!("{source} corp"), source, url))
        .collect()
}

fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        backoff: Backoff::new(Duration::ZERO, Duration::ZERO, 0.0),
        proxy_strategy: ProxyStrategy::RoundRobin,
        ..OrchestratorSettings::default()
    }
}

fn pool(hosts: &[&str]) -> Arc<ProxyPool> {
    let pool = Arc::new(ProxyPool::default());
    for host in hosts {
        pool.add(ProxyIdentity::new(*host, 8080, ProxyProtocol::Http).with_region("us"));
    }
    pool
}

fn service(
    fetchers: Vec<(Arc<dyn Fetcher>, u32)>,
    pool: Arc<ProxyPool>,
    settings: OrchestratorSettings,
    cache: Option<SearchCache>,
) -> SearchService {
    let registry = Arc::new(FetcherRegistry::new());
    for (fetcher, priority) in fetchers {
        registry.register(fetcher, priority);
    }
    SearchService::new(Arc::new(Orchestrator::new(registry, pool, settings)), cache)
}

#[tokio::test]
async fn overlapping_sources_merge_to_limit() {
    let a_urls: Vec<String> = (0..8)
        .map(|i| format!("https://a.example.com/jobs/{i}"))
        .collect();
    let b_urls = vec![
        "https://A.example.com/jobs/1/?utm_source=b".to_string(),
        "https://a.example.com/jobs/4#apply".to_string(),
        "https://a.example.com/jobs/6".to_string(),
        "https://b.example.com/jobs/100".to_string(),
        "https://b.example.com/jobs/101".to_string(),
    ];
    let a: Arc<dyn Fetcher> = Arc::new(StubBoard::new("a", postings("a", "Python Developer", &a_urls)));
    let b: Arc<dyn Fetcher> = Arc::new(StubBoard::new("b", postings("b", "Backend Engineer", &b_urls)));
    let svc = service(vec![(a, 1), (b, 2)], pool(&[]), settings(), None);

    let request = SearchRequest::new("python developer", "Remote", 10).with_sources(["a", "b"]);
    let response = svc.search(request).await;

    assert!(response.success);
    assert_eq!(response.total_jobs, 10);
    let stats = response.execution_stats.unwrap();
    assert_eq!(stats.total_raw_before_dedup, 13);
    assert_eq!(stats.duplicates_removed, 3);
    assert_eq!(stats.fetchers_attempted, 2);
    assert_eq!(stats.fetchers_succeeded, 2);

    let from_a = response.jobs.iter().filter(|j| j.source == "a").count();
    let from_b: Vec<_> = response
        .jobs
        .iter()
        .filter(|j| j.source == "b")
        .map(|j| j.url.as_str())
        .collect();
    assert_eq!(from_a, 8);
    assert_eq!(
        from_b,
        ["https://b.example.com/jobs/100", "https://b.example.com/jobs/101"]
    );

    let urls: HashSet<_> = response.jobs.iter().filter_map(|j| j.url_key()).collect();
    let pairs: HashSet<_> = response.jobs.iter().map(|j| j.title_company_key()).collect();
    assert_eq!(urls.len(), 10);
    assert_eq!(pairs.len(), 10);
}

#[tokio::test]
async fn blocked_attempts_rotate_proxies_until_success() {
    let c = Arc::new(
        StubBoard::new(
            "c",
            postings("c", "Rust Engineer", &["https://c.example.com/1".to_string()]),
        )
        .failing_first(vec![
            FetchError::blocked("HTTP 403"),
            FetchError::blocked("HTTP 403"),
        ]),
    );
    let pool = pool(&["p1", "p2", "p3"]);
    let svc = service(
        vec![(c.clone() as Arc<dyn Fetcher>, 1)],
        Arc::clone(&pool),
        settings(),
        None,
    );

    let response = svc.search(SearchRequest::new("rust", "Remote", 10)).await;
    assert!(response.success);
    assert_eq!(response.total_jobs, 1);

    let stats = response.execution_stats.unwrap();
    let unit = &stats.fetchers[0];
    assert!(unit.succeeded);
    assert_eq!(unit.attempts, 3);
    assert_eq!(unit.proxies.len(), 3);
    let distinct: HashSet<_> = unit.proxies.iter().collect();
    assert_eq!(distinct.len(), 3);

    let registry = svc.orchestrator().registry();
    assert_eq!(registry.descriptor("c").unwrap().status, FetcherStatus::Active);

    for failed in &unit.proxies[..2] {
        let p = pool.get(failed).unwrap();
        assert_eq!((p.failures, p.successes), (1, 0));
    }
    let winner = pool.get(&unit.proxies[2]).unwrap();
    assert_eq!((winner.failures, winner.successes), (0, 1));
    assert!(winner.response_time_ms.is_some());
}

#[tokio::test]
async fn hanging_fetcher_is_abandoned_at_deadline() {
    let quick: Arc<dyn Fetcher> = Arc::new(StubBoard::new(
        "quick",
        postings("quick", "Go Developer", &["https://q.example.com/1".to_string()]),
    ));
    let stuck: Arc<dyn Fetcher> =
        Arc::new(StubBoard::new("stuck", Vec::new()).with_delay(Duration::from_secs(3600)));
    let tight = OrchestratorSettings {
        batch_timeout: Duration::from_millis(300),
        fetch_timeout: Duration::from_secs(60),
        ..settings()
    };
    let svc = service(vec![(quick, 1), (stuck, 2)], pool(&[]), tight, None);

    let started = Instant::now();
    let response = svc.search(SearchRequest::new("go", "", 10)).await;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(response.success);
    assert_eq!(response.total_jobs, 1);
    let stats = response.execution_stats.unwrap();
    assert!(stats.deadline_hit);
    assert_eq!(stats.fetchers_succeeded, 1);

    let registry = svc.orchestrator().registry();
    assert_eq!(
        registry.descriptor("stuck").unwrap().status,
        FetcherStatus::Timeout
    );
    assert_eq!(
        registry.descriptor("quick").unwrap().status,
        FetcherStatus::Active
    );
}

#[tokio::test]
async fn blocked_fetcher_is_skipped_on_next_search() {
    let walled = Arc::new(
        StubBoard::new("walled", Vec::new())
            .failing_first(vec![FetchError::blocked("captcha"); 3]),
    );
    let svc = service(
        vec![(walled.clone() as Arc<dyn Fetcher>, 1)],
        pool(&["p1"]),
        settings(),
        None,
    );

    let first = svc.search(SearchRequest::new("rust", "", 5)).await;
    assert!(first.success);
    assert_eq!(first.total_jobs, 0);
    assert_eq!(walled.calls.load(Ordering::SeqCst), 3);

    let second = svc.search(SearchRequest::new("rust", "", 5)).await;
    assert!(!second.success);
    assert!(second.error.unwrap().contains("No eligible fetchers"));
    assert_eq!(walled.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn worker_pool_bounds_concurrency() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let names = ["w1", "w2", "w3", "w4", "w5"];
    let fetchers: Vec<(Arc<dyn Fetcher>, u32)> = names
        .iter()
        .map(|&name| {
            let board = StubBoard::new(name, Vec::new())
                .with_delay(Duration::from_millis(50))
                .sharing_gauge(&running, &peak);
            (Arc::new(board) as Arc<dyn Fetcher>, 1)
        })
        .collect();
    let narrow = OrchestratorSettings {
        max_workers: 2,
        ..settings()
    };
    let svc = service(fetchers, pool(&[]), narrow, None);

    let response = svc.search(SearchRequest::new("rust", "", 5)).await;
    assert!(response.success);
    assert_eq!(response.execution_stats.unwrap().fetchers_succeeded, 5);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn repeated_search_is_served_from_cache() {
    let board = Arc::new(StubBoard::new(
        "board",
        postings("board", "Data Engineer", &["https://d.example.com/1".to_string()]),
    ));
    let cache = SearchCache::new(8, Duration::from_secs(60));
    let svc = service(
        vec![(board.clone() as Arc<dyn Fetcher>, 1)],
        pool(&[]),
        settings(),
        Some(cache),
    );

    let first = svc.search(SearchRequest::new("data", "Berlin", 5)).await;
    assert!(!first.execution_stats.unwrap().cached);

    let second = svc.search(SearchRequest::new("Data", "berlin", 5)).await;
    assert!(second.execution_stats.unwrap().cached);
    assert_eq!(second.total_jobs, 1);
    assert_eq!(board.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn experience_filter_applies_before_limit() {
    let urls: Vec<String> = (0..4).map(|i| format!("https://e.example.com/{i}")).collect();
    let mut jobs = postings("e", "Engineer", &urls);
    jobs[1].title = "Senior Engineer".into();
    jobs[3] = jobs[3].clone().with_description("We need a senior person");
    let svc = service(
        vec![(Arc::new(StubBoard::new("e", jobs)) as Arc<dyn Fetcher>, 1)],
        pool(&[]),
        settings(),
        None,
    );

    let request = SearchRequest::new("engineer", "", 10).with_experience_level("senior");
    let response = svc.search(request).await;
    assert_eq!(response.total_jobs, 2);
    assert_eq!(response.execution_stats.unwrap().filtered_out, 2);
}
