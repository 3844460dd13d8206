//! Application configuration structures.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::proxy::{ProxyIdentity, ProxyStrategy};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client settings shared by the built-in fetchers
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Worker pool, deadlines and retry protocol
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Proxy pool scoring and static proxy lists
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Background proxy health checks
    #[serde(default)]
    pub health: HealthConfig,

    /// Recent-search cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Built-in source definitions
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.request_timeout_secs == 0 {
            return Err(AppError::validation(
                "crawler.request_timeout_secs must be > 0",
            ));
        }
        if self.crawler.max_body_bytes == 0 {
            return Err(AppError::validation("crawler.max_body_bytes must be > 0"));
        }
        if self.scheduler.max_workers == 0 {
            return Err(AppError::validation("scheduler.max_workers must be > 0"));
        }
        if self.scheduler.max_attempts == 0 {
            return Err(AppError::validation("scheduler.max_attempts must be > 0"));
        }
        if self.scheduler.batch_timeout_secs == 0 || self.scheduler.fetch_timeout_secs == 0 {
            return Err(AppError::validation("scheduler timeouts must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.scheduler.jitter) {
            return Err(AppError::validation("scheduler.jitter must be within [0, 1]"));
        }
        if self.proxy.failure_ceiling == 0 {
            return Err(AppError::validation("proxy.failure_ceiling must be > 0"));
        }
        if self.health.interval_secs == 0 || self.health.probe_timeout_secs == 0 {
            return Err(AppError::validation("health intervals must be > 0"));
        }
        if self.health.enabled && self.health.endpoints.is_empty() {
            return Err(AppError::validation(
                "health.endpoints must not be empty when health checks are enabled",
            ));
        }

        for source in &self.proxy.sources {
            for raw in &source.urls {
                ProxyIdentity::parse(raw).map_err(|e| {
                    AppError::validation(format!("proxy source '{}': {e}", source.name))
                })?;
            }
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name.to_lowercase()) {
                return Err(AppError::validation(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
            source.validate()?;
        }
        Ok(())
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request network timeout in seconds
    #[serde(default = "defaults::request_timeout")]
    pub request_timeout_secs: u64,

    /// Largest response body a fetcher will read
    #[serde(default = "defaults::max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            request_timeout_secs: defaults::request_timeout(),
            max_body_bytes: defaults::max_body_bytes(),
        }
    }
}

/// Worker pool and retry protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Width of the bounded worker pool
    #[serde(default = "defaults::max_workers")]
    pub max_workers: usize,

    /// Hard ceiling for a whole search batch
    #[serde(default = "defaults::batch_timeout")]
    pub batch_timeout_secs: u64,

    /// Ceiling for a single fetch attempt
    #[serde(default = "defaults::fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Attempts per fetcher, including the first one
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "defaults::backoff_base")]
    pub backoff_base_ms: u64,

    #[serde(default = "defaults::backoff_max")]
    pub backoff_max_ms: u64,

    /// Fraction of each backoff delay that is randomized
    #[serde(default = "defaults::jitter")]
    pub jitter: f64,

    /// How units draw a proxy from the pool
    #[serde(default)]
    pub proxy_strategy: ProxyStrategy,

    /// Fail units that need egress when no proxy is available
    #[serde(default)]
    pub require_proxy: bool,

    /// Time after which Error/Blocked/Timeout fetchers become eligible again
    #[serde(default = "defaults::status_cooldown")]
    pub status_cooldown_secs: u64,
}

impl SchedulerConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn status_cooldown(&self) -> Duration {
        Duration::from_secs(self.status_cooldown_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: defaults::max_workers(),
            batch_timeout_secs: defaults::batch_timeout(),
            fetch_timeout_secs: defaults::fetch_timeout(),
            max_attempts: defaults::max_attempts(),
            backoff_base_ms: defaults::backoff_base(),
            backoff_max_ms: defaults::backoff_max(),
            jitter: defaults::jitter(),
            proxy_strategy: ProxyStrategy::default(),
            require_proxy: false,
            status_cooldown_secs: defaults::status_cooldown(),
        }
    }
}

/// Proxy pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Consecutive failures after which an identity is retired
    #[serde(default = "defaults::failure_ceiling")]
    pub failure_ceiling: u32,

    /// How long a retired identity stays in the failed set
    #[serde(default = "defaults::failed_cooldown")]
    pub failed_cooldown_secs: u64,

    /// Response time that scores zero on the latency factor
    #[serde(default = "defaults::slow_response")]
    pub slow_response_ms: u64,

    /// Region used when no identity matches the requested location
    #[serde(default = "defaults::default_region")]
    pub default_region: String,

    /// Static proxy lists
    #[serde(default)]
    pub sources: Vec<ProxySourceConfig>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            failure_ceiling: defaults::failure_ceiling(),
            failed_cooldown_secs: defaults::failed_cooldown(),
            slow_response_ms: defaults::slow_response(),
            default_region: defaults::default_region(),
            sources: Vec::new(),
        }
    }
}

/// A named static list of proxy URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySourceConfig {
    pub name: String,

    /// Region tag applied to every identity of this list
    #[serde(default)]
    pub region: Option<String>,

    /// `scheme://[user:pass@]host:port`
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Background health check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    #[serde(default = "defaults::health_interval")]
    pub interval_secs: u64,

    #[serde(default = "defaults::probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Known-good endpoints probed through each identity
    #[serde(default = "defaults::probe_endpoints")]
    pub endpoints: Vec<String>,

    /// Status codes that count as a healthy probe
    #[serde(default = "defaults::accepted_statuses")]
    pub accepted_statuses: Vec<u16>,

    /// Number of endpoints sampled per identity per pass
    #[serde(default = "defaults::sample_size")]
    pub sample_size: usize,
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            interval_secs: defaults::health_interval(),
            probe_timeout_secs: defaults::probe_timeout(),
            endpoints: defaults::probe_endpoints(),
            accepted_statuses: defaults::accepted_statuses(),
            sample_size: defaults::sample_size(),
        }
    }
}

/// Recent-search cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    #[serde(default = "defaults::cache_entries")]
    pub max_entries: u64,

    #[serde(default = "defaults::cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            max_entries: defaults::cache_entries(),
            ttl_secs: defaults::cache_ttl(),
        }
    }
}

/// Kind of built-in fetcher backing a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Html,
    Json,
}

/// A configured job board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique fetcher name
    pub name: String,

    #[serde(default)]
    pub kind: SourceKind,

    /// Lower is tried first and wins dedup ties
    #[serde(default = "defaults::priority")]
    pub priority: u32,

    /// URL template with `{keyword}`, `{location}` and `{limit}` placeholders
    pub url: String,

    /// Supported locations (case-insensitive substring); empty means any
    #[serde(default)]
    pub locations: Vec<String>,

    #[serde(default = "defaults::enabled")]
    pub use_proxy: bool,

    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// CSS selectors for `html` sources
    #[serde(default)]
    pub selectors: HtmlSelectors,

    /// JSON pointers for `json` sources
    #[serde(default)]
    pub fields: JsonFields,
}

impl SourceConfig {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("source name is empty"));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(AppError::validation(format!(
                "source '{}' url must be http(s)",
                self.name
            )));
        }
        if self.kind == SourceKind::Html
            && (self.selectors.row.trim().is_empty() || self.selectors.title.trim().is_empty())
        {
            return Err(AppError::validation(format!(
                "source '{}' needs selectors.row and selectors.title",
                self.name
            )));
        }
        Ok(())
    }
}

/// CSS selectors used by the HTML board fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlSelectors {
    #[serde(default)]
    pub row: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub salary: Option<String>,
    /// Element holding the link; defaults to the title element
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "defaults::link_attr")]
    pub link_attr: String,
}

impl Default for HtmlSelectors {
    fn default() -> Self {
        Self {
            row: String::new(),
            title: String::new(),
            company: None,
            location: None,
            salary: None,
            link: None,
            description: None,
            link_attr: defaults::link_attr(),
        }
    }
}

/// JSON pointers used by the API fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonFields {
    /// Pointer to the array of postings; empty means the document root
    #[serde(default)]
    pub items: String,
    #[serde(default = "defaults::ptr_title")]
    pub title: String,
    #[serde(default = "defaults::ptr_company")]
    pub company: String,
    #[serde(default = "defaults::ptr_location")]
    pub location: String,
    #[serde(default = "defaults::ptr_url")]
    pub url: String,
    #[serde(default)]
    pub salary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Default for JsonFields {
    fn default() -> Self {
        Self {
            items: String::new(),
            title: defaults::ptr_title(),
            company: defaults::ptr_company(),
            location: defaults::ptr_location(),
            url: defaults::ptr_url(),
            salary: None,
            description: None,
        }
    }
}

mod defaults {
    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; jobcrawl/0.1)".into()
    }
    pub fn request_timeout() -> u64 {
        30
    }
    pub fn max_body_bytes() -> usize {
        5 * 1024 * 1024
    }

    // Scheduler defaults
    pub fn max_workers() -> usize {
        5
    }
    pub fn batch_timeout() -> u64 {
        300
    }
    pub fn fetch_timeout() -> u64 {
        60
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn backoff_base() -> u64 {
        500
    }
    pub fn backoff_max() -> u64 {
        8_000
    }
    pub fn jitter() -> f64 {
        0.5
    }
    pub fn status_cooldown() -> u64 {
        600
    }

    // Proxy defaults
    pub fn failure_ceiling() -> u32 {
        3
    }
    pub fn failed_cooldown() -> u64 {
        1_800
    }
    pub fn slow_response() -> u64 {
        10_000
    }
    pub fn default_region() -> String {
        "us".into()
    }

    // Health defaults
    pub fn health_interval() -> u64 {
        300
    }
    pub fn probe_timeout() -> u64 {
        10
    }
    pub fn probe_endpoints() -> Vec<String> {
        vec![
            "https://httpbin.org/ip".into(),
            "https://www.google.com/generate_204".into(),
            "https://api.ipify.org".into(),
        ]
    }
    pub fn accepted_statuses() -> Vec<u16> {
        vec![200, 204]
    }
    pub fn sample_size() -> usize {
        2
    }

    // Cache defaults
    pub fn cache_entries() -> u64 {
        256
    }
    pub fn cache_ttl() -> u64 {
        900
    }

    // Source defaults
    pub fn enabled() -> bool {
        true
    }
    pub fn priority() -> u32 {
        100
    }
    pub fn link_attr() -> String {
        "href".into()
    }
    pub fn ptr_title() -> String {
        "/title".into()
    }
    pub fn ptr_company() -> String {
        "/company".into()
    }
    pub fn ptr_location() -> String {
        "/location".into()
    }
    pub fn ptr_url() -> String {
        "/url".into()
    }
}
