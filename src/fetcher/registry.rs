// src/fetcher/registry.rs

//! Fetcher registry.
//!
//! Stores every registered fetcher indexed by name and capability, together
//! with its descriptor. Descriptors are only updated after a unit of work
//! finishes; worker units never touch the registry mid-run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;

use super::{Capability, Fetcher, FetcherDescriptor, FetcherStatus};
use crate::error::FetchError;
use crate::models::SearchRequest;

/// Time after which `Error`, `Blocked` and `Timeout` fall back to `Active`.
pub const DEFAULT_STATUS_COOLDOWN: Duration = Duration::from_secs(600);

struct Entry {
    fetcher: Arc<dyn Fetcher>,
    descriptor: FetcherDescriptor,
    changed: Instant,
}

impl Entry {
    fn set_status(&mut self, status: FetcherStatus) {
        if self.descriptor.status != status {
            self.descriptor.status = status;
            self.descriptor.status_changed_at = Utc::now();
            self.changed = Instant::now();
        }
    }
}

#[derive(Default)]
struct RegistryState {
    entries: BTreeMap<String, Entry>,
    by_capability: BTreeMap<Capability, BTreeSet<String>>,
}

/// Registered fetchers with their status and lifetime counters.
pub struct FetcherRegistry {
    state: RwLock<RegistryState>,
    status_cooldown: Duration,
}

impl Default for FetcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            status_cooldown: DEFAULT_STATUS_COOLDOWN,
        }
    }

    pub fn with_status_cooldown(mut self, cooldown: Duration) -> Self {
        self.status_cooldown = cooldown;
        self
    }

    /// Register an active fetcher. Returns `false` if the name is taken.
    pub fn register(&self, fetcher: Arc<dyn Fetcher>, priority: u32) -> bool {
        self.register_with_status(fetcher, priority, FetcherStatus::Active)
    }

    /// Register with an explicit initial status (e.g. `Disabled`).
    pub fn register_with_status(
        &self,
        fetcher: Arc<dyn Fetcher>,
        priority: u32,
        status: FetcherStatus,
    ) -> bool {
        let name = fetcher.name().to_string();
        let capability = fetcher.capability();
        let mut state = self.state.write();
        if state.entries.contains_key(&name) {
            log::debug!("Fetcher '{}' already registered", name);
            return false;
        }

        let descriptor = FetcherDescriptor {
            name: name.clone(),
            capability,
            priority,
            status,
            successes: 0,
            errors: 0,
            items_produced: 0,
            last_error: None,
            status_changed_at: Utc::now(),
        };
        state
            .by_capability
            .entry(capability)
            .or_default()
            .insert(name.clone());
        state.entries.insert(
            name.clone(),
            Entry {
                fetcher,
                descriptor,
                changed: Instant::now(),
            },
        );
        log::info!("Registered fetcher '{}' ({}, priority {})", name, capability, priority);
        true
    }

    /// Remove a fetcher and run its release hook. Returns `false` if unknown.
    pub async fn deregister(&self, name: &str) -> bool {
        let removed = {
            let mut state = self.state.write();
            let entry = state.entries.remove(name);
            if let Some(entry) = &entry {
                let capability = entry.descriptor.capability;
                if let Some(names) = state.by_capability.get_mut(&capability) {
                    names.remove(name);
                    if names.is_empty() {
                        state.by_capability.remove(&capability);
                    }
                }
            }
            entry
        };

        match removed {
            Some(entry) => {
                entry.fetcher.release().await;
                log::info!("Deregistered fetcher '{}'", name);
                true
            }
            None => false,
        }
    }

    /// Deregister every fetcher. Returns how many were released.
    pub async fn release_all(&self) -> usize {
        let mut released = 0;
        for name in self.names() {
            if self.deregister(&name).await {
                released += 1;
            }
        }
        released
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Fetcher>> {
        self.state
            .read()
            .entries
            .get(name)
            .map(|e| Arc::clone(&e.fetcher))
    }

    pub fn descriptor(&self, name: &str) -> Option<FetcherDescriptor> {
        self.state
            .read()
            .entries
            .get(name)
            .map(|e| e.descriptor.clone())
    }

    /// All descriptors in (priority, name) order.
    pub fn descriptors(&self) -> Vec<FetcherDescriptor> {
        let mut all: Vec<_> = self
            .state
            .read()
            .entries
            .values()
            .map(|e| e.descriptor.clone())
            .collect();
        all.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        all
    }

    pub fn names(&self) -> Vec<String> {
        self.state.read().entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of fetchers with the given capability, alphabetically.
    pub fn by_capability(&self, capability: Capability) -> Vec<String> {
        self.state
            .read()
            .by_capability
            .get(&capability)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Eligible fetchers for `request`, sorted by (priority, name).
    ///
    /// Only `Active` and `RateLimited` fetchers that were requested and
    /// support the location are returned. Recoverable statuses whose
    /// cool-down has elapsed are reset to `Active` first.
    pub fn select_for(&self, request: &SearchRequest) -> Vec<(Arc<dyn Fetcher>, FetcherDescriptor)> {
        let mut state = self.state.write();
        let cooldown = self.status_cooldown;

        let mut selected = Vec::new();
        for entry in state.entries.values_mut() {
            if entry.descriptor.status.recovers() && entry.changed.elapsed() >= cooldown {
                log::info!(
                    "Fetcher '{}' recovered from {} after cool-down",
                    entry.descriptor.name,
                    entry.descriptor.status
                );
                entry.set_status(FetcherStatus::Active);
            }

            if !entry.descriptor.status.is_selectable()
                || !request.wants_source(&entry.descriptor.name)
                || !entry.fetcher.supports_location(&request.location)
            {
                continue;
            }
            selected.push((Arc::clone(&entry.fetcher), entry.descriptor.clone()));
        }

        selected.sort_by(|(_, a), (_, b)| {
            a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name))
        });
        selected
    }

    /// Force a status. Returns `false` if the fetcher is unknown.
    pub fn set_status(&self, name: &str, status: FetcherStatus) -> bool {
        let mut state = self.state.write();
        match state.entries.get_mut(name) {
            Some(entry) => {
                entry.set_status(status);
                true
            }
            None => false,
        }
    }

    /// Publish a successful run.
    pub fn record_success(&self, name: &str, items: usize) {
        let mut state = self.state.write();
        if let Some(entry) = state.entries.get_mut(name) {
            entry.descriptor.successes += 1;
            entry.descriptor.items_produced += items as u64;
            if entry.descriptor.status != FetcherStatus::Disabled {
                entry.set_status(FetcherStatus::Active);
            }
        }
    }

    /// Publish a failed run; the status follows the error kind.
    pub fn record_failure(&self, name: &str, error: &FetchError) {
        let mut state = self.state.write();
        if let Some(entry) = state.entries.get_mut(name) {
            entry.descriptor.errors += 1;
            entry.descriptor.last_error = Some(error.to_string());
            if entry.descriptor.status != FetcherStatus::Disabled {
                entry.set_status(FetcherStatus::from(error));
            }
        }
    }

    /// Publish a unit abandoned at the batch deadline and return the error
    /// recorded for it.
    pub fn record_timeout(&self, name: &str, batch_timeout: Duration) -> FetchError {
        let error = FetchError::timeout(format!("abandoned at batch deadline ({batch_timeout:?})"));
        self.record_failure(name, &error);
        error
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::models::RawPosting;
    use crate::proxy::ProxyIdentity;

    struct StubFetcher {
        name: String,
        capability: Capability,
        locations: Vec<String>,
        released: Arc<AtomicBool>,
    }

    impl StubFetcher {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                capability: Capability::PageFetch,
                locations: Vec::new(),
                released: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        fn name(&self) -> &str {
            &self.name
        }

        fn capability(&self) -> Capability {
            self.capability
        }

        fn supports_location(&self, location: &str) -> bool {
            self.locations.is_empty() || self.locations.iter().any(|l| l == location)
        }

        async fn fetch(
            &self,
            _keyword: &str,
            _location: &str,
            _limit: usize,
            _proxy: Option<&ProxyIdentity>,
        ) -> Result<Vec<RawPosting>, FetchError> {
            Ok(Vec::new())
        }

        async fn release(&self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn names(selected: &[(Arc<dyn Fetcher>, FetcherDescriptor)]) -> Vec<String> {
        selected.iter().map(|(_, d)| d.name.clone()).collect()
    }

    fn request() -> SearchRequest {
        SearchRequest::new("rust", "Remote", 10)
    }

    #[test]
    fn register_is_idempotent() {
        let registry = FetcherRegistry::new();
        assert!(registry.register(Arc::new(StubFetcher::new("a")), 10));
        assert!(!registry.register(Arc::new(StubFetcher::new("a")), 1));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.descriptor("a").unwrap().priority, 10);
    }

    #[test]
    fn select_sorts_by_priority_then_name() {
        let registry = FetcherRegistry::new();
        registry.register(Arc::new(StubFetcher::new("zeta")), 1);
        registry.register(Arc::new(StubFetcher::new("beta")), 5);
        registry.register(Arc::new(StubFetcher::new("alpha")), 5);
        assert_eq!(names(&registry.select_for(&request())), ["zeta", "alpha", "beta"]);
    }

    #[test]
    fn select_skips_unavailable_statuses() {
        let registry = FetcherRegistry::new();
        for name in ["active", "limited", "blocked", "disabled", "broken"] {
            registry.register(Arc::new(StubFetcher::new(name)), 1);
        }
        registry.set_status("limited", FetcherStatus::RateLimited);
        registry.set_status("blocked", FetcherStatus::Blocked);
        registry.set_status("disabled", FetcherStatus::Disabled);
        registry.record_failure("broken", &FetchError::parse("bad markup"));

        assert_eq!(names(&registry.select_for(&request())), ["active", "limited"]);
        assert_eq!(registry.descriptor("broken").unwrap().status, FetcherStatus::Error);
    }

    #[test]
    fn select_filters_location_and_requested_sources() {
        let registry = FetcherRegistry::new();
        let mut berlin = StubFetcher::new("berlin-only");
        berlin.locations = vec!["Berlin".into()];
        registry.register(Arc::new(berlin), 1);
        registry.register(Arc::new(StubFetcher::new("anywhere")), 2);
        registry.register(Arc::new(StubFetcher::new("other")), 3);

        assert_eq!(names(&registry.select_for(&request())), ["anywhere", "other"]);
        let subset = request().with_sources(["anywhere"]);
        assert_eq!(names(&registry.select_for(&subset)), ["anywhere"]);
    }

    #[test]
    fn recoverable_status_resets_after_cooldown() {
        let registry = FetcherRegistry::new().with_status_cooldown(Duration::ZERO);
        registry.register(Arc::new(StubFetcher::new("a")), 1);
        registry.register(Arc::new(StubFetcher::new("b")), 2);
        registry.record_failure("a", &FetchError::blocked("403"));
        registry.set_status("b", FetcherStatus::Disabled);

        assert_eq!(names(&registry.select_for(&request())), ["a"]);
        assert_eq!(registry.descriptor("a").unwrap().status, FetcherStatus::Active);
        assert_eq!(registry.descriptor("b").unwrap().status, FetcherStatus::Disabled);
    }

    #[test]
    fn counters_accumulate() {
        let registry = FetcherRegistry::new();
        registry.register(Arc::new(StubFetcher::new("a")), 1);
        registry.record_success("a", 7);
        registry.record_timeout("a", Duration::from_secs(300));
        registry.record_success("a", 3);

        let d = registry.descriptor("a").unwrap();
        assert_eq!((d.successes, d.errors, d.items_produced), (2, 1, 10));
        assert_eq!(d.status, FetcherStatus::Active);
        assert!(d.last_error.unwrap().contains("deadline"));
    }

    #[test]
    fn capability_index() {
        let registry = FetcherRegistry::new();
        let mut api = StubFetcher::new("api");
        api.capability = Capability::ApiFetch;
        registry.register(Arc::new(api), 1);
        registry.register(Arc::new(StubFetcher::new("page")), 1);
        assert_eq!(registry.by_capability(Capability::ApiFetch), ["api"]);
        assert!(registry.by_capability(Capability::Fallback).is_empty());
    }

    #[tokio::test]
    async fn deregister_runs_release_hook() {
        let registry = FetcherRegistry::new();
        let fetcher = StubFetcher::new("a");
        let released = Arc::clone(&fetcher.released);
        registry.register(Arc::new(fetcher), 1);

        assert!(registry.deregister("a").await);
        assert!(released.load(Ordering::SeqCst));
        assert!(!registry.deregister("a").await);
        assert!(registry.by_capability(Capability::PageFetch).is_empty());
        assert!(registry.is_empty());
    }
}
