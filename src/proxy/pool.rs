// src/proxy/pool.rs

//! Proxy pool with selection strategies and quality scoring.
//!
//! The pool is the only state shared between concurrent worker units, so
//! every read-modify-write happens under one mutex. Callers receive clones;
//! feedback flows back through [`ProxyPool::mark_success`] and
//! [`ProxyPool::mark_failure`] keyed by [`ProxyIdentity::id`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use rand::seq::SliceRandom;

use super::{ProxyIdentity, ProxySource, ProxyStrategy};
use crate::models::ProxyConfig;

/// Scoring and retirement parameters.
#[derive(Debug, Clone)]
pub struct ProxyPoolSettings {
    /// Failure counter value at which an identity is retired
    pub failure_ceiling: u32,
    /// How long a retired identity stays in the failed set
    pub failed_cooldown: Duration,
    /// Response time that scores zero on the latency factor
    pub slow_response_ms: u64,
    /// Region used by the geographic strategy when nothing matches
    pub default_region: String,
}

impl Default for ProxyPoolSettings {
    fn default() -> Self {
        Self::from(&ProxyConfig::default())
    }
}

impl From<&ProxyConfig> for ProxyPoolSettings {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            failure_ceiling: config.failure_ceiling.max(1),
            failed_cooldown: Duration::from_secs(config.failed_cooldown_secs),
            slow_response_ms: config.slow_response_ms,
            default_region: config.default_region.trim().to_lowercase(),
        }
    }
}

/// Restrictions applied to a single acquisition.
#[derive(Debug, Clone, Default)]
pub struct AcquireConstraints {
    /// Only draw from this group
    pub group: Option<String>,
    /// Requested location, used by the geographic strategy
    pub location: Option<String>,
    /// Identity ids that must not be returned
    pub exclude: HashSet<String>,
}

impl AcquireConstraints {
    pub fn for_location(location: impl Into<String>) -> Self {
        Self {
            location: Some(location.into()),
            ..Self::default()
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn excluding(mut self, id: impl Into<String>) -> Self {
        self.exclude.insert(id.into());
        self
    }
}

#[derive(Debug, Default)]
struct PoolState {
    groups: BTreeMap<String, Vec<ProxyIdentity>>,
    /// Round-robin pointers keyed by group name ("*" for all groups)
    cursors: HashMap<String, usize>,
    /// Retired identities and when they were retired
    failed: HashMap<String, Instant>,
}

impl PoolState {
    fn find_mut(&mut self, id: &str) -> Option<&mut ProxyIdentity> {
        self.groups
            .values_mut()
            .flat_map(|members| members.iter_mut())
            .find(|p| p.id() == id)
    }

    fn contains(&self, id: &str) -> bool {
        self.groups.values().flatten().any(|p| p.id() == id)
    }
}

/// Active identities in stable order (group name, insertion order).
fn candidates<'a>(
    groups: &'a BTreeMap<String, Vec<ProxyIdentity>>,
    constraints: &AcquireConstraints,
) -> Vec<&'a ProxyIdentity> {
    groups
        .iter()
        .filter(|(name, _)| {
            constraints
                .group
                .as_ref()
                .is_none_or(|wanted| wanted.eq_ignore_ascii_case(name))
        })
        .flat_map(|(_, members)| members.iter())
        .filter(|p| p.active && !constraints.exclude.contains(&p.id()))
        .collect()
}

/// Grouped, scored pool of egress identities.
#[derive(Debug)]
pub struct ProxyPool {
    settings: ProxyPoolSettings,
    state: Mutex<PoolState>,
}

impl Default for ProxyPool {
    fn default() -> Self {
        Self::new(ProxyPoolSettings::default())
    }
}

impl ProxyPool {
    pub fn new(settings: ProxyPoolSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Create a pool from configuration. Static sources are loaded by
    /// [`ProxyPool::refresh`].
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(ProxyPoolSettings::from(config))
    }

    pub fn settings(&self) -> &ProxyPoolSettings {
        &self.settings
    }

    /// Add an identity to its group. Returns `false` if the id is already known.
    pub fn add(&self, mut identity: ProxyIdentity) -> bool {
        let mut state = self.state.lock();
        let id = identity.id();
        if state.contains(&id) {
            return false;
        }
        identity.recompute_quality(self.settings.slow_response_ms);
        state
            .groups
            .entry(identity.group.clone())
            .or_default()
            .push(identity);
        true
    }

    /// Pull candidates from every source into the group named after it.
    ///
    /// Existing identities keep their counters. Returns the number added.
    pub async fn refresh(&self, sources: &[Arc<dyn ProxySource>]) -> usize {
        let mut added = 0;
        for source in sources {
            match source.list_candidates(None).await {
                Ok(candidates) => {
                    for candidate in candidates {
                        if self.add(candidate.with_group(source.name())) {
                            added += 1;
                        }
                    }
                }
                Err(e) => log::warn!("Proxy source '{}' failed: {}", source.name(), e),
            }
        }
        if added > 0 {
            log::info!("Proxy pool refreshed: {} new identities ({} total)", added, self.len());
        }
        added
    }

    /// Draw an identity using `strategy`. `None` when no active identity fits.
    pub fn acquire(
        &self,
        strategy: ProxyStrategy,
        constraints: &AcquireConstraints,
    ) -> Option<ProxyIdentity> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let chosen_id = {
            let candidates = candidates(&state.groups, constraints);
            if candidates.is_empty() {
                None
            } else {
                match strategy {
                    ProxyStrategy::RoundRobin => {
                        let key = constraints.group.clone().unwrap_or_else(|| "*".to_string());
                        let all: Vec<String> = candidates.iter().map(|p| p.id()).collect();
                        let cursor = state.cursors.get(&key).copied().unwrap_or(0);
                        let index = cursor % all.len();
                        state.cursors.insert(key, index + 1);
                        Some(all[index].clone())
                    }
                    ProxyStrategy::Random => candidates
                        .choose(&mut rand::thread_rng())
                        .map(|p| p.id()),
                    ProxyStrategy::BestQuality => best_of(candidates.iter().copied()),
                    ProxyStrategy::Geographic => {
                        let location = constraints.location.as_deref().unwrap_or_default();
                        best_of(
                            candidates
                                .iter()
                                .copied()
                                .filter(|p| p.serves_location(location)),
                        )
                        .or_else(|| {
                            best_of(candidates.iter().copied().filter(|p| {
                                p.region.as_deref() == Some(self.settings.default_region.as_str())
                            }))
                        })
                    }
                }
            }
        };

        let id = chosen_id?;
        let identity = state.find_mut(&id)?;
        identity.last_used = Some(Utc::now());
        Some(identity.clone())
    }

    /// Record a successful use. Decays the failure counter, refreshes the
    /// rolling response time and reactivates a retired identity.
    pub fn mark_success(&self, id: &str, response_time: Duration) -> bool {
        let mut state = self.state.lock();
        let reactivated = match state.find_mut(id) {
            Some(identity) => {
                identity.successes += 1;
                identity.record_response_time(response_time.as_secs_f64() * 1000.0);
                self.apply_success(identity)
            }
            None => return false,
        };
        if reactivated {
            state.failed.remove(id);
        }
        true
    }

    /// Record a failed use. Retires the identity once the failure counter
    /// reaches the ceiling.
    pub fn mark_failure(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        let retired = match state.find_mut(id) {
            Some(identity) => {
                identity.failures += 1;
                self.apply_failure(identity)
            }
            None => return false,
        };
        if retired {
            state.failed.insert(id.to_string(), Instant::now());
        }
        true
    }

    /// Record a health probe outcome.
    pub fn record_probe(&self, id: &str, outcome: std::result::Result<Duration, String>) -> bool {
        let mut state = self.state.lock();
        let Some(identity) = state.find_mut(id) else {
            return false;
        };
        identity.probes_total += 1;
        identity.last_checked = Some(Utc::now());

        match outcome {
            Ok(elapsed) => {
                identity.probes_passed += 1;
                identity.record_response_time(elapsed.as_secs_f64() * 1000.0);
                if self.apply_success(identity) {
                    state.failed.remove(id);
                }
            }
            Err(reason) => {
                log::debug!("Probe failed for {}: {}", id, reason);
                self.apply_failure(identity);
                // A failed reinstatement probe restarts the cool-down.
                if !identity.active {
                    state.failed.insert(id.to_string(), Instant::now());
                }
            }
        }
        true
    }

    /// Returns true when the identity went from inactive to active.
    fn apply_success(&self, identity: &mut ProxyIdentity) -> bool {
        let ceiling = self.settings.failure_ceiling;
        identity.failure_streak = identity
            .failure_streak
            .saturating_sub(1)
            .min(ceiling.saturating_sub(1));
        let reactivated = !identity.active;
        identity.active = true;
        identity.recompute_quality(self.settings.slow_response_ms);
        if reactivated {
            log::info!("Proxy {} reinstated (quality {:.2})", identity.id(), identity.quality);
        }
        reactivated
    }

    /// Returns true when the identity went from active to retired.
    fn apply_failure(&self, identity: &mut ProxyIdentity) -> bool {
        identity.failure_streak = identity.failure_streak.saturating_add(1);
        let retired = identity.active && identity.failure_streak >= self.settings.failure_ceiling;
        if retired {
            identity.active = false;
            log::warn!(
                "Proxy {} retired after {} consecutive failures",
                identity.id(),
                identity.failure_streak
            );
        }
        identity.recompute_quality(self.settings.slow_response_ms);
        retired
    }

    /// Forget failed-set entries older than the cool-down. The identities
    /// stay inactive until a success or a passing probe.
    pub fn prune_failed(&self) -> usize {
        let cooldown = self.settings.failed_cooldown;
        let mut state = self.state.lock();
        let before = state.failed.len();
        state.failed.retain(|_, retired_at| retired_at.elapsed() < cooldown);
        before - state.failed.len()
    }

    /// Whether the identity is retired and still cooling down.
    pub fn is_cooling_down(&self, id: &str) -> bool {
        self.state.lock().failed.contains_key(id)
    }

    /// Identities the health checker should probe: everything except
    /// retired identities that are still cooling down.
    pub fn probe_targets(&self) -> Vec<ProxyIdentity> {
        let state = self.state.lock();
        state
            .groups
            .values()
            .flatten()
            .filter(|p| p.active || !state.failed.contains_key(&p.id()))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<ProxyIdentity> {
        self.state
            .lock()
            .groups
            .values()
            .flatten()
            .find(|p| p.id() == id)
            .cloned()
    }

    /// All identities, grouped and in insertion order.
    pub fn snapshot(&self) -> Vec<ProxyIdentity> {
        self.state.lock().groups.values().flatten().cloned().collect()
    }

    pub fn groups(&self) -> Vec<String> {
        self.state.lock().groups.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_count(&self) -> usize {
        self.state
            .lock()
            .groups
            .values()
            .flatten()
            .filter(|p| p.active)
            .count()
    }
}

/// Highest quality wins; ties go to the lexicographically smaller id.
fn best_of<'a>(candidates: impl Iterator<Item = &'a ProxyIdentity>) -> Option<String> {
    candidates
        .max_by(|a, b| {
            a.quality
                .total_cmp(&b.quality)
                .then_with(|| b.id().cmp(&a.id()))
        })
        .map(|p| p.id())
}
