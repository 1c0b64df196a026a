//! Multi-scope rate limiter.
//!
//! Combines a global token bucket, optional per-retailer/per-domain buckets,
//! per-scope sliding windows and per-scope concurrency permits. Each scope's
//! constraints are independent gates: the caller waits for the tightest one.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info};

use super::bucket::TokenBucket;
use super::clock::{Clock, TokioClock};
use super::config::RateLimitConfig;
use super::error::{RateLimitError, RateLimitResult};
use super::guard::AdmissionGuard;
use super::scope::{RequestTarget, ScopeKey, GLOBAL_SCOPE};
use super::stats::{RequestStats, ScopeReport};
use super::window::RequestHistory;

/// A config together with the bucket built from it.
#[derive(Debug, Clone)]
struct ScopeLimits {
    config: RateLimitConfig,
    bucket: Arc<TokenBucket>,
}

impl ScopeLimits {
    fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let bucket = Arc::new(TokenBucket::new(
            config.requests_per_second,
            config.burst_size,
            clock,
        ));
        Self { config, bucket }
    }
}

/// Bookkeeping for one effective scope.
#[derive(Debug, Default)]
struct ScopeState {
    history: Mutex<RequestHistory>,
    stats: Mutex<RequestStats>,
}

impl ScopeState {
    fn history(&self) -> MutexGuard<'_, RequestHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats(&self) -> MutexGuard<'_, RequestStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Limits that apply to one call, after scope resolution.
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub(crate) scope: String,
    pub(crate) config: RateLimitConfig,
    global_bucket: Arc<TokenBucket>,
    scope_bucket: Option<Arc<TokenBucket>>,
}

/// Admission controller shared by every task issuing outbound requests.
///
/// Cloning is cheap and clones share state. Scope tables grow with every
/// distinct retailer or domain seen and are never evicted.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    global: Arc<RwLock<ScopeLimits>>,
    retailers: Arc<RwLock<HashMap<String, ScopeLimits>>>,
    domains: Arc<RwLock<HashMap<String, ScopeLimits>>>,
    concurrency: Arc<RwLock<HashMap<String, Arc<Semaphore>>>>,
    scopes: Arc<RwLock<HashMap<String, Arc<ScopeState>>>>,
}

impl RateLimiter {
    /// Create a limiter with default global limits and tokio timers.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(TokioClock))
    }

    /// Create a limiter with default global limits driven by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let global = ScopeLimits::new(RateLimitConfig::default(), clock.clone());
        Self {
            clock,
            global: Arc::new(RwLock::new(global)),
            retailers: Arc::new(RwLock::new(HashMap::new())),
            domains: Arc::new(RwLock::new(HashMap::new())),
            concurrency: Arc::new(RwLock::new(HashMap::new())),
            scopes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Attach limits to a scope, replacing any existing config and bucket.
    pub async fn configure(&self, key: ScopeKey, config: RateLimitConfig) -> RateLimitResult<()> {
        config.validate(key.name())?;
        let limits = ScopeLimits::new(config, self.clock.clone());

        info!(
            "Configured {}: {}/s, {}/min, {}/h, burst {}, cooldown {}s",
            key,
            limits.config.requests_per_second,
            limits.config.requests_per_minute,
            limits.config.requests_per_hour,
            limits.config.burst_size,
            limits.config.cooldown_seconds
        );

        match key {
            ScopeKey::Global => *self.global.write().await = limits,
            ScopeKey::Retailer(name) => {
                self.retailers.write().await.insert(name, limits);
            }
            ScopeKey::Domain(name) => {
                self.domains.write().await.insert(name, limits);
            }
        }
        Ok(())
    }

    /// Config attached to a scope, if any. The global scope always has one.
    pub async fn config_for(&self, key: &ScopeKey) -> Option<RateLimitConfig> {
        match key {
            ScopeKey::Global => Some(self.global.read().await.config.clone()),
            ScopeKey::Retailer(name) => self
                .retailers
                .read()
                .await
                .get(name)
                .map(|l| l.config.clone()),
            ScopeKey::Domain(name) => self.domains.read().await.get(name).map(|l| l.config.clone()),
        }
    }

    /// Bound simultaneous guarded operations for a scope.
    pub async fn set_concurrent_limit(&self, scope: &str, limit: usize) -> RateLimitResult<()> {
        if limit == 0 || limit > Semaphore::MAX_PERMITS {
            return Err(RateLimitError::InvalidConcurrency {
                scope: scope.to_string(),
            });
        }
        self.concurrency
            .write()
            .await
            .insert(scope.to_string(), Arc::new(Semaphore::new(limit)));
        info!("Concurrency limit for {} set to {}", scope, limit);
        Ok(())
    }

    /// Make a scope's concurrency unlimited again.
    pub async fn remove_concurrent_limit(&self, scope: &str) -> bool {
        self.concurrency.write().await.remove(scope).is_some()
    }

    /// Free permits for a scope, or `None` when its concurrency is unlimited.
    pub async fn available_permits(&self, scope: &str) -> Option<usize> {
        self.concurrency
            .read()
            .await
            .get(scope)
            .map(|s| s.available_permits())
    }

    /// Resolve the effective scope: a configured retailer wins, then the
    /// domain, then global. Unconfigured scopes use the global config.
    pub(crate) async fn resolve(&self, target: &RequestTarget) -> Resolved {
        let global = self.global.read().await.clone();

        if let Some(retailer) = &target.retailer {
            if let Some(limits) = self.retailers.read().await.get(retailer) {
                return Resolved {
                    scope: retailer.clone(),
                    config: limits.config.clone(),
                    global_bucket: global.bucket,
                    scope_bucket: Some(limits.bucket.clone()),
                };
            }
        }

        if let Some(domain) = &target.domain {
            let limits = self.domains.read().await.get(domain).cloned();
            return match limits {
                Some(limits) => Resolved {
                    scope: domain.clone(),
                    config: limits.config,
                    global_bucket: global.bucket,
                    scope_bucket: Some(limits.bucket),
                },
                None => Resolved {
                    scope: domain.clone(),
                    config: global.config,
                    global_bucket: global.bucket,
                    scope_bucket: None,
                },
            };
        }

        Resolved {
            scope: GLOBAL_SCOPE.to_string(),
            config: global.config,
            global_bucket: global.bucket,
            scope_bucket: None,
        }
    }

    /// Decide how long a request to `target` must wait before proceeding.
    ///
    /// Always counts the request and records it in the scope's history. The
    /// caller is responsible for sleeping the returned duration.
    pub async fn acquire(&self, target: &RequestTarget) -> Duration {
        let resolved = self.resolve(target).await;
        self.acquire_resolved(&resolved, target).await
    }

    async fn acquire_resolved(&self, resolved: &Resolved, target: &RequestTarget) -> Duration {
        let state = self.scope_state(&resolved.scope).await;
        let now = self.clock.now();

        let global_wait = resolved.global_bucket.acquire(1);
        let scope_wait = resolved
            .scope_bucket
            .as_ref()
            .map(|b| b.acquire(1))
            .unwrap_or(Duration::ZERO);
        let window_wait = state.history().check_and_record(now, &resolved.config);

        let base = global_wait.max(scope_wait).max(window_wait);
        let wait = target.priority.scale(base);

        state.stats().record_admission(wait);

        if !wait.is_zero() {
            debug!(
                "Throttling {} ({} priority): waiting {:?} (global {:?}, bucket {:?}, window {:?})",
                resolved.scope, target.priority, wait, global_wait, scope_wait, window_wait
            );
        }
        wait
    }

    /// Wait a request to `target` would currently face, without counting it
    /// or reserving tokens.
    pub async fn time_until_ready(&self, target: &RequestTarget) -> Duration {
        let resolved = self.resolve(target).await;
        let now = self.clock.now();

        let mut wait = resolved.global_bucket.time_until_available(1);
        if let Some(bucket) = &resolved.scope_bucket {
            wait = wait.max(bucket.time_until_available(1));
        }
        if let Some(state) = self.scopes.read().await.get(&resolved.scope) {
            wait = wait.max(state.history().check(now, &resolved.config));
        }
        target.priority.scale(wait)
    }

    /// Reserve a concurrency permit, wait out the rate limits and return a
    /// guard for the protected operation.
    pub async fn admit(&self, target: &RequestTarget) -> AdmissionGuard {
        let resolved = self.resolve(target).await;

        let semaphore = self.concurrency.read().await.get(&resolved.scope).cloned();
        let permit = match semaphore {
            // Semaphores are never closed, so acquisition only fails if that changes.
            Some(semaphore) => semaphore.acquire_owned().await.ok(),
            None => None,
        };

        let wait = self.acquire_resolved(&resolved, target).await;
        self.clock.sleep(wait).await;

        AdmissionGuard::new(
            self.clone(),
            resolved.scope,
            resolved.config.cooldown(),
            wait,
            permit,
        )
    }

    /// Run `operation` under admission control for `target`.
    ///
    /// The operation's result is returned unchanged. Success or failure is
    /// recorded, the concurrency permit released and the scope cooldown slept
    /// before this returns.
    pub async fn run<F, Fut, T, E>(&self, target: &RequestTarget, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = self.admit(target).await;
        let result = operation().await;
        guard.finish(result.is_ok()).await;
        result
    }

    pub(crate) async fn record_outcome(&self, scope: &str, success: bool) {
        let state = self.scope_state(scope).await;
        let mut stats = state.stats();
        if success {
            stats.successful_requests += 1;
        } else {
            stats.failed_requests += 1;
        }
    }

    async fn scope_state(&self, scope: &str) -> Arc<ScopeState> {
        if let Some(state) = self.scopes.read().await.get(scope) {
            return state.clone();
        }

        self.scopes
            .write()
            .await
            .entry(scope.to_string())
            .or_default()
            .clone()
    }

    /// Counters for a scope; zeroed if the scope has not been seen.
    pub async fn get_stats(&self, scope: &str) -> RequestStats {
        self.scopes
            .read()
            .await
            .get(scope)
            .map(|s| s.stats().clone())
            .unwrap_or_default()
    }

    /// Clear counters for one scope, or for all scopes when `None`.
    pub async fn reset_stats(&self, scope: Option<&str>) {
        let scopes = self.scopes.read().await;
        match scope {
            Some(scope) => {
                if let Some(state) = scopes.get(scope) {
                    *state.stats() = RequestStats::default();
                }
            }
            None => {
                for state in scopes.values() {
                    *state.stats() = RequestStats::default();
                }
            }
        }
    }

    /// Reports for every scope seen so far, keyed by scope.
    pub async fn get_all_stats(&self) -> BTreeMap<String, ScopeReport> {
        self.scopes
            .read()
            .await
            .iter()
            .map(|(scope, state)| (scope.clone(), state.stats().report(scope)))
            .collect()
    }

    /// Scopes that have received at least one request.
    pub async fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self.scopes.read().await.keys().cloned().collect();
        scopes.sort();
        scopes
    }

    /// Refill every bucket. Administrative; not part of normal flow.
    pub async fn reset_buckets(&self) {
        self.global.read().await.bucket.reset();
        for limits in self.retailers.read().await.values() {
            limits.bucket.reset();
        }
        for limits in self.domains.read().await.values() {
            limits.bucket.reset();
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
