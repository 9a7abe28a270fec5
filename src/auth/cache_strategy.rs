//! In-memory authorization cache: TTL + LRU + per-identifier rate limiting
//! (spec.md §4.G `InMemoryAuthCache`).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::auth::unified::{AuthDecision, AuthStatus};

const DEFAULT_TTL: Duration = Duration::from_secs(3600);
const DEFAULT_MAX_ENTRIES: usize = 10_000;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(1);
const RATE_LIMIT_MAX_REQUESTS: u32 = 3;

struct CacheEntry {
    decision: AuthDecision,
    expires_at: Instant,
    last_access: Instant,
}

#[derive(Default, Clone, Copy)]
struct RateWindow {
    window_start: Option<Instant>,
    count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_entries: u64,
    pub rate_limit_total_checks: u64,
    pub rate_limit_blocked_requests: u64,
}

impl CacheStatistics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    rate_windows: HashMap<String, RateWindow>,
    stats: CacheStatistics,
}

/// TTL + LRU + rate-limited authorization cache (spec.md §4.G). `Accepted`
/// / `Blocked` / `Expired` decisions are cacheable; `Invalid` is never
/// cached per spec.
pub struct InMemoryAuthCache {
    ttl: Duration,
    max_entries: usize,
    inner: Mutex<Inner>,
}

impl InMemoryAuthCache {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                rate_windows: HashMap::new(),
                stats: CacheStatistics::default(),
            }),
        }
    }

    /// Checks the sliding-window rate limiter for `identifier`. Returns
    /// `false` when the identifier has exceeded `RATE_LIMIT_MAX_REQUESTS`
    /// within `RATE_LIMIT_WINDOW`; the cache counts this as
    /// `blockedRequests` and the caller treats it as a miss (spec.md §4.G).
    fn check_rate_limit(&self, inner: &mut Inner, identifier: &str) -> bool {
        inner.stats.rate_limit_total_checks += 1;
        let now = Instant::now();
        let window = inner.rate_windows.entry(identifier.to_string()).or_default();
        match window.window_start {
            Some(start) if now.duration_since(start) < RATE_LIMIT_WINDOW => {
                if window.count >= RATE_LIMIT_MAX_REQUESTS {
                    inner.stats.rate_limit_blocked_requests += 1;
                    return false;
                }
                window.count += 1;
            }
            _ => {
                window.window_start = Some(now);
                window.count = 1;
            }
        }
        true
    }

    /// Returns a cached decision for `identifier`, or `None` on a miss,
    /// expiry, or active rate limit (spec.md §4.G).
    pub fn get(&self, identifier: &str) -> Option<AuthDecision> {
        let mut inner = self.inner.lock().expect("auth cache mutex poisoned");
        if !self.check_rate_limit(&mut inner, identifier) {
            return None;
        }

        let now = Instant::now();
        let expired = match inner.entries.get(identifier) {
            Some(entry) => entry.expires_at <= now,
            None => false,
        };
        if expired {
            inner.entries.remove(identifier);
            inner.stats.expired_entries += 1;
            inner.stats.misses += 1;
            return None;
        }

        if let Some(entry) = inner.entries.get_mut(identifier) {
            entry.last_access = now;
            let decision = entry.decision.clone();
            inner.stats.hits += 1;
            return Some(decision);
        }
        inner.stats.misses += 1;
        None
    }

    /// Caches `decision` for `identifier` unless it is `Invalid`
    /// (spec.md §4.G). Evicts the least-recently-used entry on
    /// insert-over-capacity.
    pub fn put(&self, identifier: &str, decision: AuthDecision) {
        if decision.status == AuthStatus::Invalid {
            return;
        }
        let mut inner = self.inner.lock().expect("auth cache mutex poisoned");
        let now = Instant::now();

        if inner.entries.len() >= self.max_entries && !inner.entries.contains_key(identifier) {
            if let Some(lru_key) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&lru_key);
                inner.stats.evictions += 1;
            }
        }

        inner.entries.insert(
            identifier.to_string(),
            CacheEntry {
                decision,
                expires_at: now + self.ttl,
                last_access: now,
            },
        );
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.inner.lock().expect("auth cache mutex poisoned").stats.clone()
    }

    pub fn total_entries(&self) -> usize {
        self.inner.lock().expect("auth cache mutex poisoned").entries.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("auth cache mutex poisoned");
        inner.entries.clear();
        inner.rate_windows.clear();
    }
}

impl Default for InMemoryAuthCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_decisions_are_never_cached() {
        let cache = InMemoryAuthCache::new();
        cache.put("TAG1", AuthDecision::invalid("nope"));
        assert_eq!(cache.total_entries(), 0);
    }

    #[test]
    fn hit_then_miss_updates_hit_rate() {
        let cache = InMemoryAuthCache::new();
        cache.put("TAG1", AuthDecision::accepted());
        assert!(cache.get("TAG1").is_some());
        assert!(cache.get("TAG2").is_none());
        let stats = cache.statistics();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!(stats.hit_rate() > 0.0 && stats.hit_rate() < 100.0);
    }

    #[test]
    fn rate_limit_blocks_fourth_request_within_window() {
        let cache = InMemoryAuthCache::new();
        cache.put("TAG1", AuthDecision::accepted());
        for _ in 0..3 {
            assert!(cache.get("TAG1").is_some());
        }
        assert!(cache.get("TAG1").is_none());
        assert_eq!(cache.statistics().rate_limit_blocked_requests, 1);
    }

    #[test]
    fn lru_eviction_respects_max_entries() {
        let cache = InMemoryAuthCache::with_limits(DEFAULT_TTL, 1);
        cache.put("A", AuthDecision::accepted());
        cache.put("B", AuthDecision::accepted());
        assert_eq!(cache.total_entries(), 1);
        assert_eq!(cache.statistics().evictions, 1);
    }
}
