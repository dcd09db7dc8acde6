//! Fixed-window rate limiting.
//!
//! Counters live in a pluggable [`CounterStore`] keyed
//! `rate_limit:{scope}:{granularity}:{bucket}` with
//! `bucket = now / window_seconds`; each increment re-arms a TTL equal to the
//! window length, so live counters self-expire without a sweeper.
//!
//! The check reads the current bucket count *before* incrementing, which
//! makes a limit "first N in each whole window" rather than a rolling
//! window: a burst of up to 2× the limit can straddle a bucket edge.
//! Windows are evaluated in order (minute, hour, day) and a rejection by a
//! later window leaves earlier increments in place. Both behaviors are
//! pinned by tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::config::WindowLimits;
use crate::error::OrchestratorError;

/// Wall-clock seconds source. Swapped for [`ManualClock`] in tests so bucket
/// rollovers can be driven deterministically.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> u64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_unix: u64) -> Self {
        Self {
            now: AtomicU64::new(start_unix),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, now_unix: u64) {
        self.now.store(now_unix, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Atomic counter service with expiring keys (redis-style `GET` /
/// `INCR`+`EXPIRE` semantics). One writer per key; increments never race a
/// read-modify-write.
pub trait CounterStore: Send + Sync {
    /// Current count for the key; 0 when absent or expired.
    fn get(&self, key: &str) -> u64;

    /// Increment the key and re-arm its TTL; returns the post-increment
    /// count.
    fn incr(&self, key: &str, ttl: Duration) -> u64;
}

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: u64,
}

/// In-process [`CounterStore`] backed by a mutexed map.
///
/// Expired entries are dropped lazily on access and swept wholesale once the
/// map grows past an internal bound, so long-running processes do not
/// accumulate dead buckets.
pub struct InMemoryCounterStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CounterEntry>>,
}

const SWEEP_THRESHOLD: usize = 4096;

impl InMemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl CounterStore for InMemoryCounterStore {
    fn get(&self, key: &str) -> u64 {
        let now = self.clock.now_unix();
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => entry.count,
            _ => 0,
        }
    }

    fn incr(&self, key: &str, ttl: Duration) -> u64 {
        let now = self.clock.now_unix();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= SWEEP_THRESHOLD {
            entries.retain(|_, entry| entry.expires_at > now);
        }
        let entry = entries.entry(key.to_string()).or_insert(CounterEntry {
            count: 0,
            expires_at: 0,
        });
        if entry.expires_at <= now {
            entry.count = 0;
        }
        entry.count += 1;
        entry.expires_at = now + ttl.as_secs();
        entry.count
    }
}

/// Granularity of one fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowGranularity {
    Minute,
    Hour,
    Day,
}

impl WindowGranularity {
    pub fn seconds(&self) -> u64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 3600,
            Self::Day => 86_400,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }
}

fn window_key(scope: &str, granularity: WindowGranularity, bucket: u64) -> String {
    format!("rate_limit:{scope}:{}:{bucket}", granularity.label())
}

/// Sequential fixed-window evaluation for one scope key.
pub struct WindowLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl WindowLimiter {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Evaluate every configured window for `scope`, incrementing each
    /// passed window's counter along the way.
    pub fn check_and_count(
        &self,
        scope: &str,
        limits: &WindowLimits,
    ) -> Result<(), OrchestratorError> {
        let windows = [
            (WindowGranularity::Minute, limits.per_minute),
            (WindowGranularity::Hour, limits.per_hour),
            (WindowGranularity::Day, limits.per_day),
        ];

        for (granularity, limit) in windows {
            let Some(limit) = limit else { continue };
            let now = self.clock.now_unix();
            let key = window_key(scope, granularity, now / granularity.seconds());
            let current = self.store.get(&key);
            if current >= limit {
                warn!(
                    scope,
                    window = granularity.label(),
                    limit,
                    "rate limit exceeded"
                );
                return Err(OrchestratorError::RateLimitExceeded {
                    scope: scope.to_string(),
                    window: granularity.label(),
                    limit,
                });
            }
            self.store
                .incr(&key, Duration::from_secs(granularity.seconds()));
        }
        Ok(())
    }

    /// Current count in the live bucket for `scope`/`granularity`.
    pub fn current_count(&self, scope: &str, granularity: WindowGranularity) -> u64 {
        let now = self.clock.now_unix();
        let key = window_key(scope, granularity, now / granularity.seconds());
        self.store.get(&key)
    }

    /// Unix second at which the live bucket for `granularity` rolls over.
    pub fn next_reset(&self, granularity: WindowGranularity) -> u64 {
        let secs = granularity.seconds();
        (self.clock.now_unix() / secs + 1) * secs
    }
}
