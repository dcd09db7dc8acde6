//! Admission control.
//!
//! Every request passes through here before any provider work happens:
//! fixed-window rate limits for the user scope and the tenant scope, then a
//! per-model concurrency gate with a bounded priority wait queue. A request
//! rejected at admission has cost the process nothing but counter bumps.
//!
//! [`window`] holds the fixed-window limiter and its counter store;
//! [`concurrency`] holds the per-model gates. [`AdmissionController`] owns
//! one limiter and lazily creates one gate per model.

pub mod concurrency;
pub mod window;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::OrchestratorError;
use crate::types::{ModelDescriptor, RequestPriority};

pub use concurrency::{ConcurrencyGate, SlotPermit};
pub use window::{
    Clock, CounterStore, InMemoryCounterStore, ManualClock, SystemClock, WindowGranularity,
    WindowLimiter,
};

/// Live counts and bucket rollover times for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub scope: String,
    pub minute_count: u64,
    pub hour_count: u64,
    pub minute_limit: Option<u64>,
    pub hour_limit: Option<u64>,
    pub minute_reset: DateTime<Utc>,
    pub hour_reset: DateTime<Utc>,
}

/// Front door for the orchestrator: rate windows plus concurrency gates.
pub struct AdmissionController {
    limiter: WindowLimiter,
    limits: RateLimitConfig,
    gates: Mutex<HashMap<String, Arc<ConcurrencyGate>>>,
}

impl AdmissionController {
    /// Controller on the system clock with in-process counters.
    pub fn new(limits: RateLimitConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::new(clock.clone()));
        Self::with_services(limits, store, clock)
    }

    /// Controller over an explicit counter store and clock. Tests drive this
    /// with [`ManualClock`]; a deployment can point it at a shared store.
    pub fn with_services(
        limits: RateLimitConfig,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter: WindowLimiter::new(store, clock),
            limits,
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate the user-scope windows, then the tenant-scope windows,
    /// counting each window that passes.
    pub fn check_rate_limits(
        &self,
        tenant_id: &str,
        user_scope: &str,
    ) -> Result<(), OrchestratorError> {
        self.limiter.check_and_count(user_scope, &self.limits.user)?;
        self.limiter.check_and_count(tenant_id, &self.limits.tenant)?;
        Ok(())
    }

    /// Take an in-flight slot on the model's gate, queueing until `deadline`.
    pub async fn acquire_slot(
        &self,
        model: &ModelDescriptor,
        priority: RequestPriority,
        deadline: Instant,
    ) -> Result<SlotPermit, OrchestratorError> {
        let gate = self.gate(model);
        gate.acquire(priority, deadline).await
    }

    fn gate(&self, model: &ModelDescriptor) -> Arc<ConcurrencyGate> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        gates
            .entry(model.model_id.clone())
            .or_insert_with(|| {
                Arc::new(ConcurrencyGate::new(
                    &model.model_id,
                    model.max_concurrent,
                    self.limits.queue_capacity,
                ))
            })
            .clone()
    }

    /// Live counts and reset times for the user scope, without counting the
    /// probe itself.
    pub fn rate_limit_status(&self, scope: &str) -> RateLimitStatus {
        RateLimitStatus {
            scope: scope.to_string(),
            minute_count: self.limiter.current_count(scope, WindowGranularity::Minute),
            hour_count: self.limiter.current_count(scope, WindowGranularity::Hour),
            minute_limit: self.limits.user.per_minute,
            hour_limit: self.limits.user.per_hour,
            minute_reset: reset_datetime(self.limiter.next_reset(WindowGranularity::Minute)),
            hour_reset: reset_datetime(self.limiter.next_reset(WindowGranularity::Hour)),
        }
    }
}

fn reset_datetime(unix_secs: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(unix_secs as i64, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
