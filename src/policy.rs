//! Tenant Policy Sources
//!
//! Two ready-made [`TenantPolicySource`] implementations: a fixed in-memory
//! table for tests and simple deployments, and an LRU + TTL caching decorator
//! for slow backends (the policy lookup sits on every request's hot path).

use async_trait::async_trait;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::OrchestratorError;
use crate::traits::TenantPolicySource;
use crate::types::TenantAccessPolicy;

/// Fixed in-memory policy table.
///
/// Unknown tenants get the permissive allow-all policy by default (the
/// original deployment's starting point); `strict()` hands them a deny-all
/// policy instead so the regular access check rejects with the real model id.
#[derive(Debug, Default)]
pub struct StaticPolicySource {
    policies: HashMap<String, TenantAccessPolicy>,
    strict: bool,
}

impl StaticPolicySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unknown tenants are denied everything instead of allowed everything.
    pub fn strict() -> Self {
        Self {
            policies: HashMap::new(),
            strict: true,
        }
    }

    pub fn with_policy(mut self, policy: TenantAccessPolicy) -> Self {
        self.policies.insert(policy.tenant_id.clone(), policy);
        self
    }
}

#[async_trait]
impl TenantPolicySource for StaticPolicySource {
    async fn get_policy(&self, tenant_id: &str) -> Result<TenantAccessPolicy, OrchestratorError> {
        if let Some(policy) = self.policies.get(tenant_id) {
            return Ok(policy.clone());
        }
        if self.strict {
            Ok(TenantAccessPolicy::deny_all(tenant_id))
        } else {
            Ok(TenantAccessPolicy::allow_all(tenant_id))
        }
    }
}

/// LRU + TTL caching decorator over any policy source.
///
/// Entries older than `ttl` are refetched; the inner call happens outside the
/// cache lock so a slow backend never serializes unrelated tenants.
pub struct CachedPolicySource<S> {
    inner: S,
    cache: Mutex<LruCache<String, (TenantAccessPolicy, Instant)>>,
    ttl: Duration,
}

impl<S> CachedPolicySource<S> {
    pub fn new(inner: S, capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }
}

#[async_trait]
impl<S: TenantPolicySource> TenantPolicySource for CachedPolicySource<S> {
    async fn get_policy(&self, tenant_id: &str) -> Result<TenantAccessPolicy, OrchestratorError> {
        {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((policy, fetched_at)) = cache.get(tenant_id) {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(policy.clone());
                }
            }
        }

        let fresh = self.inner.get_policy(tenant_id).await?;
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put(tenant_id.to_string(), (fresh.clone(), Instant::now()));
        Ok(fresh)
    }
}
