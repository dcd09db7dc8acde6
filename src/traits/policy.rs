//! Tenant policy capability.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::OrchestratorError;
use crate::types::TenantAccessPolicy;

/// Source of per-tenant access policies.
///
/// Fetched once per request; implementations must answer without unbounded
/// blocking. Slow backends should be wrapped in
/// [`CachedPolicySource`](crate::policy::CachedPolicySource).
#[async_trait]
pub trait TenantPolicySource: Send + Sync {
    async fn get_policy(&self, tenant_id: &str) -> Result<TenantAccessPolicy, OrchestratorError>;
}

#[async_trait]
impl<T: TenantPolicySource + ?Sized> TenantPolicySource for Arc<T> {
    async fn get_policy(&self, tenant_id: &str) -> Result<TenantAccessPolicy, OrchestratorError> {
        (**self).get_policy(tenant_id).await
    }
}
