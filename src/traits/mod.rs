//! Collaborator Capability Traits
//!
//! The orchestration core talks to everything outside itself through the
//! traits in this module, one file per capability:
//!
//! - **`policy`** - tenant access policy lookup
//! - **`retrieval`** - the keyed vector/search store
//! - **`provider`** - the translate/invoke/parse surface every provider
//!   adapter implements
//!
//! Implementations live elsewhere (`crate::policy`, `crate::retrieval`,
//! `crate::providers`); tests substitute fakes freely because every
//! orchestrator dependency is one of these trait objects.

pub mod policy;
pub mod provider;
pub mod retrieval;

pub use policy::TenantPolicySource;
pub use provider::{DispatchContext, ProviderAdapter, ProviderOutput, ProviderPayload, RawResponse};
pub use retrieval::{RelevanceScore, RetrievalStore, ScoredChunk};
