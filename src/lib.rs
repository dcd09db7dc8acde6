//! # Charsiu - Multi-Tenant Inference Orchestration
//!
//! Charsiu sits between tenant applications and model providers. It owns the
//! unglamorous middle of every inference call: admission control (fixed-window
//! rate limits and per-model concurrency gates with a priority wait queue),
//! tenant access policies, retrieval-augmented prompt assembly, provider
//! dispatch with bounded retries against a hard deadline, and cost metering.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use charsiu::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::new(OrchestratorConfig::from_env()?)?;
//!
//!     let request = InferenceRequest::new("acme", "gpt-4", "Summarize our Q3 targets.")
//!         .with_user("analyst-7")
//!         .with_priority(RequestPriority::High);
//!     let result = orchestrator.generate(request).await?;
//!     println!(
//!         "{} ({} tokens, ${:.6})",
//!         result.content, result.total_tokens, result.cost_usd
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Admission first, provider last.** A request pays for nothing until its
//!   rate windows, policy check and concurrency slot have all cleared, so
//!   overload is rejected at the cheapest point.
//! - **One trait per collaborator.** Policies ([`traits::TenantPolicySource`]),
//!   retrieval ([`traits::RetrievalStore`]) and providers
//!   ([`traits::ProviderAdapter`]) are trait objects; every one can be swapped
//!   through [`OrchestratorBuilder`] without touching the core.
//! - **Deadlines are global.** One deadline per request covers queueing,
//!   retries and the network; backoff never sleeps past it.

#![deny(unsafe_code)]

pub mod admission;
pub mod assembly;
pub mod config;
pub mod error;
pub mod metering;
pub mod orchestrator;
pub mod policy;
pub mod providers;
pub mod registry;
pub mod retrieval;
pub mod retry;
pub mod telemetry;
pub mod traits;
pub mod types;

pub use error::{OrchestratorError, RequestError};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};

/// Everything a typical caller needs.
pub mod prelude {
    pub use crate::config::{
        OrchestratorConfig, RateLimitConfig, RetrievalConfig, WindowLimits,
    };
    pub use crate::error::{OrchestratorError, RequestError};
    pub use crate::orchestrator::{Orchestrator, OrchestratorBuilder};
    pub use crate::providers::{TrainingJob, TrainingJobReceipt};
    pub use crate::registry::{ModelRegistry, ModelRegistryBuilder};
    pub use crate::retry::RetryPolicy;
    pub use crate::types::{
        InferenceRequest, InferenceResult, Message, MessageRole, ModelDescriptor, ProviderKind,
        RequestPriority, TenantAccessPolicy,
    };
}
