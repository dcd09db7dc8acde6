//! Model descriptors and tenant access policies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three provider backend classes a model can be served by.
///
/// The set is closed on purpose: dispatch is a `match` over this enum, and
/// adding a backend class means adding an adapter, never touching the
/// orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Managed model runtime operated by a cloud vendor.
    CloudManaged,
    /// Third-party hosted inference API.
    ThirdPartyHosted,
    /// Model deployed on the tenant's dedicated cluster.
    TenantCustom,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CloudManaged => "cloud_managed",
            Self::ThirdPartyHosted => "third_party_hosted",
            Self::TenantCustom => "tenant_custom",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of one routable model.
///
/// Descriptors are owned by the [`ModelRegistry`](crate::registry::ModelRegistry)
/// and never mutated after load, so routing decisions are deterministic for a
/// given registry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub model_id: String,
    pub provider_kind: ProviderKind,
    /// Upper bound on generated tokens for this model.
    pub max_tokens: u32,
    /// Sampling temperature used when the request does not override it.
    pub default_temperature: f32,
    /// Price in USD per 1000 input tokens.
    pub cost_per_1k_input: f64,
    /// Price in USD per 1000 output tokens.
    pub cost_per_1k_output: f64,
    /// Maximum in-flight calls before requests queue.
    pub max_concurrent: usize,
    /// Catalog scheduling priority, 1 = highest.
    pub priority: u8,
}

impl ModelDescriptor {
    pub fn new(model_id: impl Into<String>, provider_kind: ProviderKind) -> Self {
        Self {
            model_id: model_id.into(),
            provider_kind,
            max_tokens: 4000,
            default_temperature: 0.7,
            cost_per_1k_input: 0.0,
            cost_per_1k_output: 0.0,
            max_concurrent: 10,
            priority: 1,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = temperature;
        self
    }

    pub fn with_cost_per_1k(mut self, input: f64, output: f64) -> Self {
        self.cost_per_1k_input = input;
        self.cost_per_1k_output = output;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Human-readable name derived from the id: the last dot-separated
    /// segment with dashes spaced out (`meta.llama-2-70b-chat-v1` →
    /// `llama 2 70b chat v1`).
    pub fn display_name(&self) -> String {
        self.model_id
            .rsplit('.')
            .next()
            .unwrap_or(&self.model_id)
            .replace('-', " ")
    }
}

/// Per-tenant access rules, fetched from the policy collaborator on every
/// request and never mutated by the core.
///
/// `"*"` in either list matches everything, mirroring the permissive default
/// most deployments start from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantAccessPolicy {
    pub tenant_id: String,
    /// Model ids the tenant may use; `"*"` allows all.
    pub allowed_models: Vec<String>,
    /// Provider kinds (`as_str` form) the tenant may use; `"*"` allows all.
    pub allowed_providers: Vec<String>,
    /// Whether the tenant may submit custom training jobs.
    #[serde(default)]
    pub allow_custom_training: bool,
}

impl TenantAccessPolicy {
    /// The permissive default: all models, all providers, no training.
    pub fn allow_all(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            allowed_models: vec!["*".to_string()],
            allowed_providers: vec!["*".to_string()],
            allow_custom_training: false,
        }
    }

    /// A policy that allows nothing; handed out for unknown tenants by
    /// strict policy sources.
    pub fn deny_all(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            allowed_models: Vec::new(),
            allowed_providers: Vec::new(),
            allow_custom_training: false,
        }
    }

    pub fn with_allowed_models(mut self, models: Vec<String>) -> Self {
        self.allowed_models = models;
        self
    }

    pub fn with_allowed_providers(mut self, providers: Vec<String>) -> Self {
        self.allowed_providers = providers;
        self
    }

    pub fn with_custom_training(mut self, allow: bool) -> Self {
        self.allow_custom_training = allow;
        self
    }

    pub fn allows_model(&self, model_id: &str) -> bool {
        self.allowed_models
            .iter()
            .any(|m| m == "*" || m == model_id)
    }

    pub fn allows_provider(&self, kind: ProviderKind) -> bool {
        self.allowed_providers
            .iter()
            .any(|p| p == "*" || p == kind.as_str())
    }

    /// Both the model id and its provider kind must be allowed.
    pub fn allows(&self, descriptor: &ModelDescriptor) -> bool {
        self.allows_model(&descriptor.model_id) && self.allows_provider(descriptor.provider_kind)
    }
}
