//! Orchestrator Configuration
//!
//! Plain serde-friendly config structs with `Default` impls carrying the
//! shipped deployment defaults, `with_*` builders for programmatic setup, and
//! `from_env()` for `CHARSIU_*` environment overrides. Provider credentials
//! are wrapped in [`SecretString`] and only exposed at the single point an
//! auth header is built.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::OrchestratorError;
use crate::retry::RetryPolicy;

/// Fixed-window limits for one rate-limit scope. `None` disables a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowLimits {
    pub per_minute: Option<u64>,
    pub per_hour: Option<u64>,
    pub per_day: Option<u64>,
}

impl WindowLimits {
    pub fn minute_and_hour(per_minute: u64, per_hour: u64) -> Self {
        Self {
            per_minute: Some(per_minute),
            per_hour: Some(per_hour),
            per_day: None,
        }
    }

    pub fn minute_hour_day(per_minute: u64, per_hour: u64, per_day: u64) -> Self {
        Self {
            per_minute: Some(per_minute),
            per_hour: Some(per_hour),
            per_day: Some(per_day),
        }
    }
}

/// Admission limits for both scopes plus the per-model queue bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Limits keyed by `tenant:user`.
    pub user: WindowLimits,
    /// Limits keyed by tenant alone.
    pub tenant: WindowLimits,
    /// Bounded wait-queue capacity per model.
    pub queue_capacity: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            user: WindowLimits::minute_and_hour(1000, 10_000),
            tenant: WindowLimits::minute_hour_day(100, 1000, 10_000),
            queue_capacity: 1000,
        }
    }
}

/// Context retrieval knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum snippets injected into a prompt.
    pub limit: usize,
    /// Snippets below this similarity are dropped.
    pub similarity_threshold: f32,
    /// Persist successful interactions back into the store.
    pub persist_interactions: bool,
    /// Prompts at or below this length are not worth persisting.
    pub persist_min_prompt_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            similarity_threshold: 0.7,
            persist_interactions: true,
            persist_min_prompt_chars: 50,
        }
    }
}

/// LRU cache sizing for the tenant policy source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyCacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for PolicyCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            ttl_secs: 3600,
        }
    }
}

impl PolicyCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Cloud-managed runtime endpoint (Bedrock-style invoke gateway).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CloudProviderConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
}

impl Default for CloudProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://bedrock-runtime.us-east-1.amazonaws.com".to_string(),
            api_key: None,
        }
    }
}

/// Third-party hosted APIs: one chat-completions endpoint and one
/// text-generation endpoint, each with its own credential.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostedProviderConfig {
    pub chat_base_url: String,
    pub chat_api_key: Option<SecretString>,
    pub text_base_url: String,
    pub text_api_key: Option<SecretString>,
}

impl Default for HostedProviderConfig {
    fn default() -> Self {
        Self {
            chat_base_url: "https://api.openai.com".to_string(),
            chat_api_key: None,
            text_base_url: "https://api-inference.huggingface.co".to_string(),
            text_api_key: None,
        }
    }
}

/// Tenant-dedicated cluster resolution: explicit overrides first, then the
/// `{tenant}` template.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CustomClusterConfig {
    pub endpoint_template: String,
    pub overrides: HashMap<String, String>,
}

impl Default for CustomClusterConfig {
    fn default() -> Self {
        Self {
            endpoint_template: "https://tenant-{tenant}-cluster.internal".to_string(),
            overrides: HashMap::new(),
        }
    }
}

/// Per-provider connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub cloud: CloudProviderConfig,
    pub hosted: HostedProviderConfig,
    pub custom: CustomClusterConfig,
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub rate_limits: RateLimitConfig,
    pub retrieval: RetrievalConfig,
    pub policy_cache: PolicyCacheConfig,
    /// Conversation turns kept when assembling provider requests.
    pub history_window: usize,
    pub providers: ProvidersConfig,
    /// Backoff curve for transient provider failures. Not read from config
    /// files; set programmatically or via `CHARSIU_RETRY_*`.
    #[serde(skip)]
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self {
            rate_limits: RateLimitConfig::default(),
            retrieval: RetrievalConfig::default(),
            policy_cache: PolicyCacheConfig::default(),
            history_window: 20,
            providers: ProvidersConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_rate_limits(mut self, rate_limits: RateLimitConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn with_history_window(mut self, turns: usize) -> Self {
        self.history_window = turns;
        self
    }

    pub fn with_providers(mut self, providers: ProvidersConfig) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load defaults, then apply `CHARSIU_*` environment overrides.
    pub fn from_env() -> Result<Self, OrchestratorError> {
        Self::with_env_lookup(|key| std::env::var(key).ok())
    }

    fn with_env_lookup<F>(lookup: F) -> Result<Self, OrchestratorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(v) = parse_env(&lookup, "CHARSIU_USER_RATE_LIMIT_PER_MINUTE")? {
            config.rate_limits.user.per_minute = Some(v);
        }
        if let Some(v) = parse_env(&lookup, "CHARSIU_USER_RATE_LIMIT_PER_HOUR")? {
            config.rate_limits.user.per_hour = Some(v);
        }
        if let Some(v) = parse_env(&lookup, "CHARSIU_TENANT_RATE_LIMIT_PER_MINUTE")? {
            config.rate_limits.tenant.per_minute = Some(v);
        }
        if let Some(v) = parse_env(&lookup, "CHARSIU_TENANT_RATE_LIMIT_PER_HOUR")? {
            config.rate_limits.tenant.per_hour = Some(v);
        }
        if let Some(v) = parse_env(&lookup, "CHARSIU_TENANT_RATE_LIMIT_PER_DAY")? {
            config.rate_limits.tenant.per_day = Some(v);
        }
        if let Some(v) = parse_env(&lookup, "CHARSIU_QUEUE_CAPACITY")? {
            config.rate_limits.queue_capacity = v;
        }
        if let Some(v) = parse_env(&lookup, "CHARSIU_HISTORY_WINDOW")? {
            config.history_window = v;
        }
        if let Some(v) = parse_env(&lookup, "CHARSIU_RETRIEVAL_LIMIT")? {
            config.retrieval.limit = v;
        }
        if let Some(v) = parse_env(&lookup, "CHARSIU_SIMILARITY_THRESHOLD")? {
            config.retrieval.similarity_threshold = v;
        }
        if let Some(v) = parse_env(&lookup, "CHARSIU_RETRY_MAX_ATTEMPTS")? {
            config.retry = config.retry.with_max_attempts(v);
        }
        if let Some(v) = parse_env::<u64, _>(&lookup, "CHARSIU_RETRY_INITIAL_DELAY_MS")? {
            config.retry = config.retry.with_initial_delay(Duration::from_millis(v));
        }
        if let Some(v) = parse_env::<u64, _>(&lookup, "CHARSIU_RETRY_MAX_DELAY_MS")? {
            config.retry = config.retry.with_max_delay(Duration::from_millis(v));
        }

        if let Some(v) = lookup("CHARSIU_CLOUD_BASE_URL") {
            config.providers.cloud.base_url = v;
        }
        if let Some(v) = lookup("CHARSIU_CLOUD_API_KEY") {
            config.providers.cloud.api_key = Some(v.into());
        }
        if let Some(v) = lookup("CHARSIU_HOSTED_CHAT_BASE_URL") {
            config.providers.hosted.chat_base_url = v;
        }
        if let Some(v) = lookup("CHARSIU_HOSTED_CHAT_API_KEY") {
            config.providers.hosted.chat_api_key = Some(v.into());
        }
        if let Some(v) = lookup("CHARSIU_HOSTED_TEXT_BASE_URL") {
            config.providers.hosted.text_base_url = v;
        }
        if let Some(v) = lookup("CHARSIU_HOSTED_TEXT_API_KEY") {
            config.providers.hosted.text_api_key = Some(v.into());
        }
        if let Some(v) = lookup("CHARSIU_CUSTOM_ENDPOINT_TEMPLATE") {
            config.providers.custom.endpoint_template = v;
        }

        Ok(config)
    }
}

fn parse_env<T, F>(lookup: &F, key: &str) -> Result<Option<T>, OrchestratorError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| OrchestratorError::Configuration(format!("invalid {key}: {e}"))),
        None => Ok(None),
    }
}
