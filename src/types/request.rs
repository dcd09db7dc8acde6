//! Inference requests, priorities and lifecycle states.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::message::Message;

/// Queue-ordering band for admission waits.
///
/// Bands order `Low < Normal < High < Critical`; the concurrency gate dequeues
/// the highest band first, FIFO within a band.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RequestPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl RequestPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A single inference call.
///
/// Constructed once per call (a fresh `request_id` is assigned on
/// construction) and treated as immutable for the rest of its lifetime; the
/// orchestrator is the sole owner while the request is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Unique id, generated at construction. Every log line, error and
    /// result for this call carries it.
    #[serde(default = "new_request_id")]
    pub request_id: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub model_id: String,
    pub prompt: String,
    #[serde(default)]
    pub conversation_history: Vec<Message>,
    /// Whether to augment the prompt with retrieved context.
    #[serde(default = "default_use_retrieval")]
    pub use_retrieval: bool,
    /// Overrides the model's default temperature when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Overrides the model's max output tokens when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub priority: RequestPriority,
    /// Overall deadline covering queue wait and dispatch.
    #[serde(with = "duration_secs", default = "default_timeout")]
    pub timeout: Duration,
}

fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_use_retrieval() -> bool {
    true
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

impl InferenceRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        model_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            request_id: new_request_id(),
            tenant_id: tenant_id.into(),
            user_id: None,
            model_id: model_id.into(),
            prompt: prompt.into(),
            conversation_history: Vec::new(),
            use_retrieval: true,
            temperature: None,
            max_tokens: None,
            priority: RequestPriority::default(),
            timeout: default_timeout(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.conversation_history = history;
        self
    }

    pub fn with_retrieval(mut self, use_retrieval: bool) -> Self {
        self.use_retrieval = use_retrieval;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Scope key for user-level rate windows: `tenant:user`, with `anonymous`
    /// standing in when no user id was supplied.
    pub fn user_scope(&self) -> String {
        match &self.user_id {
            Some(user) => format!("{}:{}", self.tenant_id, user),
            None => format!("{}:anonymous", self.tenant_id),
        }
    }
}

/// States a request moves through, used in spans and debug logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Received,
    Admitted,
    Rejected,
    ContextBuilt,
    Dispatched,
    Retrying,
    Completed,
    Failed,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Admitted => "admitted",
            Self::Rejected => "rejected",
            Self::ContextBuilt => "context_built",
            Self::Dispatched => "dispatched",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Serialize `Duration` as whole seconds, the way the wire API expresses
/// timeouts.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
