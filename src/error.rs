//! Error Types
//!
//! One crate-wide taxonomy for everything the orchestration path can produce,
//! plus the `RequestError` wrapper that tags a terminal failure with the
//! request it belongs to. Classification helpers drive the retry loop: only
//! transient provider failures are ever retried.

use thiserror::Error;

/// Errors produced on the orchestration path.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// A fixed-window rate limit rejected the request.
    #[error("rate limit exceeded for {scope} ({window} window, limit {limit})")]
    RateLimitExceeded {
        /// Scope key the limit applies to (`tenant` or `tenant:user`).
        scope: String,
        /// Window granularity that tripped (`minute`, `hour` or `day`).
        window: &'static str,
        limit: u64,
    },

    /// The model's wait queue is full; the request was never queued.
    #[error("capacity exceeded for model {model_id} (queue of {queue_capacity} is full)")]
    CapacityExceeded {
        model_id: String,
        queue_capacity: usize,
    },

    /// The tenant's policy does not allow this model or its provider.
    #[error("tenant {tenant_id} is not allowed to use model {model_id}")]
    AccessDenied {
        tenant_id: String,
        model_id: String,
    },

    /// The model id is not present in the registry.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// Transient provider failure (network, 429, 5xx). Retryable.
    #[error("transient provider error: {message}")]
    ProviderTransient {
        message: String,
        status: Option<u16>,
    },

    /// Permanent provider failure (bad request, auth, unsupported model
    /// family). Never retried.
    #[error("permanent provider error: {message}")]
    ProviderPermanent {
        message: String,
        status: Option<u16>,
    },

    /// The provider answered but the body did not have the expected shape.
    #[error("failed to parse provider response: {0}")]
    ParseError(String),

    /// The request's deadline elapsed. Aborts any remaining retry attempts.
    #[error("deadline exceeded {phase}")]
    Timeout {
        /// Where the deadline hit (queued, in flight, backing off).
        phase: &'static str,
    },

    /// The retrieval store failed. Never fatal to the primary request path.
    #[error("retrieval store unavailable: {0}")]
    RetrievalUnavailable(String),

    /// The tenant's policy does not permit custom model training.
    #[error("tenant {0} is not authorized for custom model training")]
    TrainingDenied(String),

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invariant violation inside the orchestrator itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Whether the retry loop may attempt this operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderTransient { .. })
    }

    /// Short stable label for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => "rate_limit",
            Self::CapacityExceeded { .. } => "capacity",
            Self::AccessDenied { .. } => "access_denied",
            Self::UnsupportedModel(_) => "unsupported_model",
            Self::ProviderTransient { .. } => "provider_transient",
            Self::ProviderPermanent { .. } => "provider_permanent",
            Self::ParseError(_) => "parse",
            Self::Timeout { .. } => "timeout",
            Self::RetrievalUnavailable(_) => "retrieval",
            Self::TrainingDenied(_) => "training_denied",
            Self::Configuration(_) => "configuration",
            Self::Internal(_) => "internal",
        }
    }

    /// Map an HTTP status from a provider into the taxonomy: 429 and 5xx are
    /// transient, everything else in the 4xx range is permanent.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 || status >= 500 {
            Self::ProviderTransient {
                message,
                status: Some(status),
            }
        } else {
            Self::ProviderPermanent {
                message,
                status: Some(status),
            }
        }
    }
}

impl From<reqwest::Error> for OrchestratorError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        // Connect/reset/timeout at the transport level: worth another attempt.
        Self::ProviderTransient {
            message: err.to_string(),
            status: None,
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

/// A terminal failure tagged with the request it belongs to, for correlation
/// across logs and caller-side handling.
#[derive(Error, Debug)]
#[error("request {request_id} failed: {kind}")]
pub struct RequestError {
    pub request_id: String,
    pub kind: OrchestratorError,
}

impl RequestError {
    pub fn new(request_id: impl Into<String>, kind: OrchestratorError) -> Self {
        Self {
            request_id: request_id.into(),
            kind,
        }
    }

    /// Category of the underlying error.
    pub fn category(&self) -> &'static str {
        self.kind.category()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        let err = OrchestratorError::ProviderTransient {
            message: "connection reset".to_string(),
            status: None,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn permanent_and_parse_errors_are_not_retryable() {
        let permanent = OrchestratorError::ProviderPermanent {
            message: "invalid api key".to_string(),
            status: Some(401),
        };
        let parse = OrchestratorError::ParseError("missing field".to_string());
        let timeout = OrchestratorError::Timeout { phase: "in flight" };
        assert!(!permanent.is_retryable());
        assert!(!parse.is_retryable());
        assert!(!timeout.is_retryable());
    }

    #[test]
    fn status_mapping_follows_retryability_rules() {
        assert!(OrchestratorError::from_status(429, "slow down").is_retryable());
        assert!(OrchestratorError::from_status(503, "overloaded").is_retryable());
        assert!(!OrchestratorError::from_status(400, "bad request").is_retryable());
        assert!(!OrchestratorError::from_status(401, "unauthorized").is_retryable());
    }

    #[test]
    fn request_error_display_includes_request_id() {
        let err = RequestError::new(
            "req-123",
            OrchestratorError::UnsupportedModel("no-such-model".to_string()),
        );
        let rendered = err.to_string();
        assert!(rendered.contains("req-123"));
        assert!(rendered.contains("no-such-model"));
        assert_eq!(err.category(), "unsupported_model");
    }

    #[test]
    fn rate_limit_display_names_the_window() {
        let err = OrchestratorError::RateLimitExceeded {
            scope: "acme:42".to_string(),
            window: "minute",
            limit: 100,
        };
        assert!(err.to_string().contains("minute"));
        assert_eq!(err.category(), "rate_limit");
    }
}
