//! The normalized inference result.

use serde::{Deserialize, Serialize};

use super::model::ProviderKind;

/// Successful outcome of one orchestrated request.
///
/// Produced exactly once per successful request; `request_id` matches the
/// originating [`InferenceRequest`](super::request::InferenceRequest) and
/// `total_tokens` is always `input_tokens + output_tokens`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub request_id: String,
    pub content: String,
    pub provider_kind: ProviderKind,
    pub model_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    /// Metered cost in USD, rounded to 6 decimal places.
    pub cost_usd: f64,
    /// Wall time from receipt to completion.
    pub total_latency_ms: f64,
    /// Time spent waiting for the model's concurrency slot.
    pub queue_time_ms: f64,
    /// Time spent building context and talking to the provider.
    pub processing_time_ms: f64,
}
