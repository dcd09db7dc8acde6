//! Provider adapter capability.
//!
//! Every backend class implements the same three-step surface: translate the
//! normalized message sequence into a provider body, invoke the endpoint, and
//! parse the raw reply back into content plus token counts. The dispatcher
//! drives retries around `invoke` only; translate and parse failures are
//! permanent.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::OrchestratorError;
use crate::types::{Message, ModelDescriptor, ProviderKind};

/// Per-request context handed to every adapter operation.
///
/// `temperature` and `max_tokens` are already resolved (request override or
/// model default) by the time an adapter sees them.
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext<'a> {
    pub request_id: &'a str,
    pub tenant_id: &'a str,
    pub model: &'a ModelDescriptor,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Provider-specific request body, opaque to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPayload {
    pub body: serde_json::Value,
}

impl ProviderPayload {
    pub fn new(body: serde_json::Value) -> Self {
        Self { body }
    }
}

/// Raw provider reply, prior to normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub body: serde_json::Value,
}

impl RawResponse {
    pub fn new(body: serde_json::Value) -> Self {
        Self { body }
    }
}

/// Normalized output of one provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutput {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The capability surface of one provider backend class.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which backend class this adapter serves.
    fn kind(&self) -> ProviderKind;

    /// Build the provider-specific body. Total over any well-formed message
    /// sequence up to the provider's documented limits; an unknown model
    /// family is a permanent error.
    fn translate_request(
        &self,
        ctx: &DispatchContext<'_>,
        messages: &[Message],
    ) -> Result<ProviderPayload, OrchestratorError>;

    /// One network call, bounded by `timeout`. Never blocks the runtime;
    /// transport and HTTP-status failures map into the transient/permanent
    /// taxonomy.
    async fn invoke(
        &self,
        ctx: &DispatchContext<'_>,
        payload: &ProviderPayload,
        timeout: Duration,
    ) -> Result<RawResponse, OrchestratorError>;

    /// Normalize the raw body into content and token counts. The sent
    /// payload is available for backends that estimate usage from the
    /// request text.
    fn parse_response(
        &self,
        ctx: &DispatchContext<'_>,
        payload: &ProviderPayload,
        raw: &RawResponse,
    ) -> Result<ProviderOutput, OrchestratorError>;
}
