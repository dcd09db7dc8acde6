//! Cloud-managed model runtime adapter.
//!
//! Models under this class are invoked through a per-model endpoint
//! (`POST {base}/model/{model_id}/invoke`) and speak one of two body
//! dialects, picked by model family: the Claude messages dialect or the
//! Llama prompt dialect. The gateway credential, when configured, rides as a
//! bearer token and never appears in the payload.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::CloudProviderConfig;
use crate::error::OrchestratorError;
use crate::traits::{DispatchContext, ProviderAdapter, ProviderOutput, ProviderPayload, RawResponse};
use crate::types::{Message, ProviderKind};

use super::{ModelFamily, estimate_tokens, messages_to_prompt};

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
// f64 so the serialized value is exactly 0.9.
const LLAMA_TOP_P: f64 = 0.9;

/// Adapter for the cloud-managed runtime.
#[derive(Debug, Clone)]
pub struct CloudManagedAdapter {
    base_url: String,
    api_key: Option<SecretString>,
    http_client: Client,
}

impl CloudManagedAdapter {
    pub fn new(config: &CloudProviderConfig, http_client: Client) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            http_client,
        }
    }

    fn build_url(&self, model_id: &str) -> String {
        format!(
            "{}/model/{}/invoke",
            self.base_url.trim_end_matches('/'),
            model_id
        )
    }

    fn build_headers(&self) -> Result<reqwest::header::HeaderMap, OrchestratorError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        if let Some(api_key) = &self.api_key {
            let auth_value = format!("Bearer {}", api_key.expose_secret());
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&auth_value).map_err(|e| {
                    OrchestratorError::Configuration(format!("invalid cloud api key: {e}"))
                })?,
            );
        }
        Ok(headers)
    }
}

#[async_trait]
impl ProviderAdapter for CloudManagedAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CloudManaged
    }

    fn translate_request(
        &self,
        ctx: &DispatchContext<'_>,
        messages: &[Message],
    ) -> Result<ProviderPayload, OrchestratorError> {
        let body = match ModelFamily::detect(&ctx.model.model_id) {
            ModelFamily::Claude => json!({
                "anthropic_version": ANTHROPIC_VERSION,
                "max_tokens": ctx.max_tokens,
                "temperature": ctx.temperature,
                "messages": messages,
            }),
            ModelFamily::Llama => json!({
                "prompt": messages_to_prompt(messages),
                "max_gen_len": ctx.max_tokens,
                "temperature": ctx.temperature,
                "top_p": LLAMA_TOP_P,
            }),
            ModelFamily::OpenAiChat | ModelFamily::TextGeneration => {
                return Err(OrchestratorError::ProviderPermanent {
                    message: format!(
                        "model {} is not served by the cloud runtime",
                        ctx.model.model_id
                    ),
                    status: None,
                });
            }
        };
        Ok(ProviderPayload::new(body))
    }

    async fn invoke(
        &self,
        ctx: &DispatchContext<'_>,
        payload: &ProviderPayload,
        timeout: Duration,
    ) -> Result<RawResponse, OrchestratorError> {
        let url = self.build_url(&ctx.model.model_id);
        let headers = self.build_headers()?;

        let response = self
            .http_client
            .post(&url)
            .headers(headers)
            .json(&payload.body)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;
        if !status.is_success() {
            return Err(OrchestratorError::from_status(
                status.as_u16(),
                format!("cloud runtime returned {status}: {response_text}"),
            ));
        }

        Ok(RawResponse::new(serde_json::from_str(&response_text)?))
    }

    fn parse_response(
        &self,
        ctx: &DispatchContext<'_>,
        payload: &ProviderPayload,
        raw: &RawResponse,
    ) -> Result<ProviderOutput, OrchestratorError> {
        let body = &raw.body;
        match ModelFamily::detect(&ctx.model.model_id) {
            ModelFamily::Claude => {
                let content = body["content"][0]["text"].as_str().ok_or_else(|| {
                    OrchestratorError::ParseError(
                        "cloud claude response missing content[0].text".to_string(),
                    )
                })?;
                Ok(ProviderOutput {
                    content: content.to_string(),
                    input_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0),
                    output_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0),
                })
            }
            ModelFamily::Llama => {
                let generation = body["generation"].as_str().ok_or_else(|| {
                    OrchestratorError::ParseError(
                        "cloud llama response missing generation".to_string(),
                    )
                })?;
                // Older runtime versions omit the counts; estimate from the
                // text we sent and received.
                let input_tokens = body["prompt_token_count"].as_u64().unwrap_or_else(|| {
                    estimate_tokens(payload.body["prompt"].as_str().unwrap_or_default())
                });
                let output_tokens = body["generation_token_count"]
                    .as_u64()
                    .unwrap_or_else(|| estimate_tokens(generation));
                Ok(ProviderOutput {
                    content: generation.to_string(),
                    input_tokens,
                    output_tokens,
                })
            }
            _ => Err(OrchestratorError::ProviderPermanent {
                message: format!(
                    "model {} is not served by the cloud runtime",
                    ctx.model.model_id
                ),
                status: None,
            }),
        }
    }
}
