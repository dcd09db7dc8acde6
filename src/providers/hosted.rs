//! Third-party hosted API adapter.
//!
//! Serves two hosted surfaces with separate endpoints and credentials: a
//! chat-completions API for `gpt-*` models and a hosted text-generation API
//! for everything else in this class. Chat responses carry server-side
//! usage; text-generation usage is estimated from whitespace tokens on both
//! sides.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::HostedProviderConfig;
use crate::error::OrchestratorError;
use crate::traits::{DispatchContext, ProviderAdapter, ProviderOutput, ProviderPayload, RawResponse};
use crate::types::{Message, ProviderKind};

use super::{ModelFamily, estimate_tokens, messages_to_prompt};

/// Adapter for third-party hosted APIs.
#[derive(Debug, Clone)]
pub struct ThirdPartyHostedAdapter {
    chat_base_url: String,
    chat_api_key: Option<SecretString>,
    text_base_url: String,
    text_api_key: Option<SecretString>,
    http_client: Client,
}

impl ThirdPartyHostedAdapter {
    pub fn new(config: &HostedProviderConfig, http_client: Client) -> Self {
        Self {
            chat_base_url: config.chat_base_url.clone(),
            chat_api_key: config.chat_api_key.clone(),
            text_base_url: config.text_base_url.clone(),
            text_api_key: config.text_api_key.clone(),
            http_client,
        }
    }

    fn build_chat_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.chat_base_url.trim_end_matches('/')
        )
    }

    fn build_text_url(&self, model_id: &str) -> String {
        format!(
            "{}/models/{}",
            self.text_base_url.trim_end_matches('/'),
            model_id
        )
    }

    fn build_headers(
        api_key: Option<&SecretString>,
    ) -> Result<reqwest::header::HeaderMap, OrchestratorError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        if let Some(api_key) = api_key {
            let auth_value = format!("Bearer {}", api_key.expose_secret());
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&auth_value).map_err(|e| {
                    OrchestratorError::Configuration(format!("invalid hosted api key: {e}"))
                })?,
            );
        }
        Ok(headers)
    }
}

#[async_trait]
impl ProviderAdapter for ThirdPartyHostedAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ThirdPartyHosted
    }

    fn translate_request(
        &self,
        ctx: &DispatchContext<'_>,
        messages: &[Message],
    ) -> Result<ProviderPayload, OrchestratorError> {
        let body = match ModelFamily::detect(&ctx.model.model_id) {
            ModelFamily::OpenAiChat => json!({
                "model": ctx.model.model_id,
                "messages": messages,
                "temperature": ctx.temperature,
                "max_tokens": ctx.max_tokens,
            }),
            ModelFamily::TextGeneration => json!({
                "inputs": messages_to_prompt(messages),
                "parameters": {
                    "temperature": ctx.temperature,
                    "max_length": ctx.max_tokens,
                    "return_full_text": false,
                },
            }),
            ModelFamily::Claude | ModelFamily::Llama => {
                return Err(OrchestratorError::ProviderPermanent {
                    message: format!(
                        "model {} is not served by the hosted APIs",
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
        let (url, api_key) = match ModelFamily::detect(&ctx.model.model_id) {
            ModelFamily::OpenAiChat => (self.build_chat_url(), self.chat_api_key.as_ref()),
            _ => (
                self.build_text_url(&ctx.model.model_id),
                self.text_api_key.as_ref(),
            ),
        };
        let headers = Self::build_headers(api_key)?;

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
                format!("hosted API returned {status}: {response_text}"),
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
            ModelFamily::OpenAiChat => {
                let content = body["choices"][0]["message"]["content"]
                    .as_str()
                    .ok_or_else(|| {
                        OrchestratorError::ParseError(
                            "chat response missing choices[0].message.content".to_string(),
                        )
                    })?;
                Ok(ProviderOutput {
                    content: content.to_string(),
                    input_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
                    output_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0),
                })
            }
            ModelFamily::TextGeneration => {
                // The endpoint answers with a one-element array.
                let generated = body[0]["generated_text"].as_str().ok_or_else(|| {
                    OrchestratorError::ParseError(
                        "text generation response missing generated_text".to_string(),
                    )
                })?;
                let inputs = payload.body["inputs"].as_str().unwrap_or_default();
                Ok(ProviderOutput {
                    content: generated.to_string(),
                    input_tokens: estimate_tokens(inputs),
                    output_tokens: estimate_tokens(generated),
                })
            }
            _ => Err(OrchestratorError::ProviderPermanent {
                message: format!(
                    "model {} is not served by the hosted APIs",
                    ctx.model.model_id
                ),
                status: None,
            }),
        }
    }
}
