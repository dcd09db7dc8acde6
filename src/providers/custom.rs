//! Tenant-dedicated inference cluster adapter.
//!
//! Every tenant in this class owns a cluster reachable at a resolved
//! endpoint: an explicit per-tenant override when configured, otherwise the
//! `{tenant}` template. Clusters expose a plain inference route and a
//! fine-tuning route; training submissions get a long timeout of their own,
//! far outside any inference deadline.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::CustomClusterConfig;
use crate::error::OrchestratorError;
use crate::traits::{DispatchContext, ProviderAdapter, ProviderOutput, ProviderPayload, RawResponse};
use crate::types::{Message, ProviderKind};

use super::{estimate_tokens, messages_to_prompt};

const DEFAULT_BASE_MODEL: &str = "meta-llama/Llama-2-7b-hf";
const TRAINING_TIMEOUT: Duration = Duration::from_secs(3600);

/// Per-tenant cluster endpoint resolution.
#[derive(Debug, Clone)]
pub struct ClusterEndpoints {
    template: String,
    overrides: HashMap<String, String>,
}

impl ClusterEndpoints {
    pub fn new(config: &CustomClusterConfig) -> Self {
        Self {
            template: config.endpoint_template.clone(),
            overrides: config.overrides.clone(),
        }
    }

    /// The tenant's cluster base URL: explicit override first, template
    /// substitution otherwise.
    pub fn resolve(&self, tenant_id: &str) -> String {
        self.overrides
            .get(tenant_id)
            .cloned()
            .unwrap_or_else(|| self.template.replace("{tenant}", tenant_id))
    }
}

/// A fine-tuning job specification with the shipped hyperparameter defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJob {
    pub base_model: String,
    pub dataset_uri: String,
    pub epochs: u32,
    pub learning_rate: f64,
    pub batch_size: u32,
    pub max_length: u32,
}

impl TrainingJob {
    pub fn new(dataset_uri: impl Into<String>) -> Self {
        Self {
            base_model: DEFAULT_BASE_MODEL.to_string(),
            dataset_uri: dataset_uri.into(),
            epochs: 3,
            learning_rate: 2e-5,
            batch_size: 4,
            max_length: 512,
        }
    }

    pub fn with_base_model(mut self, base_model: impl Into<String>) -> Self {
        self.base_model = base_model.into();
        self
    }

    pub fn with_epochs(mut self, epochs: u32) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }
}

/// Acknowledgement returned by a cluster for a submitted training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJobReceipt {
    pub job_id: String,
    pub status: String,
    pub tenant_id: String,
    pub submitted_at: DateTime<Utc>,
}

/// Adapter for tenant-dedicated clusters.
#[derive(Debug, Clone)]
pub struct TenantCustomAdapter {
    endpoints: ClusterEndpoints,
    http_client: Client,
}

impl TenantCustomAdapter {
    pub fn new(config: &CustomClusterConfig, http_client: Client) -> Self {
        Self {
            endpoints: ClusterEndpoints::new(config),
            http_client,
        }
    }

    fn build_inference_url(&self, tenant_id: &str) -> String {
        format!(
            "{}/api/v1/inference",
            self.endpoints.resolve(tenant_id).trim_end_matches('/')
        )
    }

    fn build_training_url(&self, tenant_id: &str) -> String {
        format!(
            "{}/api/v1/training",
            self.endpoints.resolve(tenant_id).trim_end_matches('/')
        )
    }

    /// Submit a fine-tuning job to the tenant's cluster.
    pub async fn submit_training(
        &self,
        tenant_id: &str,
        job: &TrainingJob,
    ) -> Result<TrainingJobReceipt, OrchestratorError> {
        let url = self.build_training_url(tenant_id);
        let response = self
            .http_client
            .post(&url)
            .json(job)
            .timeout(TRAINING_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;
        if !status.is_success() {
            return Err(OrchestratorError::from_status(
                status.as_u16(),
                format!("training submission returned {status}: {response_text}"),
            ));
        }

        let body: serde_json::Value = serde_json::from_str(&response_text)?;
        let receipt = Self::parse_training_receipt(tenant_id, &body)?;
        info!(
            tenant_id,
            job_id = %receipt.job_id,
            base_model = %job.base_model,
            "training job submitted"
        );
        Ok(receipt)
    }

    fn parse_training_receipt(
        tenant_id: &str,
        body: &serde_json::Value,
    ) -> Result<TrainingJobReceipt, OrchestratorError> {
        let job_id = body["job_id"].as_str().ok_or_else(|| {
            OrchestratorError::ParseError("training response missing job_id".to_string())
        })?;
        Ok(TrainingJobReceipt {
            job_id: job_id.to_string(),
            status: body["status"].as_str().unwrap_or("submitted").to_string(),
            tenant_id: tenant_id.to_string(),
            submitted_at: Utc::now(),
        })
    }
}

#[async_trait]
impl ProviderAdapter for TenantCustomAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::TenantCustom
    }

    fn translate_request(
        &self,
        ctx: &DispatchContext<'_>,
        messages: &[Message],
    ) -> Result<ProviderPayload, OrchestratorError> {
        Ok(ProviderPayload::new(json!({
            "prompt": messages_to_prompt(messages),
            "temperature": ctx.temperature,
            "max_tokens": ctx.max_tokens,
            "model": ctx.model.model_id,
        })))
    }

    async fn invoke(
        &self,
        ctx: &DispatchContext<'_>,
        payload: &ProviderPayload,
        timeout: Duration,
    ) -> Result<RawResponse, OrchestratorError> {
        let url = self.build_inference_url(ctx.tenant_id);
        let response = self
            .http_client
            .post(&url)
            .json(&payload.body)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;
        if !status.is_success() {
            return Err(OrchestratorError::from_status(
                status.as_u16(),
                format!("tenant cluster returned {status}: {response_text}"),
            ));
        }

        Ok(RawResponse::new(serde_json::from_str(&response_text)?))
    }

    fn parse_response(
        &self,
        _ctx: &DispatchContext<'_>,
        payload: &ProviderPayload,
        raw: &RawResponse,
    ) -> Result<ProviderOutput, OrchestratorError> {
        let content = raw.body["response"].as_str().ok_or_else(|| {
            OrchestratorError::ParseError("cluster response missing response field".to_string())
        })?;
        let input_tokens = raw.body["input_tokens"].as_u64().unwrap_or_else(|| {
            estimate_tokens(payload.body["prompt"].as_str().unwrap_or_default())
        });
        let output_tokens = raw.body["output_tokens"]
            .as_u64()
            .unwrap_or_else(|| estimate_tokens(content));
        Ok(ProviderOutput {
            content: content.to_string(),
            input_tokens,
            output_tokens,
        })
    }
}
