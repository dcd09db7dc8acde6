//! Request orchestration.
//!
//! [`Orchestrator`] owns the full lifecycle of one inference request:
//! admission (rate windows, tenant policy, per-model concurrency slot),
//! context retrieval and prompt assembly, provider dispatch with bounded
//! retries, then metering on the way out. Every collaborator arrives through
//! [`OrchestratorBuilder`], and everything behind a trait can be substituted
//! in tests.
//!
//! Admission order: rate windows are checked before the registry and policy
//! lookups, and the concurrency slot is taken last, so a request that will
//! be denied never occupies capacity while it waits.

use std::sync::Arc;

use reqwest::Client;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::admission::{
    AdmissionController, Clock, CounterStore, InMemoryCounterStore, RateLimitStatus, SystemClock,
};
use crate::assembly::ConversationAssembler;
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, RequestError};
use crate::metering::{self, MetricsAggregator, MetricsSnapshot};
use crate::policy::{CachedPolicySource, StaticPolicySource};
use crate::providers::{
    CloudManagedAdapter, ProviderDispatcher, TenantCustomAdapter, ThirdPartyHostedAdapter,
    TrainingJob, TrainingJobReceipt,
};
use crate::registry::ModelRegistry;
use crate::retrieval::{ContextRetriever, InMemoryRetrievalStore, Interaction};
use crate::traits::{DispatchContext, ProviderAdapter, RetrievalStore, TenantPolicySource};
use crate::types::{InferenceRequest, InferenceResult, ModelDescriptor, RequestState};

/// The orchestration core. One instance serves all tenants; methods take
/// `&self` and the whole struct is `Send + Sync`, so deployments share it
/// behind an `Arc`.
pub struct Orchestrator {
    registry: ModelRegistry,
    policies: CachedPolicySource<Arc<dyn TenantPolicySource>>,
    admission: AdmissionController,
    retriever: Arc<ContextRetriever>,
    store: Arc<dyn RetrievalStore>,
    assembler: ConversationAssembler,
    dispatcher: ProviderDispatcher,
    trainer: Arc<TenantCustomAdapter>,
    metrics: MetricsAggregator,
}

static_assertions::assert_impl_all!(Orchestrator: Send, Sync);

impl Orchestrator {
    /// An orchestrator over the given config with default collaborators:
    /// built-in catalog, permissive policies, in-memory retrieval store and
    /// in-process rate counters.
    pub fn new(config: OrchestratorConfig) -> Result<Self, OrchestratorError> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Run one request through the full lifecycle.
    ///
    /// Terminal failures are tagged with the request id and tallied in the
    /// metrics before being returned; the span carries the id so every log
    /// line of the attempt correlates.
    pub async fn generate(&self, request: InferenceRequest) -> Result<InferenceResult, RequestError> {
        let span = info_span!(
            "inference",
            request_id = %request.request_id,
            tenant_id = %request.tenant_id,
            model_id = %request.model_id,
        );
        async {
            let received_at = Instant::now();
            debug!(state = RequestState::Received.as_str(), "request received");

            match self.process(&request, received_at).await {
                Ok(result) => {
                    info!(
                        state = RequestState::Completed.as_str(),
                        total_tokens = result.total_tokens,
                        cost_usd = result.cost_usd,
                        total_latency_ms = result.total_latency_ms,
                        "request completed"
                    );
                    Ok(result)
                }
                Err(kind) => {
                    let model = self.registry.lookup(&request.model_id);
                    self.metrics.record_failure(model, kind.category());
                    warn!(
                        state = RequestState::Failed.as_str(),
                        category = kind.category(),
                        error = %kind,
                        "request failed"
                    );
                    Err(RequestError::new(request.request_id.clone(), kind))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        request: &InferenceRequest,
        received_at: Instant,
    ) -> Result<InferenceResult, OrchestratorError> {
        let deadline = received_at + request.timeout;

        self.admission
            .check_rate_limits(&request.tenant_id, &request.user_scope())?;

        let model = self
            .registry
            .lookup(&request.model_id)
            .ok_or_else(|| OrchestratorError::UnsupportedModel(request.model_id.clone()))?;

        let policy = self.policies.get_policy(&request.tenant_id).await?;
        if !policy.allows(model) {
            return Err(OrchestratorError::AccessDenied {
                tenant_id: request.tenant_id.clone(),
                model_id: request.model_id.clone(),
            });
        }

        let queued_at = Instant::now();
        let permit = self
            .admission
            .acquire_slot(model, request.priority, deadline)
            .await?;
        let queue_time_ms = elapsed_ms(queued_at);
        debug!(
            state = RequestState::Admitted.as_str(),
            queue_time_ms, "slot acquired"
        );

        let snippets = if request.use_retrieval {
            self.retriever
                .retrieve(&request.tenant_id, &request.prompt)
                .await
        } else {
            Vec::new()
        };
        let messages = self
            .assembler
            .assemble(&request.conversation_history, &request.prompt, &snippets);
        debug!(
            state = RequestState::ContextBuilt.as_str(),
            snippets = snippets.len(),
            messages = messages.len(),
            "context assembled"
        );

        let ctx = DispatchContext {
            request_id: &request.request_id,
            tenant_id: &request.tenant_id,
            model,
            temperature: request.temperature.unwrap_or(model.default_temperature),
            // Requested budgets above the model's ceiling are clamped, not
            // rejected.
            max_tokens: request
                .max_tokens
                .unwrap_or(model.max_tokens)
                .min(model.max_tokens),
        };

        let dispatched_at = Instant::now();
        let output = self.dispatcher.dispatch(&ctx, &messages, deadline).await?;
        let processing_time_ms = elapsed_ms(dispatched_at);
        drop(permit);

        let cost_usd = metering::cost_usd(model, output.input_tokens, output.output_tokens);
        self.metrics.record_success(
            model,
            output.input_tokens,
            output.output_tokens,
            cost_usd,
            processing_time_ms,
        );
        // Write-back happens off the request path; the raw prompt is
        // persisted, not the augmented one.
        self.retriever.spawn_persist(Interaction {
            tenant_id: request.tenant_id.clone(),
            request_id: request.request_id.clone(),
            model_id: model.model_id.clone(),
            prompt: request.prompt.clone(),
            response: output.content.clone(),
        });

        Ok(InferenceResult {
            request_id: request.request_id.clone(),
            content: output.content,
            provider_kind: model.provider_kind,
            model_id: model.model_id.clone(),
            input_tokens: output.input_tokens,
            output_tokens: output.output_tokens,
            total_tokens: output.input_tokens + output.output_tokens,
            cost_usd,
            total_latency_ms: elapsed_ms(received_at),
            queue_time_ms,
            processing_time_ms,
        })
    }

    /// Run a batch concurrently. Results come back in submission order and
    /// each request fails or succeeds on its own.
    pub async fn generate_batch(
        &self,
        requests: Vec<InferenceRequest>,
    ) -> Vec<Result<InferenceResult, RequestError>> {
        futures::future::join_all(requests.into_iter().map(|request| self.generate(request))).await
    }

    /// Catalog entries the tenant's policy allows, best catalog priority
    /// first.
    pub async fn list_available_models(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<ModelDescriptor>, OrchestratorError> {
        let policy = self.policies.get_policy(tenant_id).await?;
        Ok(self
            .registry
            .list_for_tenant(&policy)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Live rate-window counts for one caller, without counting the probe.
    pub fn rate_limit_status(&self, tenant_id: &str, user_id: Option<&str>) -> RateLimitStatus {
        let scope = match user_id {
            Some(user) => format!("{tenant_id}:{user}"),
            None => format!("{tenant_id}:anonymous"),
        };
        self.admission.rate_limit_status(&scope)
    }

    /// Rolling usage and failure totals since startup.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Add a document to the tenant's knowledge base. Extra metadata fields
    /// are kept, but `type` and `title` always describe the document itself.
    pub async fn store_document(
        &self,
        tenant_id: &str,
        content: &str,
        title: &str,
        extra: serde_json::Value,
    ) -> Result<String, OrchestratorError> {
        let mut metadata = serde_json::Map::new();
        metadata.insert("type".to_string(), "document".into());
        metadata.insert("title".to_string(), title.into());
        if let serde_json::Value::Object(extra) = extra {
            for (key, value) in extra {
                metadata.entry(key).or_insert(value);
            }
        }
        let id = self
            .store
            .upsert(tenant_id, content, serde_json::Value::Object(metadata))
            .await?;
        debug!(tenant_id, document_id = %id, "document stored");
        Ok(id)
    }

    pub async fn delete_document(
        &self,
        tenant_id: &str,
        document_id: &str,
    ) -> Result<(), OrchestratorError> {
        self.store.delete(tenant_id, document_id).await
    }

    pub async fn document_count(&self, tenant_id: &str) -> Result<usize, OrchestratorError> {
        self.store.count(tenant_id).await
    }

    /// Submit a fine-tuning job to the tenant's dedicated cluster. Gated by
    /// the tenant's policy; the job itself runs remotely.
    pub async fn train_custom_model(
        &self,
        tenant_id: &str,
        job: TrainingJob,
    ) -> Result<TrainingJobReceipt, OrchestratorError> {
        let policy = self.policies.get_policy(tenant_id).await?;
        if !policy.allow_custom_training {
            warn!(tenant_id, "training submission denied by policy");
            return Err(OrchestratorError::TrainingDenied(tenant_id.to_string()));
        }
        self.trainer.submit_training(tenant_id, &job).await
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

/// Assembles an [`Orchestrator`], defaulting every collaborator that was not
/// supplied.
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Option<OrchestratorConfig>,
    registry: Option<ModelRegistry>,
    policies: Option<Arc<dyn TenantPolicySource>>,
    store: Option<Arc<dyn RetrievalStore>>,
    adapters: Option<AdapterSet>,
    counters: Option<Arc<dyn CounterStore>>,
    clock: Option<Arc<dyn Clock>>,
}

struct AdapterSet {
    cloud: Arc<dyn ProviderAdapter>,
    hosted: Arc<dyn ProviderAdapter>,
    custom: Arc<dyn ProviderAdapter>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the built-in model catalog.
    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use an external policy source instead of the permissive default. The
    /// source is wrapped in the LRU/TTL cache configured by
    /// [`PolicyCacheConfig`](crate::config::PolicyCacheConfig).
    pub fn policy_source(mut self, source: impl TenantPolicySource + 'static) -> Self {
        self.policies = Some(Arc::new(source));
        self
    }

    /// Use an external retrieval store instead of the in-memory one.
    pub fn retrieval_store(mut self, store: impl RetrievalStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Substitute all three provider adapters. Intended for tests and for
    /// deployments that front the backends with their own transport.
    pub fn adapters(
        mut self,
        cloud: Arc<dyn ProviderAdapter>,
        hosted: Arc<dyn ProviderAdapter>,
        custom: Arc<dyn ProviderAdapter>,
    ) -> Self {
        self.adapters = Some(AdapterSet {
            cloud,
            hosted,
            custom,
        });
        self
    }

    /// Back the rate windows with an external counter store (shared between
    /// replicas) instead of in-process counters.
    pub fn counter_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.counters = Some(store);
        self
    }

    /// Drive the rate windows from an explicit clock. Tests pair this with
    /// [`ManualClock`](crate::admission::ManualClock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let config = self.config.unwrap_or_default();

        let http_client = Client::builder()
            .build()
            .map_err(|e| OrchestratorError::Configuration(format!("http client: {e}")))?;

        let trainer = Arc::new(TenantCustomAdapter::new(
            &config.providers.custom,
            http_client.clone(),
        ));
        let (cloud, hosted, custom) = match self.adapters {
            Some(set) => (set.cloud, set.hosted, set.custom),
            None => (
                Arc::new(CloudManagedAdapter::new(
                    &config.providers.cloud,
                    http_client.clone(),
                )) as Arc<dyn ProviderAdapter>,
                Arc::new(ThirdPartyHostedAdapter::new(
                    &config.providers.hosted,
                    http_client.clone(),
                )) as Arc<dyn ProviderAdapter>,
                trainer.clone() as Arc<dyn ProviderAdapter>,
            ),
        };

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let counters: Arc<dyn CounterStore> = self
            .counters
            .unwrap_or_else(|| Arc::new(InMemoryCounterStore::new(clock.clone())));

        let policies: Arc<dyn TenantPolicySource> = self
            .policies
            .unwrap_or_else(|| Arc::new(StaticPolicySource::new()));
        let store: Arc<dyn RetrievalStore> = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryRetrievalStore::new()));

        Ok(Orchestrator {
            registry: self
                .registry
                .unwrap_or_else(ModelRegistry::with_default_catalog),
            policies: CachedPolicySource::new(
                policies,
                config.policy_cache.capacity,
                config.policy_cache.ttl(),
            ),
            admission: AdmissionController::with_services(
                config.rate_limits.clone(),
                counters,
                clock,
            ),
            retriever: Arc::new(ContextRetriever::new(
                store.clone(),
                config.retrieval.clone(),
            )),
            store,
            assembler: ConversationAssembler::new(config.history_window),
            dispatcher: ProviderDispatcher::new(cloud, hosted, custom, config.retry.clone()),
            trainer,
            metrics: MetricsAggregator::new(),
        })
    }
}
