//! Provider adapters and the dispatch path.
//!
//! Three backend classes sit behind the one [`ProviderAdapter`] surface:
//!
//! - [`cloud`]: the cloud-managed model runtime (per-model invoke endpoint,
//!   Claude and Llama body dialects)
//! - [`hosted`]: third-party hosted APIs (chat completions and hosted text
//!   generation, separate credentials)
//! - [`custom`]: tenant-dedicated inference clusters, which also accept
//!   fine-tuning job submissions
//!
//! [`ProviderDispatcher`] owns one adapter per class and drives the
//! translate → invoke → parse sequence, retrying only the invoke step.

pub mod cloud;
pub mod custom;
pub mod hosted;

use std::sync::Arc;

use tokio::time::Instant;
use tracing::debug;

use crate::error::OrchestratorError;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::traits::{DispatchContext, ProviderAdapter, ProviderOutput};
use crate::types::{Message, MessageRole, ProviderKind};

pub use cloud::CloudManagedAdapter;
pub use custom::{ClusterEndpoints, TenantCustomAdapter, TrainingJob, TrainingJobReceipt};
pub use hosted::ThirdPartyHostedAdapter;

/// Request-body dialect a model speaks, derived from its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Claude,
    Llama,
    /// Chat-completions dialect (`gpt-*`).
    OpenAiChat,
    /// Plain text-generation dialect (hosted inference endpoints).
    TextGeneration,
}

impl ModelFamily {
    /// `gpt` must anchor the id: hosted text models like `DialoGPT` contain
    /// the substring without speaking the chat dialect.
    pub fn detect(model_id: &str) -> Self {
        let id = model_id.to_ascii_lowercase();
        if id.contains("claude") {
            Self::Claude
        } else if id.contains("llama") {
            Self::Llama
        } else if id.starts_with("gpt") {
            Self::OpenAiChat
        } else {
            Self::TextGeneration
        }
    }
}

/// Flatten a message sequence into the plain-text dialogue format text
/// completion backends expect, ending with the assistant cue.
pub fn messages_to_prompt(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for message in messages {
        match message.role {
            MessageRole::System => {
                prompt.push_str(&message.content);
                prompt.push_str("\n\n");
            }
            MessageRole::User => {
                prompt.push_str("Human: ");
                prompt.push_str(&message.content);
                prompt.push_str("\n\n");
            }
            MessageRole::Assistant => {
                prompt.push_str("Assistant: ");
                prompt.push_str(&message.content);
                prompt.push_str("\n\n");
            }
        }
    }
    prompt.push_str("Assistant:");
    prompt
}

/// Whitespace token estimate for backends that do not report usage.
pub(crate) fn estimate_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Routes a translated request to the right backend class and retries
/// transient invoke failures against the request deadline.
pub struct ProviderDispatcher {
    cloud: Arc<dyn ProviderAdapter>,
    hosted: Arc<dyn ProviderAdapter>,
    custom: Arc<dyn ProviderAdapter>,
    retry: RetryPolicy,
}

impl ProviderDispatcher {
    pub fn new(
        cloud: Arc<dyn ProviderAdapter>,
        hosted: Arc<dyn ProviderAdapter>,
        custom: Arc<dyn ProviderAdapter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cloud,
            hosted,
            custom,
            retry,
        }
    }

    fn adapter_for(&self, kind: ProviderKind) -> &dyn ProviderAdapter {
        match kind {
            ProviderKind::CloudManaged => self.cloud.as_ref(),
            ProviderKind::ThirdPartyHosted => self.hosted.as_ref(),
            ProviderKind::TenantCustom => self.custom.as_ref(),
        }
    }

    /// Translate once, invoke under the retry policy until `deadline`, parse
    /// once. Translate and parse failures are permanent by construction.
    pub async fn dispatch(
        &self,
        ctx: &DispatchContext<'_>,
        messages: &[Message],
        deadline: Instant,
    ) -> Result<ProviderOutput, OrchestratorError> {
        let adapter = self.adapter_for(ctx.model.provider_kind);
        let payload = adapter.translate_request(ctx, messages)?;
        debug!(
            request_id = ctx.request_id,
            model_id = %ctx.model.model_id,
            provider = ctx.model.provider_kind.as_str(),
            "dispatching to provider"
        );

        let executor = RetryExecutor::new(self.retry.clone());
        let raw = executor
            .execute(deadline, || {
                let payload = &payload;
                async move {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(OrchestratorError::Timeout {
                            phase: "before provider dispatch",
                        });
                    }
                    adapter.invoke(ctx, payload, remaining).await
                }
            })
            .await?;

        adapter.parse_response(ctx, &payload, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ProviderPayload, RawResponse};
    use crate::types::ModelDescriptor;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn family_detection_anchors_gpt() {
        assert_eq!(
            ModelFamily::detect("anthropic.claude-3-sonnet"),
            ModelFamily::Claude
        );
        assert_eq!(ModelFamily::detect("meta.llama-2-70b-chat"), ModelFamily::Llama);
        assert_eq!(ModelFamily::detect("gpt-4-turbo"), ModelFamily::OpenAiChat);
        assert_eq!(
            ModelFamily::detect("microsoft/DialoGPT-large"),
            ModelFamily::TextGeneration
        );
        assert_eq!(
            ModelFamily::detect("google/flan-t5-xxl"),
            ModelFamily::TextGeneration
        );
    }

    #[test]
    fn prompt_flattening_ends_with_the_assistant_cue() {
        let messages = vec![
            Message::user("hello"),
            Message::assistant("hi there"),
            Message::user("how are you?"),
        ];
        assert_eq!(
            messages_to_prompt(&messages),
            "Human: hello\n\nAssistant: hi there\n\nHuman: how are you?\n\nAssistant:"
        );
    }

    #[test]
    fn system_turns_flatten_bare() {
        let messages = vec![Message::system("Be terse."), Message::user("hi")];
        assert_eq!(
            messages_to_prompt(&messages),
            "Be terse.\n\nHuman: hi\n\nAssistant:"
        );
    }

    #[test]
    fn token_estimates_split_on_whitespace() {
        assert_eq!(estimate_tokens("one two  three\nfour"), 4);
        assert_eq!(estimate_tokens(""), 0);
    }

    struct FlakyAdapter {
        kind: ProviderKind,
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ProviderAdapter for FlakyAdapter {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn translate_request(
            &self,
            _ctx: &DispatchContext<'_>,
            _messages: &[Message],
        ) -> Result<ProviderPayload, OrchestratorError> {
            Ok(ProviderPayload::new(serde_json::json!({})))
        }

        async fn invoke(
            &self,
            _ctx: &DispatchContext<'_>,
            _payload: &ProviderPayload,
            _timeout: Duration,
        ) -> Result<RawResponse, OrchestratorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(OrchestratorError::ProviderTransient {
                    message: "overloaded".to_string(),
                    status: Some(503),
                })
            } else {
                Ok(RawResponse::new(serde_json::json!({"text": "ok"})))
            }
        }

        fn parse_response(
            &self,
            _ctx: &DispatchContext<'_>,
            _payload: &ProviderPayload,
            raw: &RawResponse,
        ) -> Result<ProviderOutput, OrchestratorError> {
            Ok(ProviderOutput {
                content: raw.body["text"].as_str().unwrap_or_default().to_string(),
                input_tokens: 1,
                output_tokens: 1,
            })
        }
    }

    fn dispatcher_with(adapter: Arc<dyn ProviderAdapter>) -> ProviderDispatcher {
        let retry = RetryPolicy::new()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false);
        ProviderDispatcher::new(adapter.clone(), adapter.clone(), adapter, retry)
    }

    #[tokio::test]
    async fn dispatch_retries_transient_invoke_failures() {
        let adapter = Arc::new(FlakyAdapter {
            kind: ProviderKind::CloudManaged,
            failures_before_success: 2,
            calls: AtomicU32::new(0),
        });
        let dispatcher = dispatcher_with(adapter.clone());

        let model = ModelDescriptor::new("m", ProviderKind::CloudManaged);
        let ctx = DispatchContext {
            request_id: "r1",
            tenant_id: "acme",
            model: &model,
            temperature: 0.7,
            max_tokens: 100,
        };
        let deadline = Instant::now() + Duration::from_secs(5);

        let output = dispatcher
            .dispatch(&ctx, &[Message::user("hi")], deadline)
            .await
            .unwrap();
        assert_eq!(output.content, "ok");
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn dispatch_gives_up_after_the_attempt_budget() {
        let adapter = Arc::new(FlakyAdapter {
            kind: ProviderKind::CloudManaged,
            failures_before_success: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let dispatcher = dispatcher_with(adapter.clone());

        let model = ModelDescriptor::new("m", ProviderKind::CloudManaged);
        let ctx = DispatchContext {
            request_id: "r1",
            tenant_id: "acme",
            model: &model,
            temperature: 0.7,
            max_tokens: 100,
        };
        let deadline = Instant::now() + Duration::from_secs(5);

        let err = dispatcher
            .dispatch(&ctx, &[Message::user("hi")], deadline)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn expired_deadline_does_not_reach_the_adapter() {
        let adapter = Arc::new(FlakyAdapter {
            kind: ProviderKind::CloudManaged,
            failures_before_success: 0,
            calls: AtomicU32::new(0),
        });
        let dispatcher = dispatcher_with(adapter.clone());

        let model = ModelDescriptor::new("m", ProviderKind::CloudManaged);
        let ctx = DispatchContext {
            request_id: "r1",
            tenant_id: "acme",
            model: &model,
            temperature: 0.7,
            max_tokens: 100,
        };
        let deadline = Instant::now() - Duration::from_millis(1);

        let err = dispatcher
            .dispatch(&ctx, &[Message::user("hi")], deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Timeout { .. }));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    }
}
