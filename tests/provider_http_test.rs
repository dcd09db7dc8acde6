//! End-to-end provider dispatch against mock HTTP backends.
//!
//! Each test runs a request through the full orchestrator (admission,
//! assembly, dispatch, metering) with the provider base URLs pointed at a
//! wiremock server, validating request shape, headers, retry behavior and
//! response normalization.

mod support;

use std::time::Duration;

use charsiu::policy::StaticPolicySource;
use charsiu::prelude::*;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn claude_response() -> serde_json::Value {
    serde_json::json!({
        "content": [{ "type": "text", "text": "Certainly." }],
        "usage": { "input_tokens": 12, "output_tokens": 3 }
    })
}

#[tokio::test]
async fn cloud_claude_request_shape_headers_and_metering() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(
            "/model/anthropic.claude-3-sonnet-20240229-v1:0/invoke",
        ))
        .and(header("authorization", "Bearer test-key"))
        .and(|req: &Request| {
            let Ok(v) = serde_json::from_slice::<serde_json::Value>(&req.body) else {
                return false;
            };
            v["anthropic_version"] == "bedrock-2023-05-31"
                && v["messages"][0]["role"] == "user"
                && v["messages"][0]["content"] == "ping"
                && v["max_tokens"] == 4000
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(claude_response()))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = support::quiet_config();
    config.providers.cloud.base_url = server.uri();
    config.providers.cloud.api_key = Some("test-key".to_string().into());
    let orchestrator = Orchestrator::new(config).unwrap();

    let request = InferenceRequest::new(
        "acme",
        "anthropic.claude-3-sonnet-20240229-v1:0",
        "ping",
    )
    .with_retrieval(false);
    let result = orchestrator.generate(request).await.unwrap();

    assert_eq!(result.content, "Certainly.");
    assert_eq!(result.provider_kind, ProviderKind::CloudManaged);
    assert_eq!(result.input_tokens, 12);
    assert_eq!(result.output_tokens, 3);
    // 12/1000 * 0.003 + 3/1000 * 0.015, rounded to micros.
    assert!((result.cost_usd - 0.000081).abs() < 1e-9);

    let metrics = orchestrator.metrics();
    assert_eq!(metrics.total_requests, 1);
    assert!((metrics.total_cost_usd - 0.000081).abs() < 1e-9);
}

#[tokio::test]
async fn transient_5xx_is_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(claude_response()))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = support::quiet_config().with_retry(support::fast_retry());
    config.providers.cloud.base_url = server.uri();
    let orchestrator = Orchestrator::new(config).unwrap();

    let request = InferenceRequest::new(
        "acme",
        "anthropic.claude-3-haiku-20240307-v1:0",
        "ping",
    )
    .with_retrieval(false);
    let result = orchestrator.generate(request).await.unwrap();
    assert_eq!(result.content, "Certainly.");
}

#[tokio::test]
async fn permanent_4xx_fails_without_a_second_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad payload"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = support::quiet_config().with_retry(support::fast_retry());
    config.providers.cloud.base_url = server.uri();
    let orchestrator = Orchestrator::new(config).unwrap();

    let request = InferenceRequest::new(
        "acme",
        "anthropic.claude-3-haiku-20240307-v1:0",
        "ping",
    )
    .with_retrieval(false);
    let err = orchestrator.generate(request).await.unwrap_err();
    assert_eq!(err.category(), "provider_permanent");
    assert_eq!(orchestrator.metrics().failures_by_category["provider_permanent"], 1);
}

#[tokio::test]
async fn hosted_chat_completion_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-chat"))
        .and(|req: &Request| {
            let Ok(v) = serde_json::from_slice::<serde_json::Value>(&req.body) else {
                return false;
            };
            v["model"] == "gpt-4" && v["messages"][0]["content"] == "hello there"
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "content": "Hi!" } }],
            "usage": { "prompt_tokens": 9, "completion_tokens": 2 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = support::quiet_config();
    config.providers.hosted.chat_base_url = server.uri();
    config.providers.hosted.chat_api_key = Some("sk-chat".to_string().into());
    let orchestrator = Orchestrator::new(config).unwrap();

    let request = InferenceRequest::new("acme", "gpt-4", "hello there").with_retrieval(false);
    let result = orchestrator.generate(request).await.unwrap();

    assert_eq!(result.content, "Hi!");
    assert_eq!(result.input_tokens, 9);
    assert_eq!(result.output_tokens, 2);
    assert_eq!(result.total_tokens, 11);
}

#[tokio::test]
async fn hosted_text_generation_estimates_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/microsoft/DialoGPT-large"))
        .and(|req: &Request| {
            let Ok(v) = serde_json::from_slice::<serde_json::Value>(&req.body) else {
                return false;
            };
            // The prompt is flattened into a single `inputs` string and the
            // generation parameters ride alongside.
            v["inputs"].as_str().is_some_and(|s| s.contains("say something"))
                && v["parameters"]["return_full_text"] == false
        })
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "generated_text": "A reply" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut config = support::quiet_config();
    config.providers.hosted.text_base_url = server.uri();
    let orchestrator = Orchestrator::new(config).unwrap();

    let request =
        InferenceRequest::new("acme", "microsoft/DialoGPT-large", "say something").with_retrieval(false);
    let result = orchestrator.generate(request).await.unwrap();

    assert_eq!(result.content, "A reply");
    // No usage block in the reply: both sides are whitespace estimates.
    // "Human: say something\n\nAssistant:" -> 4, "A reply" -> 2.
    assert_eq!(result.input_tokens, 4);
    assert_eq!(result.output_tokens, 2);
    // Free-tier model: no charge either way.
    assert_eq!(result.cost_usd, 0.0);
}

#[tokio::test]
async fn custom_cluster_inference_uses_the_tenant_override() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/inference"))
        .and(|req: &Request| {
            let Ok(v) = serde_json::from_slice::<serde_json::Value>(&req.body) else {
                return false;
            };
            v["model"] == "custom-tenant-model" && v["prompt"].as_str().is_some()
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": "pong",
            "input_tokens": 5,
            "output_tokens": 9
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = support::quiet_config();
    config
        .providers
        .custom
        .overrides
        .insert("acme".to_string(), server.uri());
    let orchestrator = Orchestrator::new(config).unwrap();

    let request = InferenceRequest::new("acme", "custom-tenant-model", "ping").with_retrieval(false);
    let result = orchestrator.generate(request).await.unwrap();

    assert_eq!(result.content, "pong");
    assert_eq!(result.total_tokens, 14);
    assert_eq!(result.cost_usd, 0.0);
}

#[tokio::test]
async fn training_submission_carries_hyperparameter_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/training"))
        .and(|req: &Request| {
            let Ok(v) = serde_json::from_slice::<serde_json::Value>(&req.body) else {
                return false;
            };
            v["base_model"] == "meta-llama/Llama-2-7b-hf"
                && v["dataset_uri"] == "s3://datasets/acme.jsonl"
                && v["epochs"] == 3
                && v["batch_size"] == 4
                && v["max_length"] == 512
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "job_id": "job-814",
            "status": "queued"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = support::quiet_config();
    config
        .providers
        .custom
        .overrides
        .insert("acme".to_string(), server.uri());
    let orchestrator = Orchestrator::builder()
        .config(config)
        .policy_source(
            StaticPolicySource::new()
                .with_policy(TenantAccessPolicy::allow_all("acme").with_custom_training(true)),
        )
        .build()
        .unwrap();

    let receipt = orchestrator
        .train_custom_model("acme", TrainingJob::new("s3://datasets/acme.jsonl"))
        .await
        .unwrap();

    assert_eq!(receipt.job_id, "job-814");
    assert_eq!(receipt.status, "queued");
    assert_eq!(receipt.tenant_id, "acme");
}

#[tokio::test]
async fn slow_provider_hits_the_request_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(claude_response())
                .set_delay(Duration::from_millis(250)),
        )
        .mount(&server)
        .await;

    let mut config = support::quiet_config().with_retry(support::fast_retry());
    config.providers.cloud.base_url = server.uri();
    let orchestrator = Orchestrator::new(config).unwrap();

    let request = InferenceRequest::new(
        "acme",
        "anthropic.claude-3-haiku-20240307-v1:0",
        "ping",
    )
    .with_retrieval(false)
    .with_timeout(Duration::from_millis(60));
    let err = orchestrator.generate(request).await.unwrap_err();
    assert_eq!(err.category(), "timeout");
}
