//! The shipped model catalog.
//!
//! Mirrors the production deployment's model table: three cloud-managed
//! models, five third-party hosted models, and the tenant-cluster custom
//! model. Prices are USD per 1000 tokens.

use crate::types::{ModelDescriptor, ProviderKind};

/// Descriptors for every model the shipped deployment routes to.
pub fn default_catalog() -> Vec<ModelDescriptor> {
    vec![
        // Cloud-managed runtime
        ModelDescriptor::new(
            "anthropic.claude-3-sonnet-20240229-v1:0",
            ProviderKind::CloudManaged,
        )
        .with_cost_per_1k(0.003, 0.015)
        .with_max_concurrent(50)
        .with_priority(1),
        ModelDescriptor::new(
            "anthropic.claude-3-haiku-20240307-v1:0",
            ProviderKind::CloudManaged,
        )
        .with_cost_per_1k(0.00025, 0.00125)
        .with_max_concurrent(100)
        .with_priority(2),
        ModelDescriptor::new("meta.llama-2-70b-chat-v1", ProviderKind::CloudManaged)
            .with_cost_per_1k(0.00165, 0.00219)
            .with_max_concurrent(30)
            .with_priority(3),
        // Third-party hosted APIs
        ModelDescriptor::new("gpt-4", ProviderKind::ThirdPartyHosted)
            .with_cost_per_1k(0.03, 0.06)
            .with_max_concurrent(20)
            .with_priority(1),
        ModelDescriptor::new("gpt-4-turbo", ProviderKind::ThirdPartyHosted)
            .with_cost_per_1k(0.01, 0.03)
            .with_max_concurrent(30)
            .with_priority(2),
        ModelDescriptor::new("gpt-3.5-turbo", ProviderKind::ThirdPartyHosted)
            .with_cost_per_1k(0.0015, 0.002)
            .with_max_concurrent(50)
            .with_priority(3),
        // Free-tier text-generation models
        ModelDescriptor::new("microsoft/DialoGPT-large", ProviderKind::ThirdPartyHosted)
            .with_max_tokens(1000)
            .with_max_concurrent(10)
            .with_priority(4),
        ModelDescriptor::new("google/flan-t5-xxl", ProviderKind::ThirdPartyHosted)
            .with_max_tokens(1000)
            .with_max_concurrent(10)
            .with_priority(4),
        // Deployed on the tenant's dedicated cluster; no per-token charge.
        ModelDescriptor::new("custom-tenant-model", ProviderKind::TenantCustom)
            .with_max_concurrent(5)
            .with_priority(1),
    ]
}
