//! Cost metering and rolling usage metrics.
//!
//! Costs come from the per-1k token rates on the model descriptor, rounded
//! to micro-dollars. The aggregator keeps process-lifetime totals, per-model
//! and per-provider breakdowns, failure tallies by category, and an
//! incrementally updated mean of successful processing time.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::types::ModelDescriptor;

/// Dollar cost of one completed call, rounded to 6 decimal places.
pub fn cost_usd(model: &ModelDescriptor, input_tokens: u64, output_tokens: u64) -> f64 {
    let raw = (input_tokens as f64 / 1000.0) * model.cost_per_1k_input
        + (output_tokens as f64 / 1000.0) * model.cost_per_1k_output;
    round_to_micros(raw)
}

fn round_to_micros(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Accumulated usage for one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub requests: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

/// Point-in-time copy of the aggregator's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    /// Mean processing time of successful requests, milliseconds.
    pub avg_processing_ms: f64,
    pub per_model: HashMap<String, ModelUsage>,
    /// Terminal outcomes per provider kind; unresolved models count under
    /// `"unknown"`.
    pub per_provider: HashMap<String, u64>,
    pub failures_by_category: HashMap<String, u64>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    total_requests: u64,
    failed_requests: u64,
    total_input_tokens: u64,
    total_output_tokens: u64,
    total_cost_usd: f64,
    avg_processing_ms: f64,
    per_model: HashMap<String, ModelUsage>,
    per_provider: HashMap<&'static str, u64>,
    failures_by_category: HashMap<&'static str, u64>,
}

/// Process-lifetime usage counters. Cheap to update on every completion.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    inner: Mutex<MetricsInner>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a successful completion into the totals and the running mean.
    pub fn record_success(
        &self,
        model: &ModelDescriptor,
        input_tokens: u64,
        output_tokens: u64,
        cost: f64,
        processing_ms: f64,
    ) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.total_requests += 1;
        inner.total_input_tokens += input_tokens;
        inner.total_output_tokens += output_tokens;
        inner.total_cost_usd = round_to_micros(inner.total_cost_usd + cost);

        // The mean covers successful requests only; failures carry no
        // meaningful processing time.
        let n = (inner.total_requests - inner.failed_requests) as f64;
        inner.avg_processing_ms = (inner.avg_processing_ms * (n - 1.0) + processing_ms) / n;

        let usage = inner.per_model.entry(model.model_id.clone()).or_default();
        usage.requests += 1;
        usage.total_tokens += input_tokens + output_tokens;
        usage.cost_usd = round_to_micros(usage.cost_usd + cost);
        *inner
            .per_provider
            .entry(model.provider_kind.as_str())
            .or_insert(0) += 1;
    }

    /// Tally a terminal failure under its error category. `model` is the
    /// resolved descriptor when the registry knows the requested id, `None`
    /// otherwise.
    pub fn record_failure(&self, model: Option<&ModelDescriptor>, category: &'static str) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.total_requests += 1;
        inner.failed_requests += 1;
        let model_key = model.map_or("unknown", |m| m.model_id.as_str());
        inner
            .per_model
            .entry(model_key.to_string())
            .or_default()
            .requests += 1;
        let provider_key = model.map_or("unknown", |m| m.provider_kind.as_str());
        *inner.per_provider.entry(provider_key).or_insert(0) += 1;
        *inner.failures_by_category.entry(category).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        MetricsSnapshot {
            total_requests: inner.total_requests,
            failed_requests: inner.failed_requests,
            total_input_tokens: inner.total_input_tokens,
            total_output_tokens: inner.total_output_tokens,
            total_tokens: inner.total_input_tokens + inner.total_output_tokens,
            total_cost_usd: inner.total_cost_usd,
            avg_processing_ms: inner.avg_processing_ms,
            per_model: inner
                .per_model
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            per_provider: inner
                .per_provider
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            failures_by_category: inner
                .failures_by_category
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;

    fn sonnet() -> ModelDescriptor {
        ModelDescriptor::new("anthropic.claude-3-sonnet", ProviderKind::CloudManaged)
            .with_cost_per_1k(0.003, 0.015)
    }

    #[test]
    fn cost_uses_per_1k_rates() {
        let model = sonnet();
        let cost = cost_usd(&model, 1000, 500);
        assert!((cost - 0.0105).abs() < 1e-9);
    }

    #[test]
    fn cost_rounds_to_six_decimals() {
        let model = ModelDescriptor::new("m", ProviderKind::CloudManaged)
            .with_cost_per_1k(0.00025, 0.00125);
        // 7 input tokens: 0.00000175 raw, rounds up to 2 micro-dollars.
        assert!((cost_usd(&model, 7, 0) - 0.000002).abs() < 1e-12);
        assert_eq!(cost_usd(&model, 0, 0), 0.0);
    }

    #[test]
    fn average_updates_incrementally() {
        let model = ModelDescriptor::new("m", ProviderKind::CloudManaged);
        let metrics = MetricsAggregator::new();
        metrics.record_success(&model, 10, 10, 0.001, 100.0);
        metrics.record_success(&model, 10, 10, 0.001, 200.0);
        metrics.record_success(&model, 10, 10, 0.001, 600.0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert!((snapshot.avg_processing_ms - 300.0).abs() < 1e-9);
    }

    #[test]
    fn failures_count_toward_totals_but_not_the_average() {
        let model = ModelDescriptor::new("m", ProviderKind::CloudManaged);
        let metrics = MetricsAggregator::new();
        metrics.record_failure(None, "rate_limit");
        metrics.record_success(&model, 10, 10, 0.001, 100.0);
        metrics.record_failure(Some(&model), "timeout");
        metrics.record_failure(Some(&model), "timeout");
        metrics.record_success(&model, 10, 10, 0.001, 300.0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 5);
        assert_eq!(snapshot.failed_requests, 3);
        assert!((snapshot.avg_processing_ms - 200.0).abs() < 1e-9);
        assert_eq!(snapshot.failures_by_category["timeout"], 2);
        assert_eq!(snapshot.failures_by_category["rate_limit"], 1);
        // Failed attempts appear in the per-model breakdown without tokens.
        assert_eq!(snapshot.per_model["m"].requests, 4);
        assert_eq!(snapshot.per_model["m"].total_tokens, 40);
        assert_eq!(snapshot.per_model["unknown"].requests, 1);
        assert_eq!(snapshot.per_provider["cloud_managed"], 4);
        assert_eq!(snapshot.per_provider["unknown"], 1);
    }

    #[test]
    fn per_model_breakdown_accumulates() {
        let a = ModelDescriptor::new("a", ProviderKind::CloudManaged);
        let b = ModelDescriptor::new("b", ProviderKind::ThirdPartyHosted);
        let metrics = MetricsAggregator::new();
        metrics.record_success(&a, 100, 50, 0.01, 10.0);
        metrics.record_success(&a, 100, 50, 0.01, 10.0);
        metrics.record_success(&b, 10, 5, 0.001, 10.0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.per_model["a"].requests, 2);
        assert_eq!(snapshot.per_model["a"].total_tokens, 300);
        assert!((snapshot.per_model["a"].cost_usd - 0.02).abs() < 1e-9);
        assert_eq!(snapshot.per_model["b"].requests, 1);
        assert_eq!(snapshot.per_provider["cloud_managed"], 2);
        assert_eq!(snapshot.per_provider["third_party_hosted"], 1);
        assert_eq!(snapshot.total_tokens, 315);
    }
}
