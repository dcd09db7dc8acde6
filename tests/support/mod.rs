//! Shared helpers for the integration suites. Each binary uses its own
//! subset.
#![allow(dead_code)]

use charsiu::prelude::*;
use std::time::Duration;

/// Default config with interaction write-back disabled, so tests control
/// exactly what ends up in the retrieval store.
pub fn quiet_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::new();
    config.retrieval.persist_interactions = false;
    config
}

/// Retry curve measured in milliseconds instead of seconds, without jitter,
/// so failure-path tests finish quickly and deterministically.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::default()
        .with_initial_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(20))
        .with_jitter(false)
}
