//! Bounded retries with exponential backoff and jitter.
//!
//! One policy governs the dispatch path: transient provider failures are
//! retried up to a fixed attempt budget, everything else returns on the
//! first failure. The executor is deadline-aware; when the next backoff
//! sleep cannot finish before the request's deadline it fails fast instead
//! of sleeping into a guaranteed timeout.

use rand::Rng;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::error::OrchestratorError;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempt budget, first try included.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Ceiling for the exponential curve.
    pub max_delay: Duration,
    /// Backoff multiplier per attempt.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub use_jitter: bool,
    /// Maximum jitter as a fraction of the delay (0.0 to 1.0).
    pub jitter_factor: f64,
    /// Custom retry condition, overriding
    /// [`OrchestratorError::is_retryable`].
    pub retry_condition: Option<fn(&OrchestratorError) -> bool>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_factor: 0.1,
            retry_condition: None,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub const fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    pub fn with_retry_condition(mut self, condition: fn(&OrchestratorError) -> bool) -> Self {
        self.retry_condition = Some(condition);
        self
    }

    /// Whether a failed attempt should be retried.
    pub fn should_retry(&self, error: &OrchestratorError) -> bool {
        match self.retry_condition {
            Some(condition) => condition(error),
            None => error.is_retryable(),
        }
    }

    /// Delay before the attempt after `attempt` failures (0-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(base_delay as u64).min(self.max_delay);

        if self.use_jitter {
            self.add_jitter(delay)
        } else {
            delay
        }
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        let jitter_range = delay.as_millis() as f64 * self.jitter_factor;
        let jitter = rng.gen_range(-jitter_range..=jitter_range);
        let new_delay = delay.as_millis() as f64 + jitter;
        Duration::from_millis(new_delay.max(0.0) as u64)
    }
}

/// Drives an operation through the policy against a hard deadline.
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// exhausts the attempt budget, or the next backoff would overrun
    /// `deadline`.
    pub async fn execute<F, Fut, T>(
        &self,
        deadline: Instant,
        mut operation: F,
    ) -> Result<T, OrchestratorError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, OrchestratorError>>,
    {
        let mut failures = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !self.policy.should_retry(&error) {
                        return Err(error);
                    }
                    failures += 1;
                    if failures >= self.policy.max_attempts {
                        debug!(attempts = failures, "retry budget exhausted");
                        return Err(error);
                    }
                    let delay = self.policy.calculate_delay(failures - 1);
                    if Instant::now() + delay >= deadline {
                        warn!(
                            attempts = failures,
                            delay_ms = delay.as_millis() as u64,
                            "next backoff would overrun the deadline, failing fast"
                        );
                        return Err(OrchestratorError::Timeout {
                            phase: "while backing off between attempts",
                        });
                    }
                    warn!(
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient provider failure, backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    fn transient() -> OrchestratorError {
        OrchestratorError::ProviderTransient {
            message: "server error".to_string(),
            status: Some(500),
        }
    }

    #[tokio::test]
    async fn succeeds_on_second_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let policy = RetryPolicy::new()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false);
        let executor = RetryExecutor::new(policy);

        let result = executor
            .execute(far_deadline(), || {
                let counter = counter_clone.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(transient())
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_the_attempt_budget() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let policy = RetryPolicy::new()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false);
        let executor = RetryExecutor::new(policy);

        let result: Result<(), _> = executor
            .execute(far_deadline(), || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            })
            .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_short_circuit() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let executor = RetryExecutor::new(RetryPolicy::new().with_max_attempts(3));
        let result: Result<(), _> = executor
            .execute(far_deadline(), || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(OrchestratorError::ProviderPermanent {
                        message: "invalid api key".to_string(),
                        status: Some(401),
                    })
                }
            })
            .await;

        assert_eq!(result.unwrap_err().category(), "provider_permanent");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fails_fast_when_backoff_overruns_deadline() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let policy = RetryPolicy::new()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(200))
            .with_jitter(false);
        let executor = RetryExecutor::new(policy);

        // 10ms of budget cannot fit a 200ms backoff.
        let deadline = Instant::now() + Duration::from_millis(10);
        let result: Result<(), _> = executor
            .execute(deadline, || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            OrchestratorError::Timeout { .. }
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_curve_doubles_then_caps() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_secs(4))
            .with_max_delay(Duration::from_secs(10))
            .with_backoff_multiplier(2.0)
            .with_jitter(false);

        assert_eq!(policy.calculate_delay(0), Duration::from_secs(4));
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(8));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(10));
        assert_eq!(policy.calculate_delay(5), Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_within_its_factor() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(1000))
            .with_jitter(true)
            .with_jitter_factor(0.1);

        for _ in 0..100 {
            let delay = policy.calculate_delay(0).as_millis();
            assert!((900..=1100).contains(&delay), "delay {delay} out of band");
        }
    }

    #[test]
    fn custom_condition_overrides_classification() {
        let policy = RetryPolicy::new().with_retry_condition(|_| false);
        assert!(!policy.should_retry(&transient()));
    }
}
