//! Adaptive retry with exponential backoff, jitter and escalation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;

use crate::error::{AppError, Result};
use crate::models::{ResilienceConfig, RetryMetrics};
use crate::pipeline::anti_detection::{AntiDetectionPolicy, RandomSource};
use crate::pipeline::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

/// Consecutive failures after which backoff escalates.
const ESCALATION_AFTER: u32 = 3;
/// Upper bound of the escalation factor.
const MAX_ESCALATION: f64 = 3.0;
/// Jitter band around the computed delay (±10%).
const JITTER_RATIO: f64 = 0.1;

/// Backoff schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub min_delay: Duration,
    pub backoff_multiplier: f64,
}

impl From<&ResilienceConfig> for RetryPolicy {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            min_delay: Duration::from_millis(config.min_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

impl RetryPolicy {
    /// Delay before jitter: `base * multiplier^(attempt-1)`, escalated, capped.
    pub fn base_delay_for(&self, attempt: u32, consecutive_failures: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let mut ms = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        if consecutive_failures > ESCALATION_AFTER {
            ms *= escalation(consecutive_failures);
        }
        let capped = ms.min(self.max_delay.as_millis() as f64);
        Duration::from_secs_f64(capped.max(0.0) / 1000.0)
    }

    /// Jittered delay, floored at `min_delay`.
    pub fn delay_for<R: Rng + ?Sized>(
        &self,
        attempt: u32,
        consecutive_failures: u32,
        rng: &mut R,
    ) -> Duration {
        let base = self.base_delay_for(attempt, consecutive_failures).as_secs_f64();
        let jitter = rng.gen_range(-JITTER_RATIO..=JITTER_RATIO);
        let jittered = Duration::from_secs_f64(base * (1.0 + jitter));
        jittered.max(self.min_delay)
    }
}

/// 1× at the escalation point, growing by 0.5× per extra failure, at most 3×.
fn escalation(consecutive_failures: u32) -> f64 {
    let extra = consecutive_failures.saturating_sub(ESCALATION_AFTER) as f64;
    (1.0 + extra * 0.5).min(MAX_ESCALATION)
}

/// Retry wrapper owning the circuit breaker of one source.
#[derive(Debug)]
pub struct AdaptiveRetryManager {
    name: String,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
    metrics: Mutex<RetryMetrics>,
    rng: Arc<RandomSource>,
}

impl AdaptiveRetryManager {
    pub fn new(name: impl Into<String>, config: &ResilienceConfig, rng: Arc<RandomSource>) -> Self {
        let name = name.into();
        Self {
            breaker: CircuitBreaker::new(name.clone(), CircuitBreakerConfig::from(config)),
            policy: RetryPolicy::from(config),
            metrics: Mutex::new(RetryMetrics::default()),
            name,
            rng,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Copy of the process-lifetime counters.
    pub fn metrics(&self) -> RetryMetrics {
        self.metrics.lock().clone()
    }

    /// Run `op` through the breaker, retrying failures with backoff.
    ///
    /// Returns the last error once `max_retries` attempts have failed. A
    /// non-retryable error ends the loop immediately. A circuit rejection
    /// also ends it, reporting the last real failure if this call saw one.
    pub async fn execute_with_retry<T, F, Fut>(&self, mut op: F, context: &str) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.policy.max_retries {
            let error = match self.breaker.execute(|| op()).await {
                Ok(value) => {
                    let mut metrics = self.metrics.lock();
                    metrics.total_attempts += 1;
                    metrics.successful_attempts += 1;
                    metrics.consecutive_failures = 0;
                    return Ok(value);
                }
                Err(error) => error,
            };

            if error.is_circuit_open() {
                log::debug!("[{}] {}: circuit open, stopping", self.name, context);
                return Err(last_error.unwrap_or(error));
            }

            let consecutive = {
                let mut metrics = self.metrics.lock();
                metrics.total_attempts += 1;
                metrics.failed_attempts += 1;
                metrics.consecutive_failures += 1;
                metrics.last_failure_time = Some(Utc::now());
                metrics.consecutive_failures
            };

            if !AntiDetectionPolicy::is_retryable(&error) {
                log::debug!(
                    "[{}] {}: non-retryable failure on attempt {}: {}",
                    self.name,
                    context,
                    attempt,
                    error
                );
                return Err(error);
            }

            if attempt < self.policy.max_retries {
                let delay = self
                    .rng
                    .with(|rng| self.policy.delay_for(attempt, consecutive, rng));
                self.metrics.lock().record_delay(delay.as_secs_f64() * 1000.0);
                log::debug!(
                    "[{}] {}: attempt {}/{} failed ({}), retrying in {:?}",
                    self.name,
                    context,
                    attempt,
                    self.policy.max_retries,
                    error,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| AppError::upstream(context, "no attempts were made")))
    }
}
