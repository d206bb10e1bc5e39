//! Per-source health reporting types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SourceId;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Process-lifetime retry counters for one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryMetrics {
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub failed_attempts: u64,
    pub consecutive_failures: u32,
    /// Mean backoff slept before an attempt, in milliseconds
    pub average_delay_ms: f64,
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Number of backoff sleeps folded into `average_delay_ms`
    #[serde(skip)]
    pub delay_samples: u64,
}

impl RetryMetrics {
    /// Share of attempts that succeeded; 1.0 before any attempt.
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            1.0
        } else {
            self.successful_attempts as f64 / self.total_attempts as f64
        }
    }

    /// Fold one slept delay into the running mean.
    pub fn record_delay(&mut self, delay_ms: f64) {
        self.delay_samples += 1;
        self.average_delay_ms += (delay_ms - self.average_delay_ms) / self.delay_samples as f64;
    }
}

/// Health snapshot for dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: SourceId,
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub failed_attempts: u64,
    pub consecutive_failures: u32,
    pub success_rate: f64,
    pub average_delay_ms: f64,
    pub last_failure_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_defaults_to_one() {
        assert_eq!(RetryMetrics::default().success_rate(), 1.0);
    }

    #[test]
    fn running_delay_average() {
        let mut metrics = RetryMetrics::default();
        metrics.record_delay(100.0);
        metrics.record_delay(300.0);
        assert!((metrics.average_delay_ms - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn breaker_state_serializes_upper_case() {
        let json = serde_json::to_string(&BreakerState::HalfOpen).unwrap();
        assert_eq!(json, "\"HALF_OPEN\"");
    }
}
