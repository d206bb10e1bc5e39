//! Circuit Breaker pattern implementation.
//!
//! Stops hammering an upstream once it starts failing. One breaker exists
//! per source type and is shared by every worker, so a flaky upstream is
//! shielded for the whole batch as soon as any worker observes it.
//!
//! ```text
//! CLOSED    --failure_threshold failures-->        OPEN
//! OPEN      --recovery_timeout elapsed-->          HALF_OPEN
//! HALF_OPEN --success-->                           CLOSED
//! HALF_OPEN --half_open_max_calls failures-->      OPEN
//! ```
//!
//! While HALF_OPEN, at most `half_open_max_calls` trial calls are in flight
//! or failed at once; concurrent callers beyond that are rejected.

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{AppError, Result};
use crate::models::{BreakerState, ResilienceConfig};

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures in CLOSED before opening
    pub failure_threshold: u32,
    /// Time spent OPEN before a trial call is let through
    pub recovery_timeout: Duration,
    /// Trial calls allowed while HALF_OPEN
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl From<&ResilienceConfig> for CircuitBreakerConfig {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            recovery_timeout: config.recovery_timeout(),
            half_open_max_calls: config.half_open_max_calls,
        }
    }
}

/// Mutable breaker state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitState {
    pub state: BreakerState,
    pub failure_count: u32,
    pub last_failure_time: Option<Instant>,
    /// Trial calls admitted in HALF_OPEN that have not finished yet
    pub half_open_in_flight: u32,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure_time: None,
            half_open_in_flight: 0,
        }
    }
}

/// Per-source failure guard.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    /// Create a breaker for the named call-site.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(CircuitState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> CircuitState {
        self.state.lock().clone()
    }

    pub fn state(&self) -> BreakerState {
        self.state.lock().state
    }

    /// Run `op` unless the circuit rejects it.
    ///
    /// A rejected call returns [`AppError::CircuitOpen`] without invoking `op`.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let trial = self.admit()?;
        let _slot = trial.then(|| TrialSlot(self));

        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                self.on_failure();
                Err(error)
            }
        }
    }

    /// Returns whether the admitted call is a HALF_OPEN trial.
    fn admit(&self) -> Result<bool> {
        let mut state = self.state.lock();

        if state.state == BreakerState::Open {
            let recovered = state
                .last_failure_time
                .is_none_or(|t| t.elapsed() > self.config.recovery_timeout);
            if !recovered {
                return Err(self.open_error());
            }
            log::info!("Circuit breaker '{}': OPEN → HALF_OPEN", self.name);
            state.state = BreakerState::HalfOpen;
            state.failure_count = 0;
            state.half_open_in_flight = 0;
        }

        if state.state != BreakerState::HalfOpen {
            return Ok(false);
        }

        if state.failure_count + state.half_open_in_flight >= self.config.half_open_max_calls {
            log::debug!(
                "Circuit breaker '{}': trial budget in use ({} failed, {} in flight)",
                self.name,
                state.failure_count,
                state.half_open_in_flight
            );
            return Err(self.open_error());
        }
        state.half_open_in_flight += 1;
        Ok(true)
    }

    fn on_success(&self) {
        let mut state = self.state.lock();
        if state.state != BreakerState::Closed {
            log::info!("Circuit breaker '{}': {:?} → CLOSED", self.name, state.state);
        }
        state.state = BreakerState::Closed;
        state.failure_count = 0;
        state.half_open_in_flight = 0;
    }

    fn on_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());

        match state.state {
            BreakerState::Closed if state.failure_count >= self.config.failure_threshold => {
                log::warn!(
                    "Circuit breaker '{}': CLOSED → OPEN ({} consecutive failures)",
                    self.name,
                    state.failure_count
                );
                state.state = BreakerState::Open;
            }
            BreakerState::HalfOpen if state.failure_count >= self.config.half_open_max_calls => {
                log::warn!(
                    "Circuit breaker '{}': HALF_OPEN → OPEN after {} failed trial calls",
                    self.name,
                    state.failure_count
                );
                state.state = BreakerState::Open;
            }
            _ => {}
        }
    }

    fn open_error(&self) -> AppError {
        AppError::CircuitOpen {
            name: self.name.clone(),
        }
    }
}

/// Releases a HALF_OPEN trial slot, also when the call is dropped midway.
struct TrialSlot<'a>(&'a CircuitBreaker);

impl Drop for TrialSlot<'_> {
    fn drop(&mut self) {
        let mut state = self.0.state.lock();
        state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
    }
}
