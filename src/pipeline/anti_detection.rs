//! Anti-detection policy: request identity, pacing and error classification.
//!
//! The policy holds only immutable pools and bounds; every random draw takes
//! the caller's RNG, so one instance is shared by all sources and workers.

use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::AppError;
use crate::models::PacingConfig;

/// Injectable random source shared across workers.
///
/// Production code uses [`RandomSource::from_entropy`]; tests seed it.
#[derive(Debug)]
pub struct RandomSource {
    rng: Mutex<StdRng>,
}

impl RandomSource {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Run `f` with exclusive access to the generator.
    pub fn with<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock();
        f(&mut rng)
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::from_entropy()
    }
}

/// Stateless pacing and identity policy.
#[derive(Debug, Clone)]
pub struct AntiDetectionPolicy {
    user_agents: Vec<String>,
    referers: Vec<String>,
    request_delay_ms: (u64, u64),
    block_delay_ms: (u64, u64),
}

impl AntiDetectionPolicy {
    pub fn new(config: &PacingConfig) -> Self {
        Self {
            user_agents: config
                .user_agents
                .iter()
                .filter(|ua| !ua.trim().is_empty())
                .cloned()
                .collect(),
            referers: config.referers.clone(),
            request_delay_ms: (config.request_delay_min_ms, config.request_delay_max_ms),
            block_delay_ms: (config.block_delay_min_ms, config.block_delay_max_ms),
        }
    }

    /// Random user agent from the pool.
    pub fn user_agent<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        pick(&self.user_agents, rng)
    }

    /// Random referer from the pool.
    pub fn referer<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        pick(&self.referers, rng)
    }

    /// Human-like pause before the next request.
    pub fn request_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        uniform_ms(self.request_delay_ms, rng)
    }

    /// Longer cool-down after an upstream block.
    pub fn block_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        uniform_ms(self.block_delay_ms, rng)
    }

    /// Upstream refused us as a bot (HTTP 403 or "Forbidden").
    pub fn is_blocked(error: &AppError) -> bool {
        if let Some(status) = error.status_code() {
            return status == 403;
        }
        let message = error.to_string();
        message.contains("403") || message.to_lowercase().contains("forbidden")
    }

    /// Failure expected to clear up with backoff.
    pub fn is_retryable(error: &AppError) -> bool {
        if error.is_timeout() || Self::is_blocked(error) {
            return true;
        }
        if let Some(status) = error.status_code() {
            return matches!(status, 403 | 429 | 502 | 503);
        }
        matches!(error, AppError::Http(e) if e.is_connect() || e.is_request())
    }

    /// Strip punctuation and collapse whitespace for a fallback query.
    ///
    /// Idempotent: normalizing twice yields the same string.
    pub fn normalize_query(query: &str) -> String {
        query
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for AntiDetectionPolicy {
    fn default() -> Self {
        Self::new(&PacingConfig::default())
    }
}

fn pick<'a, R: Rng + ?Sized>(pool: &'a [String], rng: &mut R) -> Option<&'a str> {
    if pool.is_empty() {
        return None;
    }
    Some(pool[rng.gen_range(0..pool.len())].as_str())
}

fn uniform_ms<R: Rng + ?Sized>((min, max): (u64, u64), rng: &mut R) -> Duration {
    if max <= min {
        return Duration::from_millis(min);
    }
    Duration::from_millis(rng.gen_range(min..=max))
}
