//! Application configuration structures.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{SourceProfile, default_sources};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and worker pool settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Anti-detection pacing and request identity
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Default circuit breaker and retry settings
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Early stop, query fallback and caching
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Upstream source profiles
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceProfile>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Enabled sources in priority order.
    pub fn enabled_sources(&self) -> Vec<&SourceProfile> {
        let mut sources: Vec<_> = self.sources.iter().filter(|s| s.enabled).collect();
        sources.sort_by_key(|s| s.priority);
        sources
    }

    /// Resilience settings for a source, honoring its override.
    pub fn resilience_for<'a>(&'a self, source: &'a SourceProfile) -> &'a ResilienceConfig {
        source.resilience.as_ref().unwrap_or(&self.resilience)
    }

    /// Per-call deadline for a source.
    pub fn timeout_for(&self, source: &SourceProfile) -> Duration {
        Duration::from_secs(source.timeout_secs.unwrap_or(self.crawler.timeout_secs))
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        self.pacing.validate()?;
        self.resilience.validate("resilience")?;

        let threshold = self.enrichment.early_stop_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(AppError::validation(
                "enrichment.early_stop_threshold must be a non-negative number",
            ));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            let ctx = format!("sources.{}", source.id);
            if !seen.insert(source.id.as_str()) {
                return Err(AppError::validation(format!("{ctx}: duplicate source id")));
            }
            if !(0.0..=1.0).contains(&source.confidence) {
                return Err(AppError::validation(format!(
                    "{ctx}.confidence must be within [0, 1]"
                )));
            }
            if !source.endpoint.contains("{query}") {
                return Err(AppError::validation(format!(
                    "{ctx}.endpoint has no {{query}} placeholder"
                )));
            }
            if source.timeout_secs == Some(0) {
                return Err(AppError::validation(format!("{ctx}.timeout_secs must be > 0")));
            }
            if let Some(resilience) = &source.resilience {
                resilience.validate(&format!("{ctx}.resilience"))?;
            }
        }

        if self.enabled_sources().is_empty() {
            return Err(AppError::validation("No enabled sources defined"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            pacing: PacingConfig::default(),
            resilience: ResilienceConfig::default(),
            enrichment: EnrichmentConfig::default(),
            sources: default_sources(),
        }
    }
}

/// HTTP client and worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Gyms processed concurrently
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Request identity pools and human-like pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "defaults::request_delay_min")]
    pub request_delay_min_ms: u64,

    #[serde(default = "defaults::request_delay_max")]
    pub request_delay_max_ms: u64,

    /// Cool-down after an upstream block
    #[serde(default = "defaults::block_delay_min")]
    pub block_delay_min_ms: u64,

    #[serde(default = "defaults::block_delay_max")]
    pub block_delay_max_ms: u64,

    #[serde(default = "defaults::user_agents")]
    pub user_agents: Vec<String>,

    #[serde(default = "defaults::referers")]
    pub referers: Vec<String>,
}

impl PacingConfig {
    fn validate(&self) -> Result<()> {
        if self.request_delay_min_ms > self.request_delay_max_ms {
            return Err(AppError::validation(
                "pacing.request_delay_min_ms exceeds request_delay_max_ms",
            ));
        }
        if self.block_delay_min_ms > self.block_delay_max_ms {
            return Err(AppError::validation(
                "pacing.block_delay_min_ms exceeds block_delay_max_ms",
            ));
        }
        if self.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(AppError::validation("pacing.user_agents is empty"));
        }
        Ok(())
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            request_delay_min_ms: defaults::request_delay_min(),
            request_delay_max_ms: defaults::request_delay_max(),
            block_delay_min_ms: defaults::block_delay_min(),
            block_delay_max_ms: defaults::block_delay_max(),
            user_agents: defaults::user_agents(),
            referers: defaults::referers(),
        }
    }
}

/// Circuit breaker and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Failures in CLOSED before the breaker opens
    #[serde(default = "defaults::failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds OPEN before a trial call is allowed
    #[serde(default = "defaults::recovery_timeout")]
    pub recovery_timeout_secs: u64,

    /// Failed trial calls tolerated in HALF_OPEN
    #[serde(default = "defaults::half_open_max_calls")]
    pub half_open_max_calls: u32,

    /// Attempts per source call, including the first
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    #[serde(default = "defaults::base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,

    /// Floor applied after jitter
    #[serde(default = "defaults::min_delay")]
    pub min_delay_ms: u64,

    #[serde(default = "defaults::backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl ResilienceConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    fn validate(&self, ctx: &str) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(AppError::validation(format!(
                "{ctx}.failure_threshold must be > 0"
            )));
        }
        if self.half_open_max_calls == 0 {
            return Err(AppError::validation(format!(
                "{ctx}.half_open_max_calls must be > 0"
            )));
        }
        if self.max_retries == 0 {
            return Err(AppError::validation(format!("{ctx}.max_retries must be > 0")));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(AppError::validation(format!(
                "{ctx}.backoff_multiplier must be >= 1.0"
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(AppError::validation(format!(
                "{ctx}.base_delay_ms exceeds max_delay_ms"
            )));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(AppError::validation(format!(
                "{ctx}.min_delay_ms exceeds max_delay_ms"
            )));
        }
        Ok(())
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::failure_threshold(),
            recovery_timeout_secs: defaults::recovery_timeout(),
            half_open_max_calls: defaults::half_open_max_calls(),
            max_retries: defaults::max_retries(),
            base_delay_ms: defaults::base_delay(),
            max_delay_ms: defaults::max_delay(),
            min_delay_ms: defaults::min_delay(),
            backoff_multiplier: defaults::backoff_multiplier(),
        }
    }
}

/// Orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Best fragment confidence considered good enough to stop querying
    #[serde(default = "defaults::early_stop_threshold")]
    pub early_stop_threshold: f64,

    /// Fragments required before early stop may trigger
    #[serde(default = "defaults::min_fragments_before_stop")]
    pub min_fragments_before_stop: usize,

    /// Retry once with a punctuation-stripped query when a source finds nothing
    #[serde(default = "defaults::simplify_on_empty")]
    pub simplify_on_empty: bool,

    /// Response cache lifetime; 0 disables caching
    #[serde(default = "defaults::cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            early_stop_threshold: defaults::early_stop_threshold(),
            min_fragments_before_stop: defaults::min_fragments_before_stop(),
            simplify_on_empty: defaults::simplify_on_empty(),
            cache_ttl_secs: defaults::cache_ttl(),
        }
    }
}

mod defaults {
    // Crawler defaults
    pub fn timeout() -> u64 {
        10
    }
    pub fn max_concurrent() -> usize {
        4
    }

    // Pacing defaults
    pub fn request_delay_min() -> u64 {
        2_000
    }
    pub fn request_delay_max() -> u64 {
        5_000
    }
    pub fn block_delay_min() -> u64 {
        10_000
    }
    pub fn block_delay_max() -> u64 {
        20_000
    }
    pub fn user_agents() -> Vec<String> {
        vec![
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".into(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15".into(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0".into(),
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36".into(),
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1".into(),
        ]
    }
    pub fn referers() -> Vec<String> {
        vec![
            "https://www.google.com/".into(),
            "https://www.naver.com/".into(),
            "https://www.daum.net/".into(),
            "https://map.kakao.com/".into(),
        ]
    }

    // Resilience defaults
    pub fn failure_threshold() -> u32 {
        5
    }
    pub fn recovery_timeout() -> u64 {
        60
    }
    pub fn half_open_max_calls() -> u32 {
        3
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn base_delay() -> u64 {
        1_000
    }
    pub fn max_delay() -> u64 {
        30_000
    }
    pub fn min_delay() -> u64 {
        100
    }
    pub fn backoff_multiplier() -> f64 {
        2.0
    }

    // Enrichment defaults
    pub fn early_stop_threshold() -> f64 {
        0.7
    }
    pub fn min_fragments_before_stop() -> usize {
        2
    }
    pub fn simplify_on_empty() -> bool {
        true
    }
    pub fn cache_ttl() -> u64 {
        3_600
    }
}
