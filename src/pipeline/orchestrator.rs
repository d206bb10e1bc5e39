// src/pipeline/orchestrator.rs

//! Per-gym source loop and bounded batch execution.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{
    Config, EnrichedFragment, EnrichmentConfig, GymStub, MergedProfile, ResilienceConfig,
    SourceHealth,
};
use crate::pipeline::anti_detection::{AntiDetectionPolicy, RandomSource};
use crate::pipeline::merge::DataMerger;
use crate::pipeline::retry::AdaptiveRetryManager;
use crate::pipeline::validate::DataValidator;
use crate::services::{ProfiledSource, ResponseCache, SourceAdapter, SourceContext};
use crate::utils::http::create_async_client;

/// One source with its shared resilience state.
struct SourceSlot {
    adapter: Arc<dyn SourceAdapter>,
    retry: AdaptiveRetryManager,
    timeout: Duration,
}

/// Drives every configured source for each gym and merges the results.
///
/// Breakers and retry metrics live in the slots and are shared by all
/// concurrent workers of a batch.
pub struct CrawlingOrchestrator {
    slots: Vec<SourceSlot>,
    policy: Arc<AntiDetectionPolicy>,
    rng: Arc<RandomSource>,
    cache: Arc<ResponseCache>,
    validator: DataValidator,
    merger: DataMerger,
    settings: EnrichmentConfig,
    max_concurrent: usize,
    cancel: CancellationToken,
}

impl CrawlingOrchestrator {
    /// Orchestrator without sources; add them with [`Self::add_source`].
    pub fn new(config: &Config, rng: Arc<RandomSource>, cancel: CancellationToken) -> Self {
        Self {
            slots: Vec::new(),
            policy: Arc::new(AntiDetectionPolicy::new(&config.pacing)),
            rng,
            cache: Arc::new(ResponseCache::new(Duration::from_secs(
                config.enrichment.cache_ttl_secs,
            ))),
            validator: DataValidator::new(),
            merger: DataMerger::default(),
            settings: config.enrichment.clone(),
            max_concurrent: config.crawler.max_concurrent.max(1),
            cancel,
        }
    }

    /// Build the orchestrator for every enabled source in `config`.
    ///
    /// Sources whose API key is missing are skipped with a warning. Any
    /// other construction failure is fatal.
    pub fn from_config(config: &Config, cancel: CancellationToken) -> Result<Self> {
        config.validate()?;

        let mut orchestrator = Self::new(config, Arc::new(RandomSource::from_entropy()), cancel);
        let ctx = orchestrator.source_context(create_async_client(&config.crawler)?);

        for profile in config.enabled_sources() {
            let source = match ProfiledSource::new(profile.clone(), ctx.clone()) {
                Ok(source) => source,
                Err(AppError::Config(message)) => {
                    log::warn!("Skipping source '{}': {}", profile.id, message);
                    continue;
                }
                Err(e) => return Err(e),
            };
            orchestrator.add_source(
                Arc::new(source),
                config.resilience_for(profile),
                config.timeout_for(profile),
            );
        }

        if orchestrator.slots.is_empty() {
            log::warn!("No usable sources; every gym will get a minimal profile");
        }
        Ok(orchestrator)
    }

    /// Collaborators handed to each [`ProfiledSource`].
    pub fn source_context(&self, client: reqwest::Client) -> SourceContext {
        SourceContext {
            client,
            policy: Arc::clone(&self.policy),
            rng: Arc::clone(&self.rng),
            cache: Arc::clone(&self.cache),
        }
    }

    /// Append a source. Sources are queried in insertion order, which is also
    /// the merge priority.
    pub fn add_source(
        &mut self,
        adapter: Arc<dyn SourceAdapter>,
        resilience: &ResilienceConfig,
        timeout: Duration,
    ) {
        let retry = AdaptiveRetryManager::new(adapter.id().as_str(), resilience, Arc::clone(&self.rng));
        self.slots.push(SourceSlot {
            adapter,
            retry,
            timeout,
        });
        self.merger = DataMerger::new(
            self.slots
                .iter()
                .map(|slot| slot.adapter.id().clone())
                .collect(),
        );
    }

    pub fn source_count(&self) -> usize {
        self.slots.len()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Enrich one gym. Never fails: without usable fragments the gym gets a
    /// minimal profile.
    pub async fn enrich(&self, stub: &GymStub) -> MergedProfile {
        let mut fragments: Vec<EnrichedFragment> = Vec::new();

        for slot in &self.slots {
            if self.cancel.is_cancelled() {
                log::debug!("{}: cancelled before '{}'", stub.name, slot.adapter.id());
                break;
            }

            match self.query_source(slot, stub).await {
                Ok(Some(fragment)) => match self.validator.check(&fragment) {
                    Ok(()) => fragments.push(fragment),
                    Err(e) => log::debug!("Dropping fragment: {}", e),
                },
                Ok(None) => log::debug!("[{}] {}: no signal", slot.adapter.id(), stub.name),
                Err(error) => self.on_source_error(slot, stub, &error).await,
            }

            if self.should_stop(&fragments) {
                log::debug!(
                    "{}: early stop after '{}' with {} fragments",
                    stub.name,
                    slot.adapter.id(),
                    fragments.len()
                );
                break;
            }
        }

        self.merger.merge(stub, &fragments)
    }

    /// Enrich a batch with bounded concurrency, preserving input order.
    ///
    /// Stubs not started before cancellation still receive a minimal profile.
    pub async fn enrich_all(&self, stubs: &[GymStub]) -> Vec<MergedProfile> {
        stream::iter(stubs)
            .map(|stub| async move {
                if self.cancel.is_cancelled() {
                    return MergedProfile::minimal(stub);
                }
                self.enrich(stub).await
            })
            .buffered(self.max_concurrent)
            .collect()
            .await
    }

    /// Per-source breaker state and retry counters.
    pub fn health(&self) -> Vec<SourceHealth> {
        self.slots
            .iter()
            .map(|slot| {
                let circuit = slot.retry.breaker().snapshot();
                let metrics = slot.retry.metrics();
                SourceHealth {
                    source: slot.adapter.id().clone(),
                    name: slot.adapter.name().to_string(),
                    state: circuit.state,
                    failure_count: circuit.failure_count,
                    total_attempts: metrics.total_attempts,
                    successful_attempts: metrics.successful_attempts,
                    failed_attempts: metrics.failed_attempts,
                    consecutive_failures: metrics.consecutive_failures,
                    success_rate: metrics.success_rate(),
                    average_delay_ms: metrics.average_delay_ms,
                    last_failure_time: metrics.last_failure_time,
                }
            })
            .collect()
    }

    /// Query one source, retrying once with a simplified name on no signal.
    async fn query_source(
        &self,
        slot: &SourceSlot,
        stub: &GymStub,
    ) -> Result<Option<EnrichedFragment>> {
        let address = stub.address.as_deref();
        let found = self.call(slot, &stub.name, address).await?;
        if found.is_some() || !self.settings.simplify_on_empty {
            return Ok(found);
        }

        let simplified = AntiDetectionPolicy::normalize_query(&stub.name);
        if simplified.is_empty() || (simplified == stub.name && address.is_none()) {
            return Ok(None);
        }

        log::debug!(
            "[{}] {}: retrying as '{}'",
            slot.adapter.id(),
            stub.name,
            simplified
        );
        self.call(slot, &simplified, None).await
    }

    /// One logical call: cache, pacing, then breaker, retries and a
    /// per-attempt timeout. Cache hits skip the upstream and its bookkeeping.
    async fn call(
        &self,
        slot: &SourceSlot,
        name: &str,
        address: Option<&str>,
    ) -> Result<Option<EnrichedFragment>> {
        let adapter = &slot.adapter;
        if let Some(cached) = adapter.cached(name, address) {
            return Ok(cached);
        }

        let delay = self.rng.with(|rng| self.policy.request_delay(rng));
        if !self.pause(delay).await {
            return Ok(None);
        }

        let timeout = slot.timeout;

        slot.retry
            .execute_with_retry(
                move || async move {
                    tokio::time::timeout(timeout, adapter.search(name, address))
                        .await
                        .map_err(|_| AppError::Timeout {
                            context: adapter.id().to_string(),
                            secs: timeout.as_secs(),
                        })?
                },
                name,
            )
            .await
    }

    async fn on_source_error(&self, slot: &SourceSlot, stub: &GymStub, error: &AppError) {
        let id = slot.adapter.id();

        if error.is_circuit_open() {
            log::debug!("[{}] {}: skipped, circuit open", id, stub.name);
        } else if AntiDetectionPolicy::is_blocked(error) {
            let delay = self.rng.with(|rng| self.policy.block_delay(rng));
            log::warn!(
                "[{}] {}: blocked by upstream, cooling down for {:?}",
                id,
                stub.name,
                delay
            );
            self.pause(delay).await;
        } else {
            log::warn!("[{}] {}: giving up: {}", id, stub.name, error);
        }
    }

    fn should_stop(&self, fragments: &[EnrichedFragment]) -> bool {
        let best = fragments.iter().map(|f| f.confidence).fold(0.0, f64::max);
        fragments.len() >= self.settings.min_fragments_before_stop.max(1)
            && best >= self.settings.early_stop_threshold
    }

    /// Sleep unless cancelled first. Returns false when cancelled.
    async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
