// src/pipeline/enrich.rs

//! Batch enrichment entry point.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{Config, GymStub, MergedProfile, SourceHealth};
use crate::pipeline::orchestrator::CrawlingOrchestrator;

/// Outcome of one batch run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One profile per input stub, in input order
    pub profiles: Vec<MergedProfile>,
    pub health: Vec<SourceHealth>,
    pub enriched_count: usize,
    pub minimal_count: usize,
}

/// Enrich `stubs` with every usable source in `config`.
///
/// Only configuration errors fail the run; upstream trouble degrades to
/// minimal profiles.
pub async fn run_enrichment(
    config: &Config,
    stubs: &[GymStub],
    cancel: CancellationToken,
) -> Result<EnrichmentReport> {
    let orchestrator = CrawlingOrchestrator::from_config(config, cancel)?;
    Ok(run_with(&orchestrator, stubs).await)
}

/// Enrich `stubs` with an already built orchestrator.
pub async fn run_with(orchestrator: &CrawlingOrchestrator, stubs: &[GymStub]) -> EnrichmentReport {
    let started_at = Utc::now();
    log::info!(
        "Enriching {} gyms with {} sources",
        stubs.len(),
        orchestrator.source_count()
    );

    let profiles = orchestrator.enrich_all(stubs).await;
    let enriched_count = profiles.iter().filter(|p| p.is_enriched()).count();
    let minimal_count = profiles.len() - enriched_count;

    if orchestrator.cancellation().is_cancelled() {
        log::warn!("Run cancelled; unfinished gyms received minimal profiles");
    }
    let purged = orchestrator.cache().purge_expired();
    if purged > 0 {
        log::debug!("Purged {} expired cache entries", purged);
    }

    let finished_at = Utc::now();
    log::info!(
        "Enrichment complete: {} enriched, {} minimal in {:.1}s",
        enriched_count,
        minimal_count,
        (finished_at - started_at).num_milliseconds() as f64 / 1000.0
    );

    EnrichmentReport {
        started_at,
        finished_at,
        profiles,
        health: orchestrator.health(),
        enriched_count,
        minimal_count,
    }
}
