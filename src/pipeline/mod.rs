//! Enrichment pipeline.
//!
//! - Resilience: `CircuitBreaker`, `AdaptiveRetryManager`, `AntiDetectionPolicy`
//! - Reconciliation: `DataValidator`, `DataMerger`
//! - Execution: `CrawlingOrchestrator` and the `run_enrichment` entry point

pub mod anti_detection;
pub mod circuit_breaker;
pub mod enrich;
pub mod merge;
pub mod orchestrator;
pub mod retry;
pub mod validate;

pub use anti_detection::{AntiDetectionPolicy, RandomSource};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use enrich::{EnrichmentReport, run_enrichment, run_with};
pub use merge::DataMerger;
pub use orchestrator::CrawlingOrchestrator;
pub use retry::{AdaptiveRetryManager, RetryPolicy};
pub use validate::DataValidator;
