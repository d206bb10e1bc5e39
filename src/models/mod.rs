// src/models/mod.rs

//! Domain models for the enrichment pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod gym;
mod health;
mod source;

// Re-export all public types
pub use config::{Config, CrawlerConfig, EnrichmentConfig, PacingConfig, ResilienceConfig};
pub use gym::{ClockTime, EnrichedFragment, GymStub, MergedProfile, SourceId};
pub use health::{BreakerState, RetryMetrics, SourceHealth};
pub use source::{
    ExtractionStrategy, FacilityKeyword, JsonFields, SourceKind, SourceProfile,
    default_facility_keywords, default_sources,
};
