//! Service layer for the enrichment pipeline.
//!
//! - Source adapters (`SourceAdapter`, `ProfiledSource`)
//! - Text extraction heuristics (`Extractor`)
//! - Response caching (`ResponseCache`)

mod cache;
mod extract;
mod source;

pub use cache::ResponseCache;
pub use extract::{Extractor, Signals};
pub use source::{ProfiledSource, SourceAdapter, SourceContext};
