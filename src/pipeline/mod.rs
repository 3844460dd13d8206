//! Search pipeline.
//!
//! - `Orchestrator`: runs eligible fetchers on a bounded worker pool
//! - `aggregate`: merges, deduplicates, filters and truncates results
//! - `SearchCache`: recent-search cache
//! - `Engine`: process-wide wiring of all of the above

mod aggregate;
mod cache;
mod engine;
mod orchestrator;
mod retry;

pub use aggregate::{aggregate, dedup_postings};
pub use cache::{CacheKey, SearchCache};
pub use engine::Engine;
pub use orchestrator::{BatchOutcome, Orchestrator, OrchestratorSettings, UnitReport};
pub use retry::Backoff;
