//! lacuna-discovery — Multi-source gap-filling paper discovery.
//!
//! Pipeline stages, leaf-first:
//! - Source adapters (arXiv, Semantic Scholar, IEEE Xplore, CrossRef, Europe PMC)
//! - Query generation from a research-gap description
//! - Concurrent fan-out search with per-source failure isolation
//! - Title-prefix deduplication
//! - Relevance ranking (optionally LLM-delegated)
//! - Knowledge-store filtering of already known papers
//! - Page enrichment of a selected paper
//! - The gap-fill orchestrator composing all of the above

pub mod aggregator;
pub mod dedup;
pub mod enrich;
pub mod error;
pub mod filter;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod ranker;
pub mod sources;
pub mod store;

pub use error::{DiscoveryError, FetchError, SourceError, StoreError};
pub use models::{EnrichedPaperRecord, GapFillRequest, PaperRecord, Query, SelectionResult, SourceResult};
pub use pipeline::{GapFillEvent, GapFillOrchestrator, GapFillReport};
