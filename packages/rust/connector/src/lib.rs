//! Authority-source connectors.
//!
//! This crate provides:
//! - [`SourceConnector`] — the search/detail capability the orchestrator uses
//! - [`LocConnector`] — id.loc.gov search-table scraping and JSON-LD records
//! - [`WikidataConnector`] — SPARQL lookup of works by contributor
//! - [`RateLimiter`] / [`HttpFetcher`] — per-source request budget and 429 handling

pub mod http;
pub mod loc;
pub mod rate_limit;
pub mod source;
pub mod wikidata;

pub use http::{Fetched, HttpFetcher};
pub use loc::{LOC_URI_BASE, LocConnector};
pub use rate_limit::RateLimiter;
pub use source::{SearchHit, SearchQuery, SourceConnector};
pub use wikidata::{AgentKey, GraphWork, KnowledgeGraph, WikidataConnector};
