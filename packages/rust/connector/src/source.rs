//! The capability the orchestrator searches authority sources through.

use std::future::Future;

use reconcile_matching::AgentResolver;
use reconcile_shared::{AuthoritySource, CandidateRecord, Category, Result};

/// One search request: a title variant, the local Work's type URIs, and the
/// resource category to search.
#[derive(Debug, Clone, Copy)]
pub struct SearchQuery<'a> {
    pub text: &'a str,
    pub types: &'a [String],
    pub category: Category,
}

/// One search result.
///
/// `record` is an error when the detail record could not be read; such hits
/// are skipped by the scorer.
#[derive(Debug)]
pub struct SearchHit {
    pub uri: String,
    pub record: Result<CandidateRecord>,
}

/// Search and detail access to one authority source.
///
/// A transport failure (`Err` with [`is_transport`]) is distinct from an
/// empty hit list.
///
/// [`is_transport`]: reconcile_shared::ReconcileError::is_transport
pub trait SourceConnector: AgentResolver {
    fn source(&self) -> AuthoritySource;

    /// The URL a search for `query` is sent to, as recorded in the audit log.
    fn query_url(&self, query: &SearchQuery<'_>) -> String;

    /// Ordered hits for `query`, each merged with its detail record.
    fn search(&self, query: &SearchQuery<'_>) -> impl Future<Output = Result<Vec<SearchHit>>>;

    /// Fetch and parse the detail record for `uri`.
    fn fetch_detail(&self, uri: &str) -> impl Future<Output = Result<CandidateRecord>>;
}
