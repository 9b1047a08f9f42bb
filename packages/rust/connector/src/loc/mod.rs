//! id.loc.gov connector: search-table scraping plus JSON-LD detail records.

pub mod detail;
pub mod search;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use reconcile_matching::AgentResolver;
use reconcile_shared::{
    AuthoritySource, CandidateRecord, LocConfig, ReconcileError, Result,
};
use reconcile_storage::Cache;

use crate::http::HttpFetcher;
use crate::source::{SearchHit, SearchQuery, SourceConnector};

/// Canonical base of id.loc.gov identifiers, independent of the configured
/// service URL.
pub const LOC_URI_BASE: &str = "http://id.loc.gov";

const JSON_LD_ACCEPT: &str = "application/ld+json, application/json;q=0.9";

/// Connector for the id.loc.gov Works and Hubs collections.
pub struct LocConnector<C> {
    http: HttpFetcher,
    base_url: String,
    cache: Arc<C>,
}

impl<C: Cache> LocConnector<C> {
    pub fn new(config: &LocConfig, cache: Arc<C>) -> Result<Self> {
        let http = HttpFetcher::new(
            "id.loc.gov",
            config.requests_per_minute,
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.retry_backoff_secs),
        )?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    /// Map an identifier to its JSON detail URL on the configured service.
    fn detail_url(&self, uri: &str) -> Result<String> {
        let path = uri
            .strip_prefix(LOC_URI_BASE)
            .or_else(|| uri.strip_prefix("https://id.loc.gov"))
            .ok_or_else(|| ReconcileError::validation(format!("not an id.loc.gov URI: {uri}")))?;
        Ok(format!("{}{}.json", self.base_url, path.trim_end_matches(".html")))
    }

    async fn fetch_json(&self, uri: &str) -> Result<String> {
        let url = self.detail_url(uri)?;
        let fetched = self.http.get(&url, JSON_LD_ACCEPT).await?;
        if fetched.status.is_server_error() {
            return Err(ReconcileError::Network(format!(
                "HTTP {} from {url}",
                fetched.status.as_u16()
            )));
        }
        if !fetched.is_success() {
            return Err(ReconcileError::parse(format!(
                "HTTP {} for detail record {url}",
                fetched.status.as_u16()
            )));
        }
        Ok(fetched.body)
    }
}

impl<C: Cache> AgentResolver for LocConnector<C> {
    fn is_external(&self, uri: &str) -> bool {
        uri.starts_with("http://id.loc.gov/") || uri.starts_with("https://id.loc.gov/")
    }

    #[instrument(skip(self))]
    async fn resolve_agent_label(&self, uri: &str) -> Result<Option<String>> {
        match self.cache.get(uri).await {
            Ok(Some(label)) => {
                debug!("agent label cache hit");
                return Ok(Some(label));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "agent label cache read failed"),
        }

        let json = self.fetch_json(uri).await?;
        let label = detail::parse_agent_label(uri, &json)?;

        if let Some(label) = &label {
            if let Err(e) = self.cache.set_if_absent(uri, label).await {
                warn!(error = %e, "agent label cache write failed");
            }
        }
        Ok(label)
    }
}

impl<C: Cache> SourceConnector for LocConnector<C> {
    fn source(&self) -> AuthoritySource {
        AuthoritySource::LibraryOfCongress
    }

    fn query_url(&self, query: &SearchQuery<'_>) -> String {
        search::search_url(&self.base_url, query.text, query.types, query.category)
    }

    #[instrument(skip_all, fields(title = %query.text, category = %query.category))]
    async fn search(&self, query: &SearchQuery<'_>) -> Result<Vec<SearchHit>> {
        let url = self.query_url(query);
        let html = self.http.get_ok(&url, "text/html").await?;
        let rows = search::parse_results(&html);
        debug!(rows = rows.len(), "parsed search results");

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let uri = row.uri(LOC_URI_BASE);
            let record = match self.fetch_detail(&uri).await {
                Ok(detail) => {
                    let mut record = CandidateRecord::new(&uri);
                    for title in row.heading.iter().chain(row.variants.iter()) {
                        record.push_title(title);
                    }
                    for title in &detail.titles {
                        record.push_title(title);
                    }
                    Ok(CandidateRecord {
                        titles: record.titles,
                        ..detail
                    })
                }
                Err(e) => {
                    warn!(%uri, error = %e, "skipping unreadable candidate");
                    Err(e)
                }
            };
            hits.push(SearchHit { uri, record });
        }
        Ok(hits)
    }

    async fn fetch_detail(&self, uri: &str) -> Result<CandidateRecord> {
        let json = self.fetch_json(uri).await?;
        detail::parse_record(uri, &json)
    }
}
