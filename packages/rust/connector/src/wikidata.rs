//! Wikidata connector: finds works attributed to a contributor.
//!
//! The contributor is resolved to an entity by its Library of Congress name
//! identifier (`P244`), falling back to a free-text entity search. Its
//! occupations (`P106`) decide which property ties it to its works, and the
//! resulting work labels are cached per contributor.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use reconcile_shared::{AgentRef, Contributor, ReconcileError, Result, WikidataConfig};
use reconcile_storage::Cache;

use crate::http::HttpFetcher;

/// Base of Wikidata entity URIs.
pub const ENTITY_BASE: &str = "http://www.wikidata.org/entity/";

/// Hash field written when a contributor has no works, so the lookup is not repeated.
pub const EMPTY_MARKER: &str = "__empty__";

const SPARQL_ACCEPT: &str = "application/sparql-results+json";

/// Property linking a work to its author.
const AUTHOR: &str = "P50";
/// Property linking a work to its composer.
const COMPOSER: &str = "P86";
/// Property linking a work to its director.
const DIRECTOR: &str = "P57";
/// Property linking a person to their notable works.
const NOTABLE_WORK: &str = "P800";

/// Work-linking property for an occupation entity id.
fn property_for_occupation(occupation: &str) -> &'static str {
    match occupation {
        // writer, novelist, poet
        "Q36180" | "Q6625963" | "Q49757" => AUTHOR,
        "Q36834" => COMPOSER,
        "Q2526255" => DIRECTOR,
        _ => NOTABLE_WORK,
    }
}

/// How a contributor is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentKey {
    /// Library of Congress name identifier, e.g. `n79006936`.
    pub lccn: Option<String>,
    pub label: Option<String>,
}

impl AgentKey {
    /// Key for a local contributor, if it carries an identifier or a label.
    pub fn from_contributor(contributor: &Contributor) -> Option<Self> {
        let lccn = match &contributor.agent {
            AgentRef::Link { uri, .. } if uri.contains("id.loc.gov/") => uri
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            _ => None,
        };
        let label = contributor
            .agent
            .label()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string);

        if lccn.is_none() && label.is_none() {
            return None;
        }
        Some(Self { lccn, label })
    }

    /// Cache hash key for this contributor's work labels.
    pub fn cache_key(&self) -> String {
        let id = self.lccn.as_deref().or(self.label.as_deref()).unwrap_or_default();
        format!("wikidata:works:{id}")
    }
}

/// A work entity and its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphWork {
    pub uri: String,
    pub label: String,
}

/// Knowledge-graph lookup of works by contributor.
pub trait KnowledgeGraph {
    fn works_for_agent(&self, agent: &AgentKey) -> impl Future<Output = Result<Vec<GraphWork>>>;
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    bindings: Vec<HashMap<String, SparqlTerm>>,
}

#[derive(Debug, Deserialize)]
struct SparqlTerm {
    value: String,
}

#[derive(Debug, Deserialize)]
struct EntitySearchResponse {
    #[serde(default)]
    search: Vec<EntitySearchHit>,
}

#[derive(Debug, Deserialize)]
struct EntitySearchHit {
    id: String,
}

// ---------------------------------------------------------------------------
// WikidataConnector
// ---------------------------------------------------------------------------

/// SPARQL and entity-search client for Wikidata.
pub struct WikidataConnector<C> {
    http: HttpFetcher,
    sparql_url: String,
    api_url: String,
    cache: Arc<C>,
}

impl<C: Cache> WikidataConnector<C> {
    pub fn new(config: &WikidataConfig, cache: Arc<C>) -> Result<Self> {
        let http = HttpFetcher::new(
            "wikidata",
            config.requests_per_minute,
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.retry_backoff_secs),
        )?;
        Ok(Self {
            http,
            sparql_url: config.sparql_url.clone(),
            api_url: config.api_url.clone(),
            cache,
        })
    }

    /// Entity id (`Q...`) for the contributor.
    async fn resolve_entity(&self, agent: &AgentKey) -> Result<Option<String>> {
        if let Some(lccn) = &agent.lccn {
            let query = format!(
                "SELECT ?item WHERE {{ ?item wdt:P244 \"{}\" . }} LIMIT 1",
                escape_literal(lccn)
            );
            let found = self
                .sparql(&query)
                .await?
                .into_iter()
                .find_map(|mut row| row.remove("item"))
                .and_then(|term| entity_id(&term.value));
            if found.is_some() {
                return Ok(found);
            }
        }

        let Some(label) = &agent.label else {
            return Ok(None);
        };
        let url = Url::parse_with_params(
            &self.api_url,
            &[
                ("action", "wbsearchentities"),
                ("search", label.as_str()),
                ("language", "en"),
                ("type", "item"),
                ("limit", "1"),
                ("format", "json"),
            ],
        )
        .map_err(|e| ReconcileError::config(format!("invalid wikidata.api_url: {e}")))?;

        let body = self.http.get_ok(url.as_str(), "application/json").await?;
        let response: EntitySearchResponse = serde_json::from_str(&body)
            .map_err(|e| ReconcileError::parse(format!("entity search response: {e}")))?;
        Ok(response.search.into_iter().next().map(|hit| hit.id))
    }

    /// Occupation entity ids of `entity`.
    async fn occupations(&self, entity: &str) -> Result<Vec<String>> {
        let query = format!("SELECT ?occupation WHERE {{ wd:{entity} wdt:P106 ?occupation . }}");
        Ok(self
            .sparql(&query)
            .await?
            .into_iter()
            .filter_map(|mut row| row.remove("occupation"))
            .filter_map(|term| entity_id(&term.value))
            .collect())
    }

    /// Works tied to `entity` through `property`, with English labels.
    async fn works(&self, entity: &str, property: &str) -> Result<Vec<GraphWork>> {
        let pattern = if property == NOTABLE_WORK {
            format!("wd:{entity} wdt:{property} ?work .")
        } else {
            format!("?work wdt:{property} wd:{entity} .")
        };
        let query = format!(
            "SELECT ?work ?workLabel WHERE {{ {pattern} \
             SERVICE wikibase:label {{ bd:serviceParam wikibase:language \"en\". }} }}"
        );

        Ok(self
            .sparql(&query)
            .await?
            .into_iter()
            .filter_map(|mut row| {
                let uri = row.remove("work")?.value;
                let label = row.remove("workLabel")?.value;
                Some(GraphWork { uri, label })
            })
            .collect())
    }

    async fn sparql(&self, query: &str) -> Result<Vec<HashMap<String, SparqlTerm>>> {
        let url = Url::parse_with_params(&self.sparql_url, &[("query", query), ("format", "json")])
            .map_err(|e| ReconcileError::config(format!("invalid wikidata.sparql_url: {e}")))?;

        let body = self.http.get_ok(url.as_str(), SPARQL_ACCEPT).await?;
        let response: SparqlResponse = serde_json::from_str(&body)
            .map_err(|e| ReconcileError::parse(format!("SPARQL response: {e}")))?;
        Ok(response.results.bindings)
    }

    async fn cached_works(&self, key: &str) -> Option<Vec<GraphWork>> {
        match self.cache.hash_scan(key).await {
            Ok(fields) if !fields.is_empty() => Some(
                fields
                    .into_iter()
                    .filter(|(field, _)| field != EMPTY_MARKER)
                    .map(|(uri, label)| GraphWork { uri, label })
                    .collect(),
            ),
            Ok(_) => None,
            Err(e) => {
                warn!(%key, error = %e, "work label cache read failed");
                None
            }
        }
    }

    async fn store_works(&self, key: &str, works: &[GraphWork]) {
        let fields: BTreeMap<String, String> = if works.is_empty() {
            BTreeMap::from([(EMPTY_MARKER.to_string(), String::new())])
        } else {
            works
                .iter()
                .map(|w| (w.uri.clone(), w.label.clone()))
                .collect()
        };
        if let Err(e) = self.cache.hash_set(key, &fields).await {
            warn!(%key, error = %e, "work label cache write failed");
        }
    }
}

impl<C: Cache> KnowledgeGraph for WikidataConnector<C> {
    #[instrument(skip_all, fields(agent = %agent.cache_key()))]
    async fn works_for_agent(&self, agent: &AgentKey) -> Result<Vec<GraphWork>> {
        let key = agent.cache_key();
        if let Some(works) = self.cached_works(&key).await {
            debug!(works = works.len(), "work labels from cache");
            return Ok(works);
        }

        let Some(entity) = self.resolve_entity(agent).await? else {
            debug!("no wikidata entity for contributor");
            self.store_works(&key, &[]).await;
            return Ok(Vec::new());
        };

        let mut properties: Vec<&str> = Vec::new();
        for occupation in self.occupations(&entity).await? {
            let property = property_for_occupation(&occupation);
            if !properties.contains(&property) {
                properties.push(property);
            }
        }
        if properties.is_empty() {
            properties.push(NOTABLE_WORK);
        }

        let mut works: Vec<GraphWork> = Vec::new();
        for property in properties {
            for work in self.works(&entity, property).await? {
                if !works.iter().any(|w| w.uri == work.uri) {
                    works.push(work);
                }
            }
        }

        info!(%entity, works = works.len(), "fetched wikidata works");
        self.store_works(&key, &works).await;
        Ok(works)
    }
}

/// `Q123` from `http://www.wikidata.org/entity/Q123`.
fn entity_id(uri: &str) -> Option<String> {
    uri.rsplit('/')
        .next()
        .filter(|id| id.starts_with('Q'))
        .map(str::to_string)
}

fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use reconcile_storage::MemoryCache;
    use wiremock::matchers::{method, path, query_param, query_param_contains};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn bindings(rows: &[&[(&str, &str)]]) -> String {
        let rows: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, serde_json::Value> = row
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.to_string(),
                            serde_json::json!({ "type": "literal", "value": v }),
                        )
                    })
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::json!({ "head": { "vars": [] }, "results": { "bindings": rows } }).to_string()
    }

    fn connector(server: &MockServer) -> (WikidataConnector<MemoryCache>, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        let config = WikidataConfig {
            enabled: true,
            sparql_url: format!("{}/sparql", server.uri()),
            api_url: format!("{}/w/api.php", server.uri()),
            requests_per_minute: 1000,
            timeout_secs: 5,
            retry_backoff_secs: 0,
        };
        (WikidataConnector::new(&config, cache.clone()).unwrap(), cache)
    }

    fn melville() -> AgentKey {
        AgentKey {
            lccn: Some("n79006936".into()),
            label: Some("Melville, Herman".into()),
        }
    }

    async fn mount_melville(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/sparql"))
            .and(query_param_contains("query", "P244"))
            .respond_with(ResponseTemplate::new(200).set_body_string(bindings(&[&[(
                "item",
                "http://www.wikidata.org/entity/Q4985",
            )]])))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sparql"))
            .and(query_param_contains("query", "P106"))
            .respond_with(ResponseTemplate::new(200).set_body_string(bindings(&[
                &[("occupation", "http://www.wikidata.org/entity/Q6625963")],
                &[("occupation", "http://www.wikidata.org/entity/Q49757")],
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sparql"))
            .and(query_param_contains("query", "wdt:P50 wd:Q4985"))
            .respond_with(ResponseTemplate::new(200).set_body_string(bindings(&[
                &[
                    ("work", "http://www.wikidata.org/entity/Q174596"),
                    ("workLabel", "Moby-Dick"),
                ],
                &[
                    ("work", "http://www.wikidata.org/entity/Q1140663"),
                    ("workLabel", "Typee"),
                ],
            ])))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn occupation_property_mapping() {
        assert_eq!(property_for_occupation("Q36180"), "P50");
        assert_eq!(property_for_occupation("Q36834"), "P86");
        assert_eq!(property_for_occupation("Q2526255"), "P57");
        assert_eq!(property_for_occupation("Q82955"), "P800");
    }

    #[test]
    fn agent_key_from_contributor() {
        let linked = Contributor {
            type_uri: "http://id.loc.gov/ontologies/bflc/PrimaryContribution".into(),
            agent: AgentRef::Link {
                uri: "http://id.loc.gov/rwo/agents/n79006936".into(),
                label: None,
            },
        };
        let key = AgentKey::from_contributor(&linked).unwrap();
        assert_eq!(key.lccn.as_deref(), Some("n79006936"));
        assert_eq!(key.cache_key(), "wikidata:works:n79006936");

        let inline = Contributor {
            type_uri: "http://id.loc.gov/ontologies/bibframe/Contribution".into(),
            agent: AgentRef::Label {
                label: "  ".into(),
            },
        };
        assert!(AgentKey::from_contributor(&inline).is_none());
    }

    #[tokio::test]
    async fn resolves_works_and_caches_them() {
        let server = MockServer::start().await;
        mount_melville(&server).await;

        let (wikidata, cache) = connector(&server);
        let works = wikidata.works_for_agent(&melville()).await.unwrap();
        assert_eq!(works.len(), 2);
        assert_eq!(works[0].label, "Moby-Dick");

        // Second call is served from the cache (mocks expect one hit each)
        let again = wikidata.works_for_agent(&melville()).await.unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(
            cache
                .hash_get("wikidata:works:n79006936", "http://www.wikidata.org/entity/Q1140663")
                .await
                .unwrap()
                .as_deref(),
            Some("Typee")
        );
    }

    #[tokio::test]
    async fn falls_back_to_entity_search_and_caches_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("action", "wbsearchentities"))
            .and(query_param("search", "Nobody, Anon"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"search": [{"id": "Q999"}]}"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sparql"))
            .and(query_param_contains("query", "P106"))
            .respond_with(ResponseTemplate::new(200).set_body_string(bindings(&[])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sparql"))
            .and(query_param_contains("query", "wd:Q999 wdt:P800"))
            .respond_with(ResponseTemplate::new(200).set_body_string(bindings(&[])))
            .expect(1)
            .mount(&server)
            .await;

        let (wikidata, cache) = connector(&server);
        let agent = AgentKey {
            lccn: None,
            label: Some("Nobody, Anon".into()),
        };
        assert!(wikidata.works_for_agent(&agent).await.unwrap().is_empty());
        assert!(wikidata.works_for_agent(&agent).await.unwrap().is_empty());

        let stored = cache.hash_scan("wikidata:works:Nobody, Anon").await.unwrap();
        assert_eq!(stored, vec![(EMPTY_MARKER.to_string(), String::new())]);
    }

    #[tokio::test]
    async fn sparql_outage_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sparql"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (wikidata, _) = connector(&server);
        let err = wikidata.works_for_agent(&melville()).await.unwrap_err();
        assert!(err.is_transport());
    }
}
