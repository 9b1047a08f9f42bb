//! Per-Work reconciliation state machine.
//!
//! `SearchWork -> SearchHub -> Rewrite -> Done`, with `Error` reached only
//! when every Work-search variant failed in transport.

use std::fmt;

use tracing::{debug, info, instrument, warn};

use reconcile_connector::{AgentKey, KnowledgeGraph, SearchQuery, SourceConnector};
use reconcile_document::PatchSet;
use reconcile_matching::{
    BestMatch, HubContext, ResultSet, ScoredCandidate, VariantResults, compare::score_title,
    normalize_contributions, score_candidate, select_best, within_tenth,
};
use reconcile_shared::{
    AuthoritySource, Category, LocalWork, MatchFields, MatchScore, ScoreField,
};

/// States a Work passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    SearchWork,
    SearchHub,
    Rewrite,
    Done,
    Error,
}

impl fmt::Display for WorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SearchWork => "search_work",
            Self::SearchHub => "search_hub",
            Self::Rewrite => "rewrite",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Result of one search attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Matched { uri: String, score: MatchScore },
    /// Nothing cleared the threshold; `closest` is the highest-scoring
    /// candidate, if any were found.
    NotFound { closest: Option<MatchScore> },
    Errored(String),
}

/// One search attempt, as written to the audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub source: AuthoritySource,
    pub category: Category,
    pub title: String,
    pub query_url: String,
    pub outcome: AttemptOutcome,
}

impl Attempt {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Errored(_))
    }
}

/// The authority identifier chosen for a Work.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWork {
    pub uri: String,
    pub source: AuthoritySource,
    pub title: String,
    pub score: MatchScore,
}

/// Outcome of reconciling one Work.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkResult {
    pub work_id: String,
    pub state: WorkState,
    /// The Work already carried an authority identifier.
    pub skipped: bool,
    pub work: Option<ResolvedWork>,
    pub hub_uri: Option<String>,
    pub attempts: Vec<Attempt>,
}

impl WorkResult {
    fn new(work_id: &str) -> Self {
        Self {
            work_id: work_id.to_string(),
            state: WorkState::SearchWork,
            skipped: false,
            work: None,
            hub_uri: None,
            attempts: Vec::new(),
        }
    }

    /// Identifier the Work carries after rewriting.
    pub fn final_uri(&self) -> &str {
        self.work.as_ref().map_or(&self.work_id, |w| w.uri.as_str())
    }
}

/// Searches of one category for every title variant.
struct CategorySearch {
    results: ResultSet,
    attempted: usize,
    errored: usize,
}

impl CategorySearch {
    fn all_errored(&self) -> bool {
        self.attempted > 0 && self.errored == self.attempted
    }
}

/// Reconciles Works against one search source, with an optional
/// knowledge-graph fallback for Works the source cannot match.
pub struct Reconciler<'a, S, K> {
    source: &'a S,
    graph: Option<&'a K>,
    authority_prefixes: &'a [String],
}

impl<'a, S: SourceConnector, K: KnowledgeGraph> Reconciler<'a, S, K> {
    pub fn new(source: &'a S, graph: Option<&'a K>, authority_prefixes: &'a [String]) -> Self {
        Self {
            source,
            graph,
            authority_prefixes,
        }
    }

    /// Whether `id` is already an authority identifier.
    pub fn is_resolved(&self, id: &str) -> bool {
        self.authority_prefixes.iter().any(|p| id.starts_with(p.as_str()))
    }

    /// Run one Work through the state machine, adding its rewrite to `patch`.
    #[instrument(skip_all, fields(work_id = %work.id))]
    pub async fn reconcile(&self, work: &LocalWork, patch: &mut PatchSet) -> WorkResult {
        let mut result = WorkResult::new(&work.id);

        if self.is_resolved(&work.id) {
            debug!("already resolved, skipping");
            result.skipped = true;
            result.state = WorkState::Done;
            return result;
        }

        let fields = MatchFields::from(work);
        let mut hub_context = HubContext::default();

        loop {
            result.state = match result.state {
                WorkState::SearchWork => {
                    let search = self
                        .search_category(&fields, Category::Work, None, &mut result)
                        .await;
                    if search.all_errored() {
                        warn!(variants = search.attempted, "every Work search failed");
                        WorkState::Error
                    } else {
                        match select_best(&search.results) {
                            Some(best) => {
                                info!(uri = %best.uri, score = best.score.total(), "matched Work");
                                hub_context = HubContext {
                                    work_uri: Some(best.uri.clone()),
                                    hub_hints: best.hub_links.clone(),
                                };
                                result.work = Some(resolved(best, AuthoritySource::LibraryOfCongress));
                            }
                            None => {
                                result.work = self.graph_fallback(&fields, &mut result.attempts).await;
                            }
                        }
                        WorkState::SearchHub
                    }
                }
                WorkState::SearchHub => {
                    let search = self
                        .search_category(&fields, Category::Hub, Some(&hub_context), &mut result)
                        .await;
                    if let Some(best) = select_best(&search.results) {
                        info!(uri = %best.uri, score = best.score.total(), "matched Hub");
                        result.hub_uri = Some(best.uri);
                    } else if search.all_errored() {
                        warn!("every Hub search failed");
                    }
                    WorkState::Rewrite
                }
                WorkState::Rewrite => {
                    if let Some(resolved) = &result.work {
                        patch.replace(&work.id, &resolved.uri);
                    }
                    if let Some(hub) = &result.hub_uri {
                        patch.link_hub(&work.id, hub);
                    }
                    WorkState::Done
                }
                WorkState::Done | WorkState::Error => break,
            };
        }

        result
    }

    /// Search every title variant in `category` and score the hits.
    async fn search_category(
        &self,
        fields: &MatchFields,
        category: Category,
        hub: Option<&HubContext>,
        result: &mut WorkResult,
    ) -> CategorySearch {
        let mut search = CategorySearch {
            results: ResultSet::default(),
            attempted: 0,
            errored: 0,
        };

        for title in &fields.titles {
            let query = SearchQuery {
                text: title,
                types: &fields.types,
                category,
            };
            let query_url = self.source.query_url(&query);
            search.attempted += 1;

            let outcome = match self.source.search(&query).await {
                Ok(hits) => {
                    let mut variant = VariantResults::new(title.as_str());
                    for hit in hits {
                        let record = match hit.record {
                            Ok(record) => record,
                            Err(e) => {
                                debug!(uri = %hit.uri, error = %e, "candidate skipped");
                                continue;
                            }
                        };
                        let contributors = if fields.contributors.is_empty() {
                            Vec::new()
                        } else {
                            normalize_contributions(&record.contributions, self.source).await
                        };
                        let score = score_candidate(fields, title, &record, &contributors, hub);
                        debug!(uri = %record.uri, score = %score.to_json(), "scored candidate");
                        variant.push(ScoredCandidate {
                            uri: record.uri,
                            score,
                            hub_links: record.hub_links,
                        });
                    }

                    let outcome = match variant.best() {
                        Some(best) => AttemptOutcome::Matched {
                            uri: best.uri,
                            score: best.score,
                        },
                        None => AttemptOutcome::NotFound {
                            closest: variant.closest().map(|c| c.score.clone()),
                        },
                    };
                    search.results.push(variant);
                    outcome
                }
                Err(e) => {
                    warn!(%title, %query_url, error = %e, "search failed");
                    search.errored += 1;
                    AttemptOutcome::Errored(e.to_string())
                }
            };

            result.attempts.push(Attempt {
                source: self.source.source(),
                category,
                title: title.clone(),
                query_url,
                outcome,
            });
        }

        search
    }

    /// Look the Work's contributors up in the knowledge graph and accept the
    /// first work whose label is within a tenth of a local title.
    async fn graph_fallback(
        &self,
        fields: &MatchFields,
        attempts: &mut Vec<Attempt>,
    ) -> Option<ResolvedWork> {
        let graph = self.graph?;

        for contributor in &fields.contributors {
            let Some(agent) = AgentKey::from_contributor(contributor) else {
                continue;
            };
            let query_url = agent.cache_key();
            let primary = fields.titles.first().cloned().unwrap_or_default();

            let works = match graph.works_for_agent(&agent).await {
                Ok(works) => works,
                Err(e) => {
                    warn!(agent = %query_url, error = %e, "knowledge-graph lookup failed");
                    attempts.push(graph_attempt(&primary, query_url, AttemptOutcome::Errored(e.to_string())));
                    continue;
                }
            };

            let found = fields.titles.iter().find_map(|title| {
                works
                    .iter()
                    .find(|w| within_tenth(title, &w.label))
                    .map(|w| (title, w))
            });

            match found {
                Some((title, work)) => {
                    let mut score = MatchScore::new();
                    score.set(ScoreField::Title, score_title(title, &[work.label.clone()]));
                    info!(uri = %work.uri, label = %work.label, "matched Work in knowledge graph");
                    attempts.push(graph_attempt(
                        title,
                        query_url,
                        AttemptOutcome::Matched {
                            uri: work.uri.clone(),
                            score: score.clone(),
                        },
                    ));
                    return Some(ResolvedWork {
                        uri: work.uri.clone(),
                        source: AuthoritySource::Wikidata,
                        title: title.clone(),
                        score,
                    });
                }
                None => attempts.push(graph_attempt(
                    &primary,
                    query_url,
                    AttemptOutcome::NotFound { closest: None },
                )),
            }
        }

        None
    }
}

fn resolved(best: BestMatch, source: AuthoritySource) -> ResolvedWork {
    ResolvedWork {
        uri: best.uri,
        source,
        title: best.title,
        score: best.score,
    }
}

fn graph_attempt(title: &str, query_url: String, outcome: AttemptOutcome) -> Attempt {
    Attempt {
        source: AuthoritySource::Wikidata,
        category: Category::Work,
        title: title.to_string(),
        query_url,
        outcome,
    }
}
