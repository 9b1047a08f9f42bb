//! End-to-end run: input document → per-Work reconciliation → audit log + rewritten document.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use reconcile_connector::{KnowledgeGraph, SourceConnector};
use reconcile_document::{Document, PatchSet, extract_works, instances_of};
use reconcile_shared::{AuthoritySource, ReconcileError, Result};

use crate::audit::AuditLog;
use crate::orchestrator::{Reconciler, WorkResult, WorkState};

/// Configuration for one reconciliation run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Input RDF/XML document.
    pub input: PathBuf,
    /// Directory receiving the audit log and the rewritten document.
    pub output_dir: PathBuf,
    /// Identifier prefixes that mark a Work as already resolved.
    pub authority_prefixes: Vec<String>,
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub works: usize,
    pub skipped: usize,
    pub matched: usize,
    /// Subset of `matched` resolved through the knowledge graph.
    pub graph_matched: usize,
    pub hub_linked: usize,
    pub errored: usize,
    pub not_found: usize,
    pub instances_repointed: usize,
    pub audit_path: PathBuf,
    pub output_path: PathBuf,
    pub elapsed: Duration,
}

impl RunSummary {
    fn new(paths: &OutputPaths) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            works: 0,
            skipped: 0,
            matched: 0,
            graph_matched: 0,
            hub_linked: 0,
            errored: 0,
            not_found: 0,
            instances_repointed: 0,
            audit_path: paths.audit.clone(),
            output_path: paths.document.clone(),
            elapsed: Duration::ZERO,
        }
    }

    fn count(&mut self, result: &WorkResult, instances: usize) {
        self.works += 1;
        if result.skipped {
            self.skipped += 1;
            return;
        }
        if result.state == WorkState::Error {
            self.errored += 1;
            return;
        }
        match &result.work {
            Some(work) => {
                self.matched += 1;
                self.instances_repointed += instances;
                if work.source == AuthoritySource::Wikidata {
                    self.graph_matched += 1;
                }
            }
            None => self.not_found += 1,
        }
        if result.hub_uri.is_some() {
            self.hub_linked += 1;
        }
    }
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a Work is reconciled.
    fn work_started(&self, work_id: &str, current: usize, total: usize);
    /// Called after a Work is reconciled.
    fn work_finished(&self, result: &WorkResult);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn work_started(&self, _work_id: &str, _current: usize, _total: usize) {}
    fn work_finished(&self, _result: &WorkResult) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Where a run writes its results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub audit: PathBuf,
    pub document: PathBuf,
}

/// `<stem>.tsv` and `<stem>.xml` inside `output_dir`.
pub fn output_paths(input: &Path, output_dir: &Path) -> Result<OutputPaths> {
    let is_xml = input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
    if !is_xml {
        return Err(ReconcileError::validation(format!(
            "input must be an .xml file: {}",
            input.display()
        )));
    }
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ReconcileError::validation(format!("input has no file name: {}", input.display()))
        })?;

    let paths = OutputPaths {
        audit: output_dir.join(format!("{stem}.tsv")),
        document: output_dir.join(format!("{stem}.xml")),
    };
    if same_file(input, &paths.document) {
        return Err(ReconcileError::validation(format!(
            "output would overwrite the input: {}",
            input.display()
        )));
    }
    Ok(paths)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Reconcile every Work in `config.input`.
///
/// 1. Read and validate the input document
/// 2. Reconcile each Work in order, one audit row per search attempt
/// 3. Apply the collected patch and write the output document
#[instrument(skip_all, fields(input = %config.input.display()))]
pub async fn run<S, K>(
    config: &RunConfig,
    source: &S,
    graph: Option<&K>,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary>
where
    S: SourceConnector,
    K: KnowledgeGraph,
{
    let start = Instant::now();
    let paths = output_paths(&config.input, &config.output_dir)?;

    // --- Phase 1: Input ---
    progress.phase("Reading input document");
    let doc = Document::read(&config.input)?;
    let works = extract_works(&doc);
    std::fs::create_dir_all(&config.output_dir)
        .map_err(|e| ReconcileError::io(&config.output_dir, e))?;

    let mut summary = RunSummary::new(&paths);
    info!(run_id = %summary.run_id, works = works.len(), "starting reconciliation run");

    // --- Phase 2: Reconcile ---
    progress.phase("Reconciling works");
    let mut audit = AuditLog::create(&paths.audit)?;
    let reconciler = Reconciler::new(source, graph, &config.authority_prefixes);
    let mut patch = PatchSet::new();
    let total = works.len();

    for (i, work) in works.iter().enumerate() {
        progress.work_started(&work.id, i + 1, total);
        let result = reconciler.reconcile(work, &mut patch).await;

        for attempt in &result.attempts {
            audit.record(&work.id, attempt)?;
        }
        audit.flush()?;

        let instances = instances_of(&doc, &work.id).len();
        if result.state == WorkState::Error {
            warn!(work_id = %work.id, "work left unresolved after search errors");
        }
        summary.count(&result, instances);
        progress.work_finished(&result);
    }

    // --- Phase 3: Rewrite ---
    progress.phase("Writing output document");
    let output = patch.apply(&doc);
    output.write(&paths.document)?;

    summary.elapsed = start.elapsed();
    progress.done(&summary);

    info!(
        run_id = %summary.run_id,
        works = summary.works,
        matched = summary.matched,
        hub_linked = summary.hub_linked,
        errored = summary.errored,
        skipped = summary.skipped,
        elapsed_ms = summary.elapsed.as_millis(),
        "reconciliation run complete"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use reconcile_shared::{AgentRef, Category, Contributor, Note};

    use super::*;
    use crate::orchestrator::tests::{FakeGraph, FakeSource, LOC_HUB, LOC_WORK, record};

    const FIXTURE: &str = include_str!("../../../../fixtures/rdf/works.xml");

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("rw_run_{}", Uuid::now_v7()))
    }

    fn moby_dick_record() -> reconcile_shared::CandidateRecord {
        let mut candidate = record(LOC_WORK, &["Moby Dick"]);
        candidate
            .languages
            .insert("http://id.loc.gov/vocabulary/languages/eng".into());
        let mut note = Note::new();
        note.insert("label".into(), "Translation of: Moby Dick".into());
        note.insert("noteType".into(), "language".into());
        candidate.notes.push(note);
        candidate.contributions.push(Contributor {
            type_uri: "http://id.loc.gov/ontologies/bflc/PrimaryContribution".into(),
            agent: AgentRef::Link {
                uri: "http://id.loc.gov/rwo/agents/n79006936".into(),
                label: Some("Melville, Herman, 1819-1891".into()),
            },
        });
        candidate.hub_links.push(LOC_HUB.into());
        candidate
    }

    #[test]
    fn output_paths_use_input_stem() {
        let paths = output_paths(Path::new("/data/batch-01.xml"), Path::new("/out")).unwrap();
        assert_eq!(paths.audit, PathBuf::from("/out/batch-01.tsv"));
        assert_eq!(paths.document, PathBuf::from("/out/batch-01.xml"));
    }

    #[test]
    fn output_paths_reject_non_xml_and_overwrite() {
        assert!(output_paths(Path::new("/data/batch.rdf"), Path::new("/out")).is_err());
        assert!(output_paths(Path::new("/data/batch.xml"), Path::new("/data")).is_err());
    }

    #[tokio::test]
    async fn run_rewrites_document_and_writes_audit() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("works.xml");
        std::fs::write(&input, FIXTURE).unwrap();

        let mut source = FakeSource::default();
        source.respond(Category::Work, "Moby Dick", vec![moby_dick_record()]);
        let mut hub = moby_dick_record();
        hub.uri = LOC_HUB.into();
        hub.hub_links.clear();
        hub.expressed_works.push(LOC_WORK.into());
        source.respond(Category::Hub, "Moby Dick", vec![hub]);

        let config = RunConfig {
            input,
            output_dir: dir.join("out"),
            authority_prefixes: vec!["http://id.loc.gov/resources/".into()],
        };
        let summary = run::<_, FakeGraph>(&config, &source, None, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.works, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.hub_linked, 1);
        assert_eq!(summary.instances_repointed, 2);
        assert_eq!(summary.errored, 0);

        let out = Document::read(&summary.output_path).unwrap();
        let works = extract_works(&out);
        assert_eq!(works[0].id, LOC_WORK);
        assert_eq!(instances_of(&out, LOC_WORK).len(), 2);
        assert!(out.root.elements().any(|e| e.attr("rdf:about") == Some(LOC_HUB)));

        // Two titles, each searched as Work and Hub; the resolved Work adds no rows
        let audit = std::fs::read_to_string(&summary.audit_path).unwrap();
        let rows: Vec<&str> = audit.lines().collect();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.starts_with("http://example.org/works/w1\t")));
        assert!(rows[0].ends_with(LOC_WORK));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn rerun_on_output_changes_nothing() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("works.xml");
        std::fs::write(&input, FIXTURE).unwrap();

        let mut source = FakeSource::default();
        source.respond(Category::Work, "Moby Dick", vec![moby_dick_record()]);
        let mut hub = moby_dick_record();
        hub.uri = LOC_HUB.into();
        hub.hub_links.clear();
        hub.expressed_works.push(LOC_WORK.into());
        source.respond(Category::Hub, "Moby Dick", vec![hub]);

        let prefixes = vec!["http://id.loc.gov/resources/".to_string()];
        let first = run::<_, FakeGraph>(
            &RunConfig {
                input,
                output_dir: dir.join("first"),
                authority_prefixes: prefixes.clone(),
            },
            &source,
            None,
            &SilentProgress,
        )
        .await
        .unwrap();
        let searches = source.searches.borrow().len();

        let second = run::<_, FakeGraph>(
            &RunConfig {
                input: first.output_path.clone(),
                output_dir: dir.join("second"),
                authority_prefixes: prefixes,
            },
            &source,
            None,
            &SilentProgress,
        )
        .await
        .unwrap();

        // Reconciled Work, untouched Work, and the synthesized Hub are all resolved
        assert_eq!(second.works, 3);
        assert_eq!(second.skipped, 3);
        assert_eq!(second.matched, 0);
        assert_eq!(source.searches.borrow().len(), searches);
        assert!(std::fs::read_to_string(&second.audit_path).unwrap().is_empty());

        let once = Document::read(&first.output_path).unwrap();
        let twice = Document::read(&second.output_path).unwrap();
        assert_eq!(once, twice);

        let hubs: Vec<_> = twice
            .root
            .children_named("bf:Work")
            .filter(|w| {
                w.children_named("rdf:type")
                    .any(|t| t.attr("rdf:resource") == Some("http://id.loc.gov/ontologies/bibframe/Hub"))
            })
            .collect();
        assert_eq!(hubs.len(), 1);
        assert_eq!(hubs[0].attr("rdf:about"), Some(LOC_HUB));
        assert_eq!(hubs[0].children_named("bf:hasExpression").count(), 1);

        let work = twice
            .root
            .children_named("bf:Work")
            .find(|w| w.attr("rdf:about") == Some(LOC_WORK))
            .unwrap();
        let links: Vec<_> = work
            .children_named("bf:expressionOf")
            .filter_map(|l| l.attr("rdf:resource"))
            .collect();
        assert_eq!(links, vec![LOC_HUB]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn errored_work_keeps_placeholder() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("works.xml");
        std::fs::write(&input, FIXTURE).unwrap();

        let mut source = FakeSource::default();
        source.fail(Category::Work, "Moby Dick");
        source.fail(Category::Work, "The whale");

        let config = RunConfig {
            input,
            output_dir: dir.join("out"),
            authority_prefixes: vec!["http://id.loc.gov/resources/".into()],
        };
        let summary = run::<_, FakeGraph>(&config, &source, None, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.errored, 1);
        let out = Document::read(&summary.output_path).unwrap();
        assert_eq!(extract_works(&out)[0].id, "http://example.org/works/w1");

        let audit = std::fs::read_to_string(&summary.audit_path).unwrap();
        assert_eq!(audit.lines().filter(|l| l.contains("\tERROR: ")).count(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn run_against_loc_service() {
        use std::sync::Arc;

        use reconcile_connector::LocConnector;
        use reconcile_shared::LocConfig;
        use reconcile_storage::MemoryCache;
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/"))
            .and(query_param("q", "cs:http://id.loc.gov/resources/works"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<table class="id-std"><tbody>
                <tr><td><a href="/resources/works/5555">Typee</a></td></tr>
                <tr><td colspan="5"></td></tr>
                </tbody></table>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/"))
            .and(query_param("q", "cs:http://id.loc.gov/resources/hubs"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/resources/works/5555.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"[{"@id": "http://id.loc.gov/resources/works/5555"}]"#),
            )
            .mount(&server)
            .await;

        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("typee.xml");
        std::fs::write(
            &input,
            r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:bf="http://id.loc.gov/ontologies/bibframe/">
  <bf:Work rdf:about="http://example.org/works/w9">
    <bf:title><bf:Title><bf:mainTitle>Typee</bf:mainTitle></bf:Title></bf:title>
  </bf:Work>
</rdf:RDF>"#,
        )
        .unwrap();

        let config = LocConfig {
            base_url: server.uri(),
            requests_per_minute: 1000,
            timeout_secs: 5,
            retry_backoff_secs: 0,
        };
        let loc = LocConnector::new(&config, Arc::new(MemoryCache::new())).unwrap();
        let run_config = RunConfig {
            input,
            output_dir: dir.join("out"),
            authority_prefixes: vec!["http://id.loc.gov/resources/".into()],
        };
        let summary = run::<_, FakeGraph>(&run_config, &loc, None, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.matched, 1);
        assert_eq!(summary.hub_linked, 0);
        let out = Document::read(&summary.output_path).unwrap();
        assert_eq!(
            extract_works(&out)[0].id,
            "http://id.loc.gov/resources/works/5555"
        );

        let audit = std::fs::read_to_string(&summary.audit_path).unwrap();
        let rows: Vec<&str> = audit.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].ends_with("\thttp://id.loc.gov/resources/works/5555"));
        assert!(rows[1].contains("\tERROR: "));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unreadable_input_is_fatal() {
        let dir = temp_dir();
        let config = RunConfig {
            input: dir.join("missing.xml"),
            output_dir: dir.join("out"),
            authority_prefixes: Vec::new(),
        };
        let err = run::<_, FakeGraph>(&config, &FakeSource::default(), None, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Io { .. }));
        assert!(!dir.join("out").exists());
    }
}
