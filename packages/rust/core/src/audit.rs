//! Tab-separated audit log with one row per search attempt.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use reconcile_shared::{MatchScore, ReconcileError, Result};

use crate::orchestrator::{Attempt, AttemptOutcome};

/// Prefix of the score column for attempts that failed in transport.
pub const ERROR_MARKER: &str = "ERROR";

/// Writer for `[work_id, title, query_url, score_or_error, selected_uri]` rows.
pub struct AuditLog<W: Write> {
    writer: csv::Writer<W>,
}

impl AuditLog<File> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| ReconcileError::io(path, e))?;
        Ok(Self::new(file))
    }
}

impl<W: Write> AuditLog<W> {
    pub fn new(inner: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(false)
            .from_writer(inner);
        Self { writer }
    }

    pub fn record(&mut self, work_id: &str, attempt: &Attempt) -> Result<()> {
        let (score, uri) = match &attempt.outcome {
            AttemptOutcome::Matched { uri, score } => (score.to_json(), uri.as_str()),
            AttemptOutcome::NotFound { closest } => (
                closest.as_ref().map_or_else(|| "{}".to_string(), MatchScore::to_json),
                "",
            ),
            AttemptOutcome::Errored(reason) => (format!("{ERROR_MARKER}: {reason}"), ""),
        };

        self.writer
            .write_record([
                work_id,
                attempt.title.as_str(),
                attempt.query_url.as_str(),
                score.as_str(),
                uri,
            ])
            .map_err(|e| ReconcileError::Storage(format!("audit write failed: {e}")))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| ReconcileError::Storage(format!("audit flush failed: {e}")))
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| ReconcileError::Storage(format!("audit flush failed: {e}")))
    }
}
