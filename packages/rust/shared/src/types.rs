//! Core domain types for Work reconciliation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// BIBFRAME ontology namespace.
pub const BF_NS: &str = "http://id.loc.gov/ontologies/bibframe/";

/// BIBFRAME LC extensions namespace.
pub const BFLC_NS: &str = "http://id.loc.gov/ontologies/bflc/";

/// Base of the MARC language vocabulary used for bare language codes.
pub const LANGUAGE_VOCAB: &str = "http://id.loc.gov/vocabulary/languages/";

/// Note field that is compared by edit distance rather than equality.
pub const NOTE_LABEL_FIELD: &str = "label";

// ---------------------------------------------------------------------------
// Categories and sources
// ---------------------------------------------------------------------------

/// The id.loc.gov resource category a search targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Work,
    Hub,
}

impl Category {
    /// Collection URI passed as the `cs:` search filter.
    pub fn resource_uri(&self) -> &'static str {
        match self {
            Self::Work => "http://id.loc.gov/resources/works",
            Self::Hub => "http://id.loc.gov/resources/hubs",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Hub => "hub",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which authority source produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthoritySource {
    LibraryOfCongress,
    Wikidata,
}

impl AuthoritySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LibraryOfCongress => "id.loc.gov",
            Self::Wikidata => "wikidata",
        }
    }
}

impl fmt::Display for AuthoritySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Contributors and notes
// ---------------------------------------------------------------------------

/// Reference to the agent behind a contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentRef {
    /// Inline label only (no resource).
    Label { label: String },
    /// Link to an agent resource, optionally carrying an inline label.
    Link {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
}

impl AgentRef {
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Label { label } => Some(label),
            Self::Link { label, .. } => label.as_deref(),
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match self {
            Self::Label { .. } => None,
            Self::Link { uri, .. } => Some(uri),
        }
    }
}

/// A role-tagged contribution (local or candidate side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    /// Contribution class, e.g. `bflc:PrimaryContribution` or `bf:Contribution`.
    pub type_uri: String,
    pub agent: AgentRef,
}

/// A note as a mapping of note-field name to text or coded value.
pub type Note = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// LocalWork
// ---------------------------------------------------------------------------

/// A Work description parsed from the input document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalWork {
    /// Placeholder identifier (`rdf:about`).
    pub id: String,
    /// Primary title first, then variants.
    pub titles: Vec<String>,
    /// `rdf:type` URIs.
    pub types: BTreeSet<String>,
    pub notes: Vec<Note>,
    /// Language URIs (bare codes are expanded against [`LANGUAGE_VOCAB`]).
    pub languages: BTreeSet<String>,
    pub contributors: Vec<Contributor>,
}

/// The per-Work field set the comparators run against.
///
/// Titles are trimmed, blank ones dropped, and duplicates removed while
/// keeping the primary title first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchFields {
    pub titles: Vec<String>,
    pub types: Vec<String>,
    pub notes: Vec<Note>,
    pub languages: BTreeSet<String>,
    pub contributors: Vec<Contributor>,
}

impl From<&LocalWork> for MatchFields {
    fn from(work: &LocalWork) -> Self {
        let mut titles: Vec<String> = Vec::with_capacity(work.titles.len());
        for title in &work.titles {
            let title = title.trim();
            if !title.is_empty() && !titles.iter().any(|t| t == title) {
                titles.push(title.to_string());
            }
        }

        Self {
            titles,
            types: work.types.iter().cloned().collect(),
            notes: work.notes.iter().filter(|n| !n.is_empty()).cloned().collect(),
            languages: work.languages.clone(),
            contributors: work.contributors.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// CandidateRecord
// ---------------------------------------------------------------------------

/// An authority record returned by a search, merged with its detail record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub uri: String,
    /// Authorized heading, variant headings, and detail-record titles.
    pub titles: Vec<String>,
    pub languages: BTreeSet<String>,
    pub contributions: Vec<Contributor>,
    pub notes: Vec<Note>,
    /// Work records: Hubs this Work is an expression of.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hub_links: Vec<String>,
    /// Hub records: Works this Hub has as expressions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expressed_works: Vec<String>,
}

impl CandidateRecord {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Add a title unless it is blank or already present.
    pub fn push_title(&mut self, title: &str) {
        let title = title.trim();
        if !title.is_empty() && !self.titles.iter().any(|t| t == title) {
            self.titles.push(title.to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// MatchScore
// ---------------------------------------------------------------------------

/// Fields a candidate can be scored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreField {
    Title,
    Languages,
    Contributors,
    Notes,
    Hub,
}

impl ScoreField {
    /// Upper bound of this field's contribution.
    pub fn max_weight(&self) -> f64 {
        match self {
            Self::Title => 0.5,
            Self::Languages | Self::Notes | Self::Hub => 1.0,
            Self::Contributors => 2.0,
        }
    }
}

/// Per-field score breakdown for one candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchScore(BTreeMap<ScoreField, f64>);

impl MatchScore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a field contribution, clamped into the field's range.
    pub fn set(&mut self, field: ScoreField, value: f64) {
        let value = if value.is_finite() {
            value.clamp(0.0, field.max_weight())
        } else {
            0.0
        };
        self.0.insert(field, value);
    }

    pub fn get(&self, field: ScoreField) -> Option<f64> {
        self.0.get(&field).copied()
    }

    /// Sum of present field contributions.
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Number of fields that were scored.
    pub fn field_count(&self) -> usize {
        self.0.len()
    }

    /// Majority threshold: half the number of scored fields.
    ///
    /// A title-only score is capped at 0.5, so it uses half the title weight
    /// instead; otherwise an exact title could never be selected on its own.
    pub fn threshold(&self) -> f64 {
        if self.0.len() == 1 && self.0.contains_key(&ScoreField::Title) {
            return ScoreField::Title.max_weight() / 2.0;
        }
        self.0.len() as f64 / 2.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScoreField, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// JSON rendering used in the audit log.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
