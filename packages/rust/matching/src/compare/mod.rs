//! Per-field comparators and the candidate scorer that wires them together.

mod contributors;
mod languages;
mod notes;
mod title;

use reconcile_shared::{CandidateRecord, MatchFields, MatchScore, ScoreField};

pub use contributors::{
    AgentResolver, NormalizedContributor, normalize_contributions, score_contributors,
};
pub use languages::score_languages;
pub use notes::score_notes;
pub use title::{TITLE_WEIGHT, score_title};

/// Context carried from the Work search into the Hub search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HubContext {
    /// The Work URI selected in the Work search, if any.
    pub work_uri: Option<String>,
    /// Hub URIs the selected Work record links to.
    pub hub_hints: Vec<String>,
}

impl HubContext {
    pub fn is_empty(&self) -> bool {
        self.work_uri.is_none() && self.hub_hints.is_empty()
    }

    /// A Hub is linked when the Work named it, or it names the Work.
    pub fn links(&self, candidate: &CandidateRecord) -> bool {
        if self.hub_hints.iter().any(|h| h == &candidate.uri) {
            return true;
        }
        match &self.work_uri {
            Some(work) => candidate.expressed_works.iter().any(|w| w == work),
            None => false,
        }
    }
}

/// Score one candidate for one title variant.
///
/// Only fields that are non-empty on the local side are scored, so absent
/// fields add neither to the total nor to the selection threshold.
pub fn score_candidate(
    fields: &MatchFields,
    title: &str,
    candidate: &CandidateRecord,
    contributors: &[NormalizedContributor],
    hub: Option<&HubContext>,
) -> MatchScore {
    let mut score = MatchScore::new();

    score.set(ScoreField::Title, score_title(title, &candidate.titles));

    if !fields.languages.is_empty() {
        score.set(
            ScoreField::Languages,
            score_languages(&fields.languages, &candidate.languages),
        );
    }
    if !fields.contributors.is_empty() {
        score.set(
            ScoreField::Contributors,
            score_contributors(&fields.contributors, contributors),
        );
    }
    if !fields.notes.is_empty() {
        score.set(ScoreField::Notes, score_notes(&fields.notes, &candidate.notes));
    }
    if let Some(ctx) = hub.filter(|c| !c.is_empty()) {
        score.set(ScoreField::Hub, if ctx.links(candidate) { 1.0 } else { 0.0 });
    }

    score
}
