//! Result sets and best-match selection across title variants.

use reconcile_shared::MatchScore;

/// One scored candidate from one search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub uri: String,
    pub score: MatchScore,
    /// Hub URIs the candidate links to (empty for Hub searches).
    pub hub_links: Vec<String>,
}

/// Candidates found for one title variant, in search order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantResults {
    pub title: String,
    pub candidates: Vec<ScoredCandidate>,
}

impl VariantResults {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            candidates: Vec::new(),
        }
    }

    /// Add a candidate; a URI already present for this variant keeps its first score.
    pub fn push(&mut self, candidate: ScoredCandidate) {
        if !self.candidates.iter().any(|c| c.uri == candidate.uri) {
            self.candidates.push(candidate);
        }
    }

    /// Best candidate within this variant alone.
    pub fn best(&self) -> Option<BestMatch> {
        select(self.candidates.iter().map(|c| (self.title.as_str(), c)))
    }

    /// Highest-total candidate regardless of threshold; ties keep the first seen.
    pub fn closest(&self) -> Option<&ScoredCandidate> {
        self.candidates.iter().fold(None, |top, c| match top {
            Some(t) if c.score.total() <= t.score.total() => Some(t),
            _ => Some(c),
        })
    }
}

/// All variants searched for one Work in one category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub variants: Vec<VariantResults>,
}

impl ResultSet {
    pub fn push(&mut self, variant: VariantResults) {
        self.variants.push(variant);
    }

    pub fn is_empty(&self) -> bool {
        self.variants.iter().all(|v| v.candidates.is_empty())
    }
}

/// The winning candidate and the variant that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct BestMatch {
    pub uri: String,
    pub title: String,
    pub score: MatchScore,
    pub hub_links: Vec<String>,
}

/// Pick the best candidate across every variant, or `None` when nothing
/// clears its threshold.
pub fn select_best(results: &ResultSet) -> Option<BestMatch> {
    select(
        results
            .variants
            .iter()
            .flat_map(|v| v.candidates.iter().map(move |c| (v.title.as_str(), c))),
    )
}

/// A candidate replaces the running best only when it beats its total and
/// clears its own majority threshold. Ties keep the first seen.
fn select<'a>(candidates: impl Iterator<Item = (&'a str, &'a ScoredCandidate)>) -> Option<BestMatch> {
    let mut best: Option<(f64, &str, &ScoredCandidate)> = None;

    for (title, candidate) in candidates {
        let total = candidate.score.total();
        let running = best.map_or(0.0, |(t, _, _)| t);
        if total > running && total > candidate.score.threshold() {
            best = Some((total, title, candidate));
        }
    }

    best.map(|(_, title, candidate)| BestMatch {
        uri: candidate.uri.clone(),
        title: title.to_string(),
        score: candidate.score.clone(),
        hub_links: candidate.hub_links.clone(),
    })
}

#[cfg(test)]
mod tests {
    use reconcile_shared::ScoreField;

    use super::*;

    fn candidate(uri: &str, fields: &[(ScoreField, f64)]) -> ScoredCandidate {
        let mut score = MatchScore::new();
        for (field, value) in fields {
            score.set(*field, *value);
        }
        ScoredCandidate {
            uri: uri.into(),
            score,
            hub_links: vec![],
        }
    }

    fn variant(title: &str, candidates: Vec<ScoredCandidate>) -> VariantResults {
        let mut v = VariantResults::new(title);
        for c in candidates {
            v.push(c);
        }
        v
    }

    #[test]
    fn title_only_exact_match_is_selected() {
        let mut results = ResultSet::default();
        results.push(variant(
            "Moby Dick",
            vec![candidate("w1", &[(ScoreField::Title, 0.5)])],
        ));
        let best = select_best(&results).expect("selected");
        assert_eq!(best.uri, "w1");
        assert_eq!(best.title, "Moby Dick");
    }

    #[test]
    fn total_at_threshold_is_not_selected() {
        let mut results = ResultSet::default();
        // two fields scored, threshold 1.0
        results.push(variant(
            "Typee",
            vec![candidate(
                "w1",
                &[(ScoreField::Title, 0.5), (ScoreField::Languages, 0.5)],
            )],
        ));
        assert!(select_best(&results).is_none());

        results.push(variant(
            "Typee: a peep at Polynesian life",
            vec![candidate(
                "w2",
                &[(ScoreField::Title, 0.5), (ScoreField::Languages, 0.75)],
            )],
        ));
        assert_eq!(select_best(&results).unwrap().uri, "w2");
    }

    #[test]
    fn closest_ignores_threshold() {
        let v = variant(
            "Moby Dick",
            vec![
                candidate("w1", &[(ScoreField::Title, 0.2), (ScoreField::Languages, 0.5)]),
                candidate("w2", &[(ScoreField::Title, 0.4), (ScoreField::Languages, 0.5)]),
                candidate("w3", &[(ScoreField::Title, 0.4), (ScoreField::Languages, 0.5)]),
            ],
        );
        assert!(v.best().is_none());
        assert_eq!(v.closest().map(|c| c.uri.as_str()), Some("w2"));
        assert!(VariantResults::new("Typee").closest().is_none());
    }

    #[test]
    fn best_across_variants_and_ties_keep_first() {
        let mut results = ResultSet::default();
        results.push(variant(
            "Moby Dick",
            vec![
                candidate("w1", &[(ScoreField::Title, 0.4)]),
                candidate("w2", &[(ScoreField::Title, 0.45)]),
            ],
        ));
        results.push(variant(
            "The Whale",
            vec![
                candidate("w3", &[(ScoreField::Title, 0.45)]),
                candidate("w4", &[(ScoreField::Title, 0.3)]),
            ],
        ));
        let best = select_best(&results).unwrap();
        assert_eq!(best.uri, "w2");
        assert_eq!(best.title, "Moby Dick");
    }

    #[test]
    fn high_total_below_own_threshold_is_skipped() {
        let mut results = ResultSet::default();
        results.push(variant(
            "Moby Dick",
            vec![
                // 1.3 total, but three fields scored: threshold 1.5
                candidate(
                    "w1",
                    &[
                        (ScoreField::Title, 0.5),
                        (ScoreField::Contributors, 0.8),
                        (ScoreField::Notes, 0.0),
                    ],
                ),
                candidate("w2", &[(ScoreField::Title, 0.3)]),
            ],
        ));
        assert_eq!(select_best(&results).unwrap().uri, "w2");
    }

    #[test]
    fn partial_title_with_contributor_clears_majority() {
        let mut results = ResultSet::default();
        // 1.15 over two fields beats 1.0 even though the contributor
        // field alone is well under its 2.0 maximum
        results.push(variant(
            "Moby Dick",
            vec![candidate(
                "w1",
                &[(ScoreField::Title, 0.45), (ScoreField::Contributors, 0.7)],
            )],
        ));
        let best = select_best(&results).expect("selected");
        assert_eq!(best.uri, "w1");
        assert_eq!(best.score.threshold(), 1.0);
    }

    #[test]
    fn duplicate_uri_within_variant_keeps_first() {
        let v = variant(
            "Moby Dick",
            vec![
                candidate("w1", &[(ScoreField::Title, 0.3)]),
                candidate("w1", &[(ScoreField::Title, 0.5)]),
            ],
        );
        assert_eq!(v.candidates.len(), 1);
        assert_eq!(v.best().unwrap().score.total(), 0.3);
    }

    #[test]
    fn empty_results_not_found() {
        let results = ResultSet::default();
        assert!(results.is_empty());
        assert!(select_best(&results).is_none());
    }
}
