use std::collections::BTreeSet;

/// Fraction of local language URIs present in the candidate's language set.
pub fn score_languages(local: &BTreeSet<String>, candidate: &BTreeSet<String>) -> f64 {
    if local.is_empty() {
        return 0.0;
    }
    let found = local.iter().filter(|code| candidate.contains(*code)).count();
    found as f64 / local.len() as f64
}
