use reconcile_shared::{NOTE_LABEL_FIELD, Note};

use crate::similarity::{similarity, within_tenth};

/// Average score of the local notes that found a satisfying candidate note.
///
/// A candidate note satisfies a local note only when every local field is
/// present and accepted. Candidates are tried in order; the first one that
/// satisfies wins.
pub fn score_notes(local: &[Note], candidates: &[Note]) -> f64 {
    let mut total = 0.0;
    let mut matched = 0usize;

    for local_note in local.iter().filter(|n| !n.is_empty()) {
        if let Some(score) = candidates.iter().find_map(|c| note_score(local_note, c)) {
            total += score;
            matched += 1;
        }
    }

    if matched == 0 {
        0.0
    } else {
        total / matched as f64
    }
}

/// Mean per-field score when `candidate` accepts every field of `local`.
fn note_score(local: &Note, candidate: &Note) -> Option<f64> {
    let mut accepted = 0usize;
    let mut sum = 0.0;

    for (field, value) in local {
        let Some(other) = candidate.get(field) else {
            continue;
        };
        if field == NOTE_LABEL_FIELD {
            if within_tenth(value, other) {
                accepted += 1;
                sum += similarity(value, other);
            }
        } else if value == other {
            accepted += 1;
            sum += 1.0;
        }
    }

    (accepted == local.len()).then(|| sum / local.len() as f64)
}
