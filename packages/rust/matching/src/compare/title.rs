use crate::similarity::similarity;

/// Weight applied to the best title similarity. Searches are already ranked
/// by title relevance, so title agreement alone must not carry a match.
pub const TITLE_WEIGHT: f64 = 0.5;

/// Best similarity of `target` against any candidate title, scaled into `[0, 0.5]`.
pub fn score_title(target: &str, candidates: &[String]) -> f64 {
    let best = candidates
        .iter()
        .map(|c| similarity(target, c))
        .fold(0.0_f64, f64::max);
    (best * TITLE_WEIGHT).clamp(0.0, TITLE_WEIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_heading_scores_half() {
        let candidates = vec!["Moby Dick".to_string()];
        assert_eq!(score_title("Moby Dick", &candidates), 0.5);
    }

    #[test]
    fn takes_best_candidate() {
        let candidates = vec![
            "Melville, Herman, 1819-1891. Typee".to_string(),
            "Moby Dick".to_string(),
        ];
        assert_eq!(score_title("Moby Dick", &candidates), 0.5);
    }

    #[test]
    fn always_within_range() {
        let candidates = vec![
            "Melville, Herman, 1819-1891. Moby Dick; or, The Whale".to_string(),
            "".to_string(),
            "x".to_string(),
        ];
        for target in ["Moby Dick", "M", "An entirely unrelated and very long title"] {
            let score = score_title(target, &candidates);
            assert!((0.0..=0.5).contains(&score), "{target}: {score}");
        }
        assert_eq!(score_title("Moby Dick", &[]), 0.0);
    }
}
