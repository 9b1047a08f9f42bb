//! Edit distance and the length-normalized similarity built on it.

/// Levenshtein distance over Unicode scalar values, unit cost for insert,
/// delete, and substitute.
pub fn distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// `(len(a) - distance(a, b)) / len(a)`.
///
/// Normalized by the length of `a` only, so pass the local value first.
/// Ranges over `(-inf, 1]`; an empty `a` yields `0.0`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let len = a.chars().count();
    if len == 0 {
        return 0.0;
    }
    (len as f64 - distance(a, b) as f64) / len as f64
}

/// Near-identity test shared by note labels and knowledge-graph titles:
/// accepted when fewer than 10% of `target`'s characters need editing.
pub fn within_tenth(target: &str, candidate: &str) -> bool {
    let len = target.chars().count();
    (distance(target, candidate) as f64) < 0.1 * len as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_identity_and_symmetry() {
        for s in ["", "a", "Moby Dick", "Ἰλιάς", "Translation of: X"] {
            assert_eq!(distance(s, s), 0);
        }
        let pairs = [
            ("kitten", "sitting"),
            ("Moby Dick", "Moby-Dick; or, The Whale"),
            ("", "abc"),
            ("flaw", "lawn"),
        ];
        for (a, b) in pairs {
            assert_eq!(distance(a, b), distance(b, a), "{a} / {b}");
        }
    }

    #[test]
    fn distance_known_values() {
        assert_eq!(distance("kitten", "sitting"), 3);
        assert_eq!(distance("", "abc"), 3);
        assert_eq!(distance("flaw", "lawn"), 2);
        assert_eq!(distance("Translation of: X", "Translation of: X (1851)"), 7);
    }

    #[test]
    fn distance_counts_characters_not_bytes() {
        assert_eq!(distance("café", "cafe"), 1);
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(similarity("Moby Dick", "Moby Dick"), 1.0);
        assert!(similarity("abc", "abd") < 1.0);
        assert!(similarity("ab", "completely different") < 0.0);
        for (a, b) in [("x", "y"), ("Hamlet", "Hamlet, Prince of Denmark"), ("a", "")] {
            assert!(similarity(a, b) <= 1.0);
        }
    }

    #[test]
    fn similarity_is_asymmetric() {
        let a = "Hamlet";
        let b = "Hamlet, Prince of Denmark";
        assert_ne!(similarity(a, b), similarity(b, a));
    }

    #[test]
    fn similarity_of_empty_target_is_zero() {
        assert_eq!(similarity("", "anything"), 0.0);
        assert_eq!(similarity("", ""), 0.0);
    }

    #[test]
    fn within_tenth_threshold() {
        // 21 chars would allow < 2.1 edits; 7 edits is far outside
        assert!(!within_tenth("Translation of: X", "Translation of: X (1851)"));
        assert!(within_tenth("The Adventures of Tom Sawyer", "The Adventures of Tom Sawyer."));
        assert!(!within_tenth("", ""));
    }
}
