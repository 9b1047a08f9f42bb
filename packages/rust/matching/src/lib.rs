//! Similarity scoring and best-match selection.
//!
//! This crate provides:
//! - [`similarity`] — edit distance and length-normalized similarity
//! - [`compare`] — title, note, contributor, and language comparators
//! - [`selector`] — result sets and the best-match policy

pub mod compare;
pub mod selector;
pub mod similarity;

pub use compare::{
    AgentResolver, HubContext, NormalizedContributor, normalize_contributions, score_candidate,
};
pub use selector::{BestMatch, ResultSet, ScoredCandidate, VariantResults, select_best};
pub use similarity::{distance, similarity, within_tenth};
