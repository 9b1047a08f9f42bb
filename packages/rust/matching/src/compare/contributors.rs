use std::future::Future;

use reconcile_shared::{AgentRef, Contributor, Result};
use tracing::{debug, warn};

use crate::similarity::{distance, similarity};

/// Weight applied when more than one local contributor corroborates a match.
const CORROBORATION_WEIGHT: f64 = 2.0;

/// A candidate contribution reduced to what the comparator needs.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedContributor {
    pub type_uri: String,
    pub label: Option<String>,
}

/// Resolves display labels for agent resources referenced by candidates.
///
/// Implementations are expected to consult a cache before going to the network.
pub trait AgentResolver {
    /// Whether `uri` points at an authority the resolver can dereference.
    fn is_external(&self, uri: &str) -> bool;

    /// Label for the agent at `uri`, or `None` when its record carries none.
    fn resolve_agent_label(&self, uri: &str) -> impl Future<Output = Result<Option<String>>>;
}

/// Resolve type URI and agent label for each candidate contribution.
///
/// Inline labels are used as-is. Linked agents are resolved through
/// `resolver` when external; local links without a label are dropped.
/// Resolution failures keep the contribution with no label.
pub async fn normalize_contributions<R: AgentResolver>(
    contributions: &[Contributor],
    resolver: &R,
) -> Vec<NormalizedContributor> {
    let mut normalized = Vec::with_capacity(contributions.len());

    for contribution in contributions {
        let label = match &contribution.agent {
            AgentRef::Label { label } => Some(label.clone()),
            AgentRef::Link {
                label: Some(label), ..
            } => Some(label.clone()),
            AgentRef::Link { uri, label: None } => {
                if !resolver.is_external(uri) {
                    debug!(%uri, "skipping local agent link");
                    continue;
                }
                match resolver.resolve_agent_label(uri).await {
                    Ok(label) => label,
                    Err(e) => {
                        warn!(%uri, error = %e, "agent label lookup failed");
                        None
                    }
                }
            }
        };

        normalized.push(NormalizedContributor {
            type_uri: contribution.type_uri.clone(),
            label,
        });
    }

    normalized
}

/// Score local contributors against normalized candidate contributors, in `[0, 2]`.
///
/// Each local contributor keeps the candidate with the largest denominator,
/// then the largest score. A single matched contributor contributes its
/// normalized score; several are averaged and doubled.
pub fn score_contributors(local: &[Contributor], candidates: &[NormalizedContributor]) -> f64 {
    if local.is_empty() || candidates.is_empty() {
        return 0.0;
    }

    let matched: Vec<f64> = local
        .iter()
        .filter_map(|contributor| best_for(contributor, candidates))
        .collect();

    match matched.len() {
        0 => 0.0,
        1 => matched[0],
        n => CORROBORATION_WEIGHT * matched.iter().sum::<f64>() / n as f64,
    }
}

/// Normalized score of the best candidate for one local contributor.
fn best_for(local: &Contributor, candidates: &[NormalizedContributor]) -> Option<f64> {
    let local_label = local.agent.label();
    let mut best: Option<(u32, f64)> = None;

    for candidate in candidates {
        let mut denominator = 0u32;
        let mut score = 0.0;
        let mut exact = false;

        if local.type_uri == candidate.type_uri {
            denominator += 1;
            score += 1.0;
        }
        if let Some(local_label) = local_label {
            denominator += 1;
            if let Some(label) = candidate.label.as_deref() {
                score += similarity(local_label, label).max(0.0);
                exact = distance(local_label, label) == 0;
            }
        }

        if denominator == 0 {
            continue;
        }
        let better = match best {
            None => true,
            Some((d, s)) => denominator > d || (denominator == d && score > s),
        };
        if better {
            best = Some((denominator, score));
        }
        if exact {
            break;
        }
    }

    best.filter(|(_, score)| *score > 0.0)
        .map(|(denominator, score)| score / denominator as f64)
}
