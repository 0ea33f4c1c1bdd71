use std::cmp::Ordering;
use std::collections::HashMap;

use crate::{CandidateResult, Mapping};

/// A candidate after scoring, tagged with the rank of the provider that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: CandidateResult,
    pub similarity: f64,
    /// Registration rank of the producing provider; lower is preferred.
    pub rank: usize,
}

/// Reduce scored candidates to at most one mapping per target provider id.
///
/// Candidates below `min_similarity` are dropped. The best similarity wins;
/// equal similarities go to the lower rank. The result is ordered by
/// similarity descending, then rank, then provider id.
pub fn select_mappings(scored: Vec<ScoredCandidate>, min_similarity: f64) -> Vec<Mapping> {
    let mut best: HashMap<String, ScoredCandidate> = HashMap::new();
    for entry in scored {
        if !entry.similarity.is_finite() || entry.similarity < min_similarity {
            continue;
        }
        match best.get(&entry.candidate.provider_id) {
            Some(current) if !is_better(&entry, current) => {}
            _ => {
                best.insert(entry.candidate.provider_id.clone(), entry);
            }
        }
    }

    let mut winners: Vec<ScoredCandidate> = best.into_values().collect();
    winners.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then(a.rank.cmp(&b.rank))
            .then_with(|| a.candidate.provider_id.cmp(&b.candidate.provider_id))
    });
    winners
        .into_iter()
        .map(|winner| Mapping {
            provider_id: winner.candidate.provider_id,
            external_id: winner.candidate.external_id,
            similarity: winner.similarity,
        })
        .collect()
}

fn is_better(challenger: &ScoredCandidate, current: &ScoredCandidate) -> bool {
    match challenger.similarity.total_cmp(&current.similarity) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => challenger.rank < current.rank,
    }
}

/// Add `mapping` unless its provider id is already mapped.
pub fn push_unique(mappings: &mut Vec<Mapping>, mapping: Mapping) -> bool {
    if mappings
        .iter()
        .any(|existing| existing.provider_id == mapping.provider_id)
    {
        return false;
    }
    mappings.push(mapping);
    true
}
