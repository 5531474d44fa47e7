//! Candidate scanner: brute-force pairwise comparison of one subject against
//! the counterpart pool.

use serde::Serialize;
use std::cmp::Ordering;

use super::kernel::{best_similarity, geo_distance};
use super::types::{SubjectRecord, Thresholds};

/// A counterpart that passed both thresholds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub counterpart_id: String,
    pub similarity: f64,
    pub distance_miles: f64,
}

/// Compare `subject` against every counterpart in `pool` and return the ones
/// with `similarity >= min_similarity` and `distance <= max_distance_miles`.
///
/// Results are sorted by descending similarity; ties go to the nearer
/// counterpart, then to the lexicographically smaller id. Counterparts without
/// embeddings and the subject itself are ignored.
pub fn find_candidates(
    subject: &SubjectRecord,
    pool: &[SubjectRecord],
    thresholds: &Thresholds,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = pool
        .iter()
        .filter(|c| c.id != subject.id && c.has_embeddings())
        .filter_map(|counterpart| {
            let similarity = best_similarity(&subject.embeddings, &counterpart.embeddings);
            if similarity < thresholds.min_similarity {
                return None;
            }
            let distance_miles = geo_distance(subject.location, counterpart.location);
            if distance_miles > thresholds.max_distance_miles {
                return None;
            }
            Some(Candidate {
                counterpart_id: counterpart.id.clone(),
                similarity,
                distance_miles,
            })
        })
        .collect();

    candidates.sort_by(rank_order);
    candidates
}

fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.distance_miles.total_cmp(&b.distance_miles))
        .then_with(|| a.counterpart_id.cmp(&b.counterpart_id))
}

/// Number of pairwise vector comparisons a scan of `subject` performs.
pub fn comparison_count(subject: &SubjectRecord, pool: &[SubjectRecord]) -> usize {
    pool.iter()
        .filter(|c| c.id != subject.id)
        .map(|c| subject.embeddings.len() * c.embeddings.len())
        .sum()
}
