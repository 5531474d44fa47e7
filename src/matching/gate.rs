//! Dedup & persistence gate: record each (subject, counterpart) pair once.

use super::scanner::Candidate;
use super::store::{MatchStore, StoreError};
use super::types::{MatchRecord, NewMatch};

/// Result of pushing one candidate through the gate.
#[derive(Debug)]
pub enum GateOutcome {
    /// A new `pending` match was persisted.
    Created(MatchRecord),
    /// The pair was recorded by an earlier pass.
    AlreadyRecorded,
}

/// Check the store for an existing match on this exact pair and insert one if
/// absent.
///
/// The existence check avoids a write on the common re-scan path; the store's
/// pair uniqueness closes the window between check and insert, so a lost race
/// also reports [`GateOutcome::AlreadyRecorded`].
pub async fn record_if_new(
    store: &dyn MatchStore,
    subject_id: &str,
    candidate: &Candidate,
) -> Result<GateOutcome, StoreError> {
    if store.exists(subject_id, &candidate.counterpart_id).await? {
        tracing::debug!(
            subject_id,
            counterpart_id = %candidate.counterpart_id,
            "pair already recorded"
        );
        return Ok(GateOutcome::AlreadyRecorded);
    }

    let new = NewMatch {
        subject_id: subject_id.to_string(),
        counterpart_id: candidate.counterpart_id.clone(),
        similarity: candidate.similarity,
        distance_miles: candidate.distance_miles,
    };

    match store.insert(&new).await? {
        Some(record) => {
            tracing::info!(
                match_id = %record.id,
                subject_id,
                counterpart_id = %record.counterpart_id,
                similarity = record.similarity,
                distance_miles = candidate.distance_miles,
                "new match recorded"
            );
            Ok(GateOutcome::Created(record))
        }
        None => Ok(GateOutcome::AlreadyRecorded),
    }
}
