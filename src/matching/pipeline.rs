//! One pass of the matching pipeline: Scanner → Gate → Fan-out.
//!
//! Subjects are processed strictly one after another and, within a subject,
//! candidates in descending-similarity order. Only a failure to obtain the
//! work list aborts a pass; every per-candidate failure is captured as a
//! [`CandidateOutcome`] in the returned [`PassSummary`].

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::fanout::{Fanout, FanoutOutcome};
use super::gate::{record_if_new, GateOutcome};
use super::scanner::{comparison_count, find_candidates, Candidate};
use super::store::{MatchStore, RecordStore, StoreError};
use super::types::{ResolutionState, SubjectRecord};
use crate::config::{MatchingConfig, ReuniteConfig};
use crate::notify::{NotificationDispatcher, ReportGenerator};

#[derive(Error, Debug)]
pub enum PassError {
    #[error("pass aborted: failed to list unresolved subjects: {0}")]
    ListSubjects(#[source] StoreError),

    #[error("pass aborted: failed to load counterpart pool: {0}")]
    LoadPool(#[source] StoreError),
}

/// What happened to one candidate pair.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateOutcome {
    Matched {
        match_id: String,
        fanout: FanoutOutcome,
    },
    AlreadyRecorded,
    PersistFailed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateReport {
    pub subject_id: String,
    pub counterpart_id: String,
    pub similarity: f64,
    /// `None` when the distance is unknown.
    pub distance_miles: Option<f64>,
    pub outcome: CandidateOutcome,
}

/// Counters and per-candidate outcomes for one pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassSummary {
    pub subjects_scanned: usize,
    pub subjects_skipped: usize,
    pub pool_size: usize,
    pub comparisons: usize,
    pub candidates: usize,
    pub matches_created: usize,
    pub duplicates: usize,
    pub persist_failures: usize,
    pub notify_failures: usize,
    pub report_failures: usize,
    pub elapsed_ms: u128,
    pub outcomes: Vec<CandidateReport>,
}

impl PassSummary {
    fn record(&mut self, subject_id: &str, candidate: &Candidate, outcome: CandidateOutcome) {
        self.candidates += 1;
        match &outcome {
            CandidateOutcome::Matched { fanout, .. } => {
                self.matches_created += 1;
                if !fanout.notify_success() {
                    self.notify_failures += 1;
                }
                if !fanout.report_success() {
                    self.report_failures += 1;
                }
            }
            CandidateOutcome::AlreadyRecorded => self.duplicates += 1,
            CandidateOutcome::PersistFailed { .. } => self.persist_failures += 1,
        }
        self.outcomes.push(CandidateReport {
            subject_id: subject_id.to_string(),
            counterpart_id: candidate.counterpart_id.clone(),
            similarity: candidate.similarity,
            distance_miles: candidate
                .distance_miles
                .is_finite()
                .then_some(candidate.distance_miles),
            outcome,
        });
    }
}

pub struct Pipeline {
    records: Arc<dyn RecordStore>,
    matches: Arc<dyn MatchStore>,
    fanout: Fanout,
    config: MatchingConfig,
}

impl Pipeline {
    pub fn new(
        records: Arc<dyn RecordStore>,
        matches: Arc<dyn MatchStore>,
        fanout: Fanout,
        config: MatchingConfig,
    ) -> Self {
        Self {
            records,
            matches,
            fanout,
            config,
        }
    }

    /// Wire a pipeline from configuration: one store serving both roles, plus
    /// the configured dispatcher and report generator.
    pub fn from_config<S>(
        config: &ReuniteConfig,
        store: S,
        dispatcher: Arc<dyn NotificationDispatcher>,
        reports: Arc<dyn ReportGenerator>,
    ) -> Self
    where
        S: RecordStore + MatchStore + 'static,
    {
        let store = Arc::new(store);
        let fanout = Fanout::new(
            store.clone(),
            dispatcher,
            reports,
            Duration::from_secs(config.notify.timeout_secs),
            Duration::from_secs(config.report.timeout_secs),
        );
        Self::new(store.clone(), store, fanout, config.matching.clone())
    }

    /// Execute one full pass.
    pub async fn run_pass(&self) -> Result<PassSummary, PassError> {
        let started = Instant::now();
        let mut summary = PassSummary::default();

        let subjects = self
            .records
            .list_subjects(ResolutionState::Unresolved, self.config.batch_size)
            .await
            .map_err(PassError::ListSubjects)?;

        if subjects.is_empty() {
            tracing::debug!("no unresolved subjects with embeddings");
            summary.elapsed_ms = started.elapsed().as_millis();
            return Ok(summary);
        }

        let pool = self
            .records
            .list_subjects(ResolutionState::Resolved, self.config.pool_size)
            .await
            .map_err(PassError::LoadPool)?;
        summary.pool_size = pool.len();

        tracing::info!(
            subjects = subjects.len(),
            pool = pool.len(),
            "scan pass started"
        );

        for subject in &subjects {
            self.process_subject(subject, &pool, &mut summary).await;
            tokio::task::yield_now().await;
        }

        summary.elapsed_ms = started.elapsed().as_millis();
        tracing::info!(
            scanned = summary.subjects_scanned,
            skipped = summary.subjects_skipped,
            candidates = summary.candidates,
            created = summary.matches_created,
            duplicates = summary.duplicates,
            persist_failures = summary.persist_failures,
            notify_failures = summary.notify_failures,
            report_failures = summary.report_failures,
            elapsed_ms = summary.elapsed_ms as u64,
            "scan pass complete"
        );
        Ok(summary)
    }

    async fn process_subject(
        &self,
        subject: &SubjectRecord,
        pool: &[SubjectRecord],
        summary: &mut PassSummary,
    ) {
        if !subject.has_embeddings() {
            tracing::debug!(subject_id = %subject.id, "skipping subject without embeddings");
            summary.subjects_skipped += 1;
            return;
        }
        summary.subjects_scanned += 1;
        summary.comparisons += comparison_count(subject, pool);

        let candidates = find_candidates(subject, pool, &self.config.thresholds());
        if !candidates.is_empty() {
            tracing::debug!(
                subject_id = %subject.id,
                candidates = candidates.len(),
                best = candidates[0].similarity,
                "candidates found"
            );
        }

        for candidate in &candidates {
            let outcome = self.process_candidate(subject, candidate).await;
            summary.record(&subject.id, candidate, outcome);
        }
    }

    async fn process_candidate(&self, subject: &SubjectRecord, candidate: &Candidate) -> CandidateOutcome {
        match record_if_new(self.matches.as_ref(), &subject.id, candidate).await {
            Ok(GateOutcome::Created(record)) => {
                let fanout = self.fanout.notify(subject, &record).await;
                CandidateOutcome::Matched {
                    match_id: record.id,
                    fanout,
                }
            }
            Ok(GateOutcome::AlreadyRecorded) => CandidateOutcome::AlreadyRecorded,
            Err(e) => {
                tracing::warn!(
                    subject_id = %subject.id,
                    counterpart_id = %candidate.counterpart_id,
                    error = %e,
                    "failed to persist match"
                );
                CandidateOutcome::PersistFailed {
                    error: e.to_string(),
                }
            }
        }
    }
}
