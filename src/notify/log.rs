//! Log-only adapters. Nothing leaves the process; every call succeeds.

use async_trait::async_trait;

use super::{DispatchError, MatchSummary, NotificationDispatcher, ReportGenerator, ReportOutcome};

pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(
        &self,
        contact: &serde_json::Value,
        summary: &MatchSummary,
    ) -> Result<(), DispatchError> {
        tracing::info!(
            match_id = %summary.match_id,
            subject_id = %summary.subject_id,
            counterpart_id = %summary.counterpart_id,
            similarity = summary.similarity,
            distance_miles = ?summary.distance_miles,
            contact = %contact,
            "match notification (log only)"
        );
        Ok(())
    }
}

pub struct LogReportGenerator;

#[async_trait]
impl ReportGenerator for LogReportGenerator {
    async fn generate(&self, match_id: &str) -> Result<ReportOutcome, DispatchError> {
        tracing::info!(match_id, "match report (log only)");
        Ok(ReportOutcome {
            success: true,
            detail: Some("logged".into()),
        })
    }
}
