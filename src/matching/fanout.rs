//! Notification fan-out for newly recorded matches.
//!
//! Notification and report generation are independent steps, each behind its
//! own timeout and error boundary. Neither can prevent the other from running,
//! and neither can abort the pass.
//!
//! Status policy: a successful notification advances the match to
//! `notified`; a failed one leaves the status untouched and only writes a
//! `notify_failed` audit entry. The report step then moves the match to its
//! terminal state, `report_sent` or `failed`, with attempt metadata.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::store::MatchStore;
use super::types::{MatchRecord, MatchStatus, SubjectRecord};
use crate::notify::{DispatchError, MatchSummary, NotificationDispatcher, ReportGenerator};

/// How a single fan-out step ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed { error: String },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FanoutOutcome {
    pub notify: StepOutcome,
    pub report: StepOutcome,
}

impl FanoutOutcome {
    pub fn notify_success(&self) -> bool {
        self.notify.is_success()
    }

    pub fn report_success(&self) -> bool {
        self.report.is_success()
    }
}

pub struct Fanout {
    matches: Arc<dyn MatchStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    reports: Arc<dyn ReportGenerator>,
    notify_timeout: Duration,
    report_timeout: Duration,
}

impl Fanout {
    pub fn new(
        matches: Arc<dyn MatchStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        reports: Arc<dyn ReportGenerator>,
        notify_timeout: Duration,
        report_timeout: Duration,
    ) -> Self {
        Self {
            matches,
            dispatcher,
            reports,
            notify_timeout,
            report_timeout,
        }
    }

    /// Notify the subject's contact and generate the report for `record`.
    pub async fn notify(&self, subject: &SubjectRecord, record: &MatchRecord) -> FanoutOutcome {
        let notify = self.send_notification(subject, record).await;
        let report = self.send_report(record).await;
        FanoutOutcome { notify, report }
    }

    async fn send_notification(&self, subject: &SubjectRecord, record: &MatchRecord) -> StepOutcome {
        let summary = MatchSummary::from(record);
        let result = match subject.contact.as_ref() {
            Some(contact) => {
                with_timeout(self.notify_timeout, self.dispatcher.dispatch(contact, &summary)).await
            }
            None => Err(DispatchError::MissingContact),
        };
        let now = chrono::Utc::now().to_rfc3339();

        match result {
            Ok(()) => {
                self.advance(record, MatchStatus::Notified, serde_json::json!({ "notified_at": now }))
                    .await;
                self.audit(record, "notify", serde_json::json!({ "at": now })).await;
                StepOutcome::Succeeded
            }
            Err(e) => {
                tracing::warn!(
                    match_id = %record.id,
                    subject_id = %record.subject_id,
                    error = %e,
                    "notification failed"
                );
                self.audit(
                    record,
                    "notify_failed",
                    serde_json::json!({ "at": now, "error": e.to_string() }),
                )
                .await;
                StepOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn send_report(&self, record: &MatchRecord) -> StepOutcome {
        let result = with_timeout(self.report_timeout, self.reports.generate(&record.id)).await;
        let now = chrono::Utc::now().to_rfc3339();

        let failure = match result {
            Ok(outcome) if outcome.success => {
                self.advance(
                    record,
                    MatchStatus::ReportSent,
                    serde_json::json!({ "report_sent_at": now, "report_detail": outcome.detail }),
                )
                .await;
                self.audit(record, "report", serde_json::json!({ "at": now, "detail": outcome.detail }))
                    .await;
                return StepOutcome::Succeeded;
            }
            Ok(outcome) => outcome
                .detail
                .unwrap_or_else(|| "report generator reported failure".into()),
            Err(e) => e.to_string(),
        };

        tracing::warn!(match_id = %record.id, error = %failure, "report generation failed");
        self.advance(
            record,
            MatchStatus::Failed,
            serde_json::json!({ "report_failed_at": now, "report_error": failure }),
        )
        .await;
        self.audit(record, "report_failed", serde_json::json!({ "at": now, "error": failure }))
            .await;
        StepOutcome::Failed { error: failure }
    }

    /// Status writes are isolated: a failure is logged and the fan-out goes on.
    async fn advance(&self, record: &MatchRecord, status: MatchStatus, metadata: serde_json::Value) {
        if let Err(e) = self.matches.update_status(&record.id, status, metadata).await {
            tracing::warn!(match_id = %record.id, status = %status, error = %e, "failed to update match status");
        }
    }

    async fn audit(&self, record: &MatchRecord, operation: &str, details: serde_json::Value) {
        if let Err(e) = self.matches.log_event(&record.id, operation, details).await {
            tracing::warn!(match_id = %record.id, operation, error = %e, "failed to write audit entry");
        }
    }
}

async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, DispatchError>
where
    F: Future<Output = Result<T, DispatchError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DispatchError::Timeout(limit)),
    }
}
