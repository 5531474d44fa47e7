//! Downstream collaborators invoked for each newly recorded match.
//!
//! Provides the [`NotificationDispatcher`] and [`ReportGenerator`] traits and
//! two adapters for each: `webhook` (JSON over HTTP) and `log` (emit a
//! tracing event only, for dry runs). Adapters are created from
//! configuration via [`create_dispatcher`] and [`create_report_generator`].

pub mod error;
pub mod log;
pub mod webhook;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

pub use error::DispatchError;

use crate::config::{NotifyConfig, ReportConfig};
use crate::matching::types::MatchRecord;

/// What the dispatcher is told about a match.
#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub match_id: String,
    pub subject_id: String,
    pub counterpart_id: String,
    pub similarity: f64,
    /// `None` when the distance is unknown.
    pub distance_miles: Option<f64>,
}

impl From<&MatchRecord> for MatchSummary {
    fn from(record: &MatchRecord) -> Self {
        Self {
            match_id: record.id.clone(),
            subject_id: record.subject_id.clone(),
            counterpart_id: record.counterpart_id.clone(),
            similarity: record.similarity,
            distance_miles: record.distance_miles,
        }
    }
}

/// Outcome reported by a [`ReportGenerator`].
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq)]
pub struct ReportOutcome {
    pub success: bool,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Delivers a "possible match found" message to the subject's contact.
///
/// Implementations must be safe for concurrent use (Send + Sync). Delivery
/// retries, if any, belong to the implementation.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        contact: &serde_json::Value,
        summary: &MatchSummary,
    ) -> Result<(), DispatchError>;
}

/// Produces a shareable artifact for a match.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self, match_id: &str) -> Result<ReportOutcome, DispatchError>;
}

/// Create a notification dispatcher from config.
///
/// Supported providers: `"log"` and `"webhook"` (requires `webhook_url`).
pub fn create_dispatcher(config: &NotifyConfig) -> anyhow::Result<Arc<dyn NotificationDispatcher>> {
    match config.provider.as_str() {
        "log" => Ok(Arc::new(log::LogDispatcher)),
        "webhook" => {
            let url = config
                .webhook_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("notify.webhook_url is required for the webhook provider"))?;
            Ok(Arc::new(webhook::WebhookDispatcher::new(url, config.timeout_secs)?))
        }
        other => anyhow::bail!("unknown notify provider: {other}. Supported: log, webhook"),
    }
}

/// Create a report generator from config.
///
/// Supported providers: `"log"` and `"webhook"` (requires `endpoint`).
pub fn create_report_generator(config: &ReportConfig) -> anyhow::Result<Arc<dyn ReportGenerator>> {
    match config.provider.as_str() {
        "log" => Ok(Arc::new(log::LogReportGenerator)),
        "webhook" => {
            let endpoint = config
                .endpoint
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("report.endpoint is required for the webhook provider"))?;
            Ok(Arc::new(webhook::WebhookReportGenerator::new(
                endpoint,
                config.timeout_secs,
            )?))
        }
        other => anyhow::bail!("unknown report provider: {other}. Supported: log, webhook"),
    }
}
