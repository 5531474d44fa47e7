//! JSON-over-HTTP adapters.
//!
//! The dispatcher POSTs `{"contact": ..., "match": ...}` to the configured
//! URL; any 2xx is a success. The report generator POSTs `{"match_id": ...}`
//! and reads `{"success", "detail"}` back, falling back to the HTTP status
//! when the body has some other shape.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{DispatchError, MatchSummary, NotificationDispatcher, ReportGenerator, ReportOutcome};

#[derive(Serialize)]
struct NotifyRequest<'a> {
    contact: &'a serde_json::Value,
    #[serde(rename = "match")]
    summary: &'a MatchSummary,
}

#[derive(Serialize)]
struct ReportRequest<'a> {
    match_id: &'a str,
}

fn build_client(timeout_secs: u64) -> anyhow::Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}

/// Read the body of a non-2xx response into a [`DispatchError::Status`].
async fn status_error(resp: reqwest::Response) -> DispatchError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    DispatchError::Status { status, body }
}

pub struct WebhookDispatcher {
    client: Client,
    url: String,
}

impl WebhookDispatcher {
    pub fn new(url: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn dispatch(
        &self,
        contact: &serde_json::Value,
        summary: &MatchSummary,
    ) -> Result<(), DispatchError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&NotifyRequest { contact, summary })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        Ok(())
    }
}

pub struct WebhookReportGenerator {
    client: Client,
    endpoint: String,
}

impl WebhookReportGenerator {
    pub fn new(endpoint: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl ReportGenerator for WebhookReportGenerator {
    async fn generate(&self, match_id: &str) -> Result<ReportOutcome, DispatchError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&ReportRequest { match_id })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let body = resp.text().await?;
        Ok(parse_report_body(&body))
    }
}

fn parse_report_body(body: &str) -> ReportOutcome {
    serde_json::from_str::<ReportOutcome>(body).unwrap_or_else(|_| ReportOutcome {
        success: true,
        detail: (!body.trim().is_empty()).then(|| body.trim().to_string()),
    })
}
