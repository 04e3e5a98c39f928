//! Best-effort telemetry sink over the Tinybird events API
//!
//! Each audit record becomes one JSON event posted to
//! `{base_url}/events?name={datasource}`. Failures are reported to the caller
//! and never retried here.

use crate::config::TelemetrySettings;
use crate::domain::{AuditLog, AuditRequest, AuditResponse, AuditStats, Page};
use crate::infrastructure::audit_store::{AuditQuery, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const REQUESTS_DATASOURCE: &str = "audit_requests";
pub const RESPONSES_DATASOURCE: &str = "audit_responses";

const EVENT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const BACKEND_NAME: &str = "tinybird";

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Telemetry transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Telemetry endpoint returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Telemetry serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Fire-and-forget destination for audit records
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    fn name(&self) -> &str;

    async fn emit_request(&self, request: &AuditRequest) -> Result<(), TelemetryError>;

    async fn emit_response(&self, response: &AuditResponse) -> Result<(), TelemetryError>;
}

#[derive(Debug, Serialize)]
struct RequestEvent<'a> {
    id: String,
    timestamp: String,
    method: &'a str,
    request_id: &'a str,
    ip_address: &'a str,
    user_agent: &'a str,
    request: String,
    headers: String,
}

#[derive(Debug, Serialize)]
struct ResponseEvent<'a> {
    id: String,
    request_id: &'a str,
    timestamp: String,
    response: String,
    status_code: u16,
    process_time_ms: i64,
    error: &'a str,
}

fn event_id() -> String {
    Uuid::now_v7().to_string()
}

fn event_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(EVENT_TIMESTAMP_FORMAT).to_string()
}

/// Telemetry sink posting to a Tinybird workspace
#[derive(Debug, Clone)]
pub struct TinybirdSink {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl TinybirdSink {
    pub fn new(
        settings: &TelemetrySettings,
        token: impl Into<String>,
    ) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send_event<E: Serialize + Sync>(
        &self,
        datasource: &str,
        event: &E,
    ) -> Result<(), TelemetryError> {
        let url = format!("{}/events?name={}", self.base_url, datasource);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(event)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::ACCEPTED {
            debug!(datasource, status = status.as_u16(), "Telemetry event accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(TelemetryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl TelemetrySink for TinybirdSink {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn emit_request(&self, request: &AuditRequest) -> Result<(), TelemetryError> {
        let request_id = request.request_id.to_string();
        let event = RequestEvent {
            id: event_id(),
            timestamp: event_timestamp(&request.timestamp),
            method: &request.method,
            request_id: &request_id,
            ip_address: &request.ip_address,
            user_agent: &request.user_agent,
            request: request.body.to_text_lossy(),
            headers: serde_json::to_string(&request.headers)?,
        };
        self.send_event(REQUESTS_DATASOURCE, &event).await
    }

    async fn emit_response(&self, response: &AuditResponse) -> Result<(), TelemetryError> {
        let request_id = response.request_id.to_string();
        let event = ResponseEvent {
            id: event_id(),
            request_id: &request_id,
            timestamp: event_timestamp(&response.timestamp),
            response: response.body.to_text_lossy(),
            status_code: response.status_code,
            process_time_ms: response.process_time_ms,
            error: &response.error,
        };
        self.send_event(RESPONSES_DATASOURCE, &event).await
    }
}

fn unsupported<T>(operation: &'static str) -> Result<T, StoreError> {
    Err(StoreError::NotImplemented {
        backend: BACKEND_NAME,
        operation,
    })
}

// Tinybird is write-only from the gateway's point of view; reads go to the primary store.
#[async_trait]
impl AuditQuery for TinybirdSink {
    async fn list_requests(&self, _page: Page) -> Result<Vec<AuditRequest>, StoreError> {
        unsupported("list_requests")
    }

    async fn list_responses(&self, _page: Page) -> Result<Vec<AuditResponse>, StoreError> {
        unsupported("list_responses")
    }

    async fn list_orphaned_requests(&self, _page: Page) -> Result<Vec<AuditRequest>, StoreError> {
        unsupported("list_orphaned_requests")
    }

    async fn list_combined_logs(
        &self,
        _page: Page,
        _method: Option<&str>,
    ) -> Result<Vec<AuditLog>, StoreError> {
        unsupported("list_combined_logs")
    }

    async fn stats(&self) -> Result<AuditStats, StoreError> {
        unsupported("stats")
    }
}
