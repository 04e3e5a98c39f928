//! Audit records: one request per inbound call, at most one response per request

use crate::domain::types::{CapturedHeaders, Payload, RecordId, RequestId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Method recorded when the body is not a parseable JSON-RPC envelope
pub const UNKNOWN_METHOD: &str = "unknown";

/// Captured inbound call, written once before forwarding and never updated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub request_id: RequestId,
    pub ip_address: String,
    pub user_agent: String,
    #[serde(rename = "request")]
    pub body: Payload,
    pub headers: CapturedHeaders,
}

/// Outcome of an inbound call, keyed to the request by `request_id`
///
/// The link is soft: a response may be stored before its request is visible.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub request_id: RequestId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "response")]
    pub body: Payload,
    pub status_code: u16,
    pub process_time_ms: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl AuditResponse {
    /// Response record stamped with the current time
    pub fn new(
        request_id: RequestId,
        body: impl Into<Payload>,
        status_code: u16,
        elapsed: Duration,
    ) -> Self {
        Self {
            id: None,
            request_id,
            timestamp: Utc::now(),
            body: body.into(),
            status_code,
            process_time_ms: i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
            error: String::new(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Read-only left join of a request with its response, if any
///
/// Response fields carry defaults (`{}` body, zero status and time, empty
/// error) when no response has been recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLog {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub request_id: RequestId,
    pub ip_address: String,
    pub user_agent: String,
    pub request: Payload,
    pub headers: CapturedHeaders,
    pub response: Payload,
    pub status_code: u16,
    pub process_time_ms: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Aggregate view over the stored records
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AuditStats {
    pub total_requests: i64,
    pub total_responses: i64,
    pub orphaned_requests: i64,
    /// Top methods by request count
    pub methods: BTreeMap<String, i64>,
    /// Top status codes by response count, keyed by the decimal code
    pub status_codes: BTreeMap<String, i64>,
    pub requests_last_hour: i64,
    pub error_count: i64,
    pub error_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_response_time_ms: Option<f64>,
}

impl AuditStats {
    /// Percentage of responses tagged with an error; zero when nothing was recorded
    pub fn error_rate(error_count: i64, total_responses: i64) -> f64 {
        if total_responses > 0 {
            error_count as f64 / total_responses as f64 * 100.0
        } else {
            0.0
        }
    }
}
