//! Persistence contracts for audit records
//!
//! Writes and reads are separate capabilities: the must-succeed store offers
//! both, while telemetry sinks (see [`crate::infrastructure::telemetry`]) only
//! accept fire-and-forget writes.

use crate::domain::{AuditLog, AuditRequest, AuditResponse, AuditStats, Page, RecordId, RequestId};
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by audit persistence backends
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate request ID: {0}")]
    DuplicateRequestId(RequestId),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{operation} is not supported by the {backend} backend")]
    NotImplemented {
        backend: &'static str,
        operation: &'static str,
    },
}

/// Durable write path for audit records
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    /// Store a request, failing with [`StoreError::DuplicateRequestId`] on a key collision
    async fn insert_request(&self, request: &AuditRequest) -> Result<RecordId, StoreError>;

    /// Store a response; the matching request does not need to be visible yet
    async fn insert_response(&self, response: &AuditResponse) -> Result<RecordId, StoreError>;
}

/// Read path over stored audit records, newest first
#[async_trait]
pub trait AuditQuery: Send + Sync {
    async fn list_requests(&self, page: Page) -> Result<Vec<AuditRequest>, StoreError>;

    async fn list_responses(&self, page: Page) -> Result<Vec<AuditResponse>, StoreError>;

    /// Requests that have no response recorded under their request ID
    async fn list_orphaned_requests(&self, page: Page) -> Result<Vec<AuditRequest>, StoreError>;

    /// Requests left-joined with their responses, optionally filtered by exact method
    async fn list_combined_logs(
        &self,
        page: Page,
        method: Option<&str>,
    ) -> Result<Vec<AuditLog>, StoreError>;

    async fn stats(&self) -> Result<AuditStats, StoreError>;
}

/// Must-succeed store: writes, reads, and releasable resources
#[async_trait]
pub trait AuditStore: AuditRecorder + AuditQuery {
    async fn close(&self);
}
