//! Primary-plus-secondary audit log
//!
//! The primary store is authoritative: its errors reach the caller and stop the
//! write. The optional telemetry sink only sees records the primary accepted,
//! and its failures are logged and swallowed.

use crate::domain::{AuditLog, AuditRequest, AuditResponse, AuditStats, Page, RecordId};
use crate::infrastructure::audit_store::{AuditQuery, AuditRecorder, AuditStore, StoreError};
use crate::infrastructure::telemetry::TelemetrySink;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct DualWriteAuditLog {
    primary: Arc<dyn AuditStore>,
    secondary: Option<Arc<dyn TelemetrySink>>,
}

impl DualWriteAuditLog {
    pub fn new(primary: Arc<dyn AuditStore>) -> Self {
        Self {
            primary,
            secondary: None,
        }
    }

    pub fn with_secondary(mut self, secondary: Arc<dyn TelemetrySink>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }
}

#[async_trait]
impl AuditRecorder for DualWriteAuditLog {
    async fn insert_request(&self, request: &AuditRequest) -> Result<RecordId, StoreError> {
        let id = self.primary.insert_request(request).await?;

        if let Some(sink) = &self.secondary {
            if let Err(e) = sink.emit_request(request).await {
                warn!(
                    sink = sink.name(),
                    request_id = %request.request_id,
                    error = %e,
                    "Secondary audit write failed for request"
                );
            }
        }

        Ok(id)
    }

    async fn insert_response(&self, response: &AuditResponse) -> Result<RecordId, StoreError> {
        let id = self.primary.insert_response(response).await?;

        if let Some(sink) = &self.secondary {
            if let Err(e) = sink.emit_response(response).await {
                warn!(
                    sink = sink.name(),
                    request_id = %response.request_id,
                    error = %e,
                    "Secondary audit write failed for response"
                );
            }
        }

        Ok(id)
    }
}

#[async_trait]
impl AuditQuery for DualWriteAuditLog {
    async fn list_requests(&self, page: Page) -> Result<Vec<AuditRequest>, StoreError> {
        self.primary.list_requests(page).await
    }

    async fn list_responses(&self, page: Page) -> Result<Vec<AuditResponse>, StoreError> {
        self.primary.list_responses(page).await
    }

    async fn list_orphaned_requests(&self, page: Page) -> Result<Vec<AuditRequest>, StoreError> {
        self.primary.list_orphaned_requests(page).await
    }

    async fn list_combined_logs(
        &self,
        page: Page,
        method: Option<&str>,
    ) -> Result<Vec<AuditLog>, StoreError> {
        self.primary.list_combined_logs(page, method).await
    }

    async fn stats(&self) -> Result<AuditStats, StoreError> {
        self.primary.stats().await
    }
}

#[async_trait]
impl AuditStore for DualWriteAuditLog {
    async fn close(&self) {
        self.primary.close().await;
    }
}
