//! Infrastructure layer for the audit gateway
//!
//! Persistence backends for audit records and the coordinator that writes to
//! both of them.

pub mod audit_store;
pub mod database;
pub mod dual_write;
pub mod telemetry;

pub use audit_store::{AuditQuery, AuditRecorder, AuditStore, StoreError};
pub use database::SqliteAuditStore;
pub use dual_write::DualWriteAuditLog;
pub use telemetry::{TelemetryError, TelemetrySink, TinybirdSink};
