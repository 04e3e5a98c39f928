//! HTTP surface of the gateway
//!
//! - Forwarding pipeline on `/rpc` and `/mcp`: capture, forward, record
//! - Read-only audit API and health check

pub mod audit_api;
pub mod error_response;
pub mod forwarder;
pub mod headers;
pub mod middleware;
pub mod pipeline;
pub mod request_metadata;
pub mod service;
pub mod types;

pub use pipeline::AuditPipeline;
pub use service::GatewayService;
pub use types::{ProxyConfig, ProxyError, ProxyResult, UpstreamUrl};
