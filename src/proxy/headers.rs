//! HTTP header constants and utilities for the proxy service

use ::http::header;

/// Client address chain; the first entry is the original caller
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Single client address set by some reverse proxies
pub const X_REAL_IP: &str = "x-real-ip";

/// Header name for request ID used for tracing and correlation
pub const X_REQUEST_ID: &str = "x-request-id";

/// Marks traffic that passed through the gateway
pub const X_GATEWAY: &str = "x-gateway";

/// Value sent in [`X_GATEWAY`]
pub const GATEWAY_NAME: &str = "jsonrpc-audit-gateway";

/// Standard header re-exports for convenience
pub use header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, USER_AGENT};

/// Headers scoped to a single connection (RFC 9110 §7.6.1) plus the ones the
/// client recomputes
const CONNECTION_LEVEL: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Whether a header must not be copied between the inbound and outbound legs
pub fn is_connection_level(name: &str) -> bool {
    CONNECTION_LEVEL
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// Well-known paths
pub mod paths {
    pub const RPC: &str = "/rpc";
    pub const MCP: &str = "/mcp";
    pub const HEALTH: &str = "/health";
    pub const AUDIT_LOGS: &str = "/audit/logs";
    pub const AUDIT_REQUESTS: &str = "/audit/requests";
    pub const AUDIT_RESPONSES: &str = "/audit/responses";
    pub const AUDIT_ORPHANED: &str = "/audit/orphaned";
    pub const AUDIT_STATS: &str = "/audit/stats";
}
