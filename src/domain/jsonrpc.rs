//! Minimal JSON-RPC 2.0 envelope handling
//!
//! The gateway never interprets calls; it only peeks at the method name for
//! indexing and synthesizes error envelopes when it cannot reach upstream.

use crate::domain::audit::UNKNOWN_METHOD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC code for an internal error
pub const INTERNAL_ERROR_CODE: i64 = -32603;

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal error";

const FALLBACK_INTERNAL_ERROR: &[u8] =
    br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;

#[derive(Deserialize)]
struct MethodProbe {
    #[serde(default)]
    method: Option<String>,
}

/// Method name of a JSON-RPC request body, or `"unknown"`
///
/// Batches, non-object bodies, non-string methods and empty names all map to
/// the sentinel.
pub fn extract_method(body: &[u8]) -> String {
    serde_json::from_slice::<MethodProbe>(body)
        .ok()
        .and_then(|probe| probe.method)
        .filter(|method| !method.is_empty())
        .unwrap_or_else(|| UNKNOWN_METHOD.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub error: JsonRpcError,
}

impl JsonRpcErrorResponse {
    /// `-32603 Internal error` envelope carrying a failure description
    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: serde_json::Value::Null,
            error: JsonRpcError {
                code: INTERNAL_ERROR_CODE,
                message: INTERNAL_ERROR_MESSAGE.to_string(),
                data: Some(serde_json::Value::String(detail.into())),
            },
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .unwrap_or_else(|_| Bytes::from_static(FALLBACK_INTERNAL_ERROR))
    }
}
