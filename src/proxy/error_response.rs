//! Unified error response handling for the proxy service
//!
//! Two shapes leave the gateway: JSON-RPC error envelopes on the forwarding
//! routes, and the standard `{code, message, request_id}` body on the read
//! API. Both carry the request ID header when one is known.

use crate::domain::jsonrpc::JsonRpcErrorResponse;
use crate::domain::RequestId;
use crate::infrastructure::StoreError;
use crate::proxy::headers::{CONTENT_TYPE, X_REQUEST_ID};
use crate::proxy::types::ProxyError;
use axum::{
    body::Body,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Standard error response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Unique error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Request ID for correlation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Convert to HTTP response with proper headers
    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        let request_id = self.request_id.clone();
        let mut response = (status, Json(self)).into_response();

        if let Some(id) = request_id {
            attach_request_id(&mut response, &id);
        }

        response
    }
}

/// Extension trait for consistent error formatting
pub trait ErrorResponseExt {
    /// Convert to standardized error response
    fn to_error_response(&self) -> ErrorResponse;

    /// Get the appropriate HTTP status code
    fn status_code(&self) -> StatusCode;
}

impl ErrorResponseExt for ProxyError {
    fn to_error_response(&self) -> ErrorResponse {
        use ProxyError::*;

        let code = match self {
            BadInput(_) => "BAD_REQUEST",
            NoUpstreamConfigured => "NO_UPSTREAM",
            TransportFailure(_) => "BAD_GATEWAY",
            UpstreamReadFailure(_) => "UPSTREAM_READ_FAILURE",
            InvalidConfiguration(_) => "INVALID_CONFIGURATION",
        };
        ErrorResponse::new(code, self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        ProxyError::status_code(self)
    }
}

impl ErrorResponseExt for StoreError {
    fn to_error_response(&self) -> ErrorResponse {
        let code = match self {
            StoreError::DuplicateRequestId(_) => "DUPLICATE_REQUEST_ID",
            StoreError::Storage(_) => "STORAGE_ERROR",
            StoreError::Serialization(_) => "SERIALIZATION_ERROR",
            StoreError::NotImplemented { .. } => "NOT_IMPLEMENTED",
        };
        ErrorResponse::new(code, self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = ErrorResponseExt::status_code(&self);
        self.to_error_response().into_response_with_status(status)
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = ErrorResponseExt::status_code(&self);
        self.to_error_response().into_response_with_status(status)
    }
}

/// Response for a failed forwarding call
///
/// Transport failures get a bare status; every other failure carries the
/// JSON-RPC error envelope that was also written to the audit trail.
pub fn rpc_error_response(error: &ProxyError, envelope: Bytes, request_id: &RequestId) -> Response {
    let status = ProxyError::status_code(error);
    let mut response = match error {
        ProxyError::TransportFailure(_) => Response::new(Body::empty()),
        _ => {
            let mut response = Response::new(Body::from(envelope));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
    };
    *response.status_mut() = status;
    attach_request_id(&mut response, &request_id.to_string());
    response
}

/// Envelope bytes describing a forwarding failure
pub fn rpc_error_envelope(error: &ProxyError) -> Bytes {
    JsonRpcErrorResponse::internal_error(error.to_string()).to_bytes()
}

fn attach_request_id(response: &mut Response, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
}

/// Create an error response for common HTTP errors
pub fn standard_error_response(status: StatusCode, request_id: Option<&str>) -> Response {
    let (code, message) = match status {
        StatusCode::BAD_REQUEST => ("BAD_REQUEST", "Invalid request"),
        StatusCode::NOT_FOUND => ("NOT_FOUND", "Resource not found"),
        StatusCode::METHOD_NOT_ALLOWED => ("METHOD_NOT_ALLOWED", "Method not allowed"),
        StatusCode::INTERNAL_SERVER_ERROR => ("INTERNAL_ERROR", "Internal server error"),
        StatusCode::BAD_GATEWAY => ("BAD_GATEWAY", "Upstream service error"),
        StatusCode::SERVICE_UNAVAILABLE => {
            ("SERVICE_UNAVAILABLE", "Service temporarily unavailable")
        }
        _ => ("ERROR", "An error occurred"),
    };

    let mut error = ErrorResponse::new(code, message);
    if let Some(id) = request_id {
        error = error.with_request_id(id);
    }

    error.into_response_with_status(status)
}
