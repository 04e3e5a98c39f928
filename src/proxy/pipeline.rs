//! Audit-correlated forwarding pipeline
//!
//! Every call follows the same order: assign a request ID, buffer the body,
//! record the request, forward it, record the outcome. Audit writes are
//! awaited but never change what the caller receives.

use crate::domain::event_stream::unwrap_event_stream;
use crate::domain::jsonrpc::extract_method;
use crate::domain::{AuditRequest, AuditResponse, Payload, RequestId};
use crate::infrastructure::{AuditRecorder, StoreError};
use crate::proxy::error_response::{rpc_error_envelope, rpc_error_response, ErrorResponseExt};
use crate::proxy::forwarder::UpstreamForwarder;
use crate::proxy::headers::X_REQUEST_ID;
use crate::proxy::request_metadata::{capture_headers, client_ip, user_agent};
use crate::proxy::types::{ProxyConfig, ProxyError, ProxyResult, RequestSizeLimit};
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderValue, Request};
use axum::response::Response;
use bytes::Bytes;
use chrono::Utc;
use http_body_util::{BodyExt, Limited};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AuditPipeline {
    recorder: Arc<dyn AuditRecorder>,
    forwarder: Option<UpstreamForwarder>,
    max_request_size: RequestSizeLimit,
}

impl AuditPipeline {
    pub fn new(recorder: Arc<dyn AuditRecorder>, config: &ProxyConfig) -> ProxyResult<Self> {
        let forwarder = config
            .upstream
            .as_ref()
            .map(|url| UpstreamForwarder::new(url, config.request_timeout.as_duration()))
            .transpose()?;

        Ok(Self {
            recorder,
            forwarder,
            max_request_size: config.max_request_size,
        })
    }

    pub fn has_upstream(&self) -> bool {
        self.forwarder.is_some()
    }

    pub async fn handle(&self, request: Request<Body>) -> Response {
        let started = Instant::now();
        let timestamp = Utc::now();
        let request_id = RequestId::generate();

        let remote = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let (parts, body) = request.into_parts();

        let body = match self.read_body(body).await {
            Ok(body) => body,
            Err(e) => {
                warn!(%request_id, error = %e, "Rejected unreadable request body");
                return e
                    .to_error_response()
                    .with_request_id(request_id.to_string())
                    .into_response_with_status(e.status_code());
            }
        };

        let ip_address = client_ip(&parts.headers, remote);
        let audit_request = AuditRequest {
            id: None,
            timestamp,
            method: extract_method(&body),
            request_id: request_id.clone(),
            ip_address: ip_address.clone(),
            user_agent: user_agent(&parts.headers),
            body: Payload::from(body.clone()),
            headers: capture_headers(&parts.headers),
        };
        self.record_request(&audit_request).await;

        let Some(forwarder) = &self.forwarder else {
            return self
                .fail(&request_id, ProxyError::NoUpstreamConfigured, started)
                .await;
        };

        let upstream = match forwarder
            .forward(&parts.headers, body, &ip_address, &request_id)
            .await
        {
            Ok(upstream) => upstream,
            Err(e) => return self.fail(&request_id, e, started).await,
        };

        let stored_body = unwrap_event_stream(&upstream.body).into_owned();
        let audit_response = AuditResponse::new(
            request_id.clone(),
            stored_body,
            upstream.status.as_u16(),
            started.elapsed(),
        );
        self.record_response(&audit_response).await;

        info!(
            %request_id,
            method = %audit_request.method,
            status = upstream.status.as_u16(),
            duration_ms = audit_response.process_time_ms,
            "Forwarded JSON-RPC call"
        );

        let mut response = upstream.into_response();
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(X_REQUEST_ID, value);
        }
        response
    }

    async fn read_body(&self, body: Body) -> ProxyResult<Bytes> {
        let limit = self.max_request_size.into_inner();
        Limited::new(body, limit)
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .map_err(|e| {
                if e.is::<http_body_util::LengthLimitError>() {
                    ProxyError::BadInput(format!("request body exceeds {limit} bytes"))
                } else {
                    ProxyError::BadInput(format!("failed to read request body: {e}"))
                }
            })
    }

    /// Record the synthesized error envelope and build the caller's response
    async fn fail(&self, request_id: &RequestId, error: ProxyError, started: Instant) -> Response {
        let envelope = rpc_error_envelope(&error);
        let status = error.status_code();

        let audit_response = AuditResponse::new(
            request_id.clone(),
            envelope.clone(),
            status.as_u16(),
            started.elapsed(),
        )
        .with_error(error.to_string());
        self.record_response(&audit_response).await;

        warn!(
            %request_id,
            status = status.as_u16(),
            error = %error,
            "JSON-RPC call failed"
        );

        rpc_error_response(&error, envelope, request_id)
    }

    async fn record_request(&self, request: &AuditRequest) {
        match self.recorder.insert_request(request).await {
            Ok(_) => {}
            Err(StoreError::DuplicateRequestId(id)) => {
                warn!(request_id = %id, "Duplicate request ID; audit request not stored");
            }
            Err(e) => {
                error!(
                    request_id = %request.request_id,
                    error = %e,
                    "Failed to store audit request"
                );
            }
        }
    }

    async fn record_response(&self, response: &AuditResponse) {
        if let Err(e) = self.recorder.insert_response(response).await {
            error!(
                request_id = %response.request_id,
                error = %e,
                "Failed to store audit response"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuditLog, AuditStats, Page, RecordId};
    use crate::infrastructure::{AuditQuery, SqliteAuditStore};
    use axum::http::StatusCode;
    use std::sync::Mutex;

    /// Recorder that remembers the order of writes and can be told to fail
    #[derive(Default)]
    struct RecordingRecorder {
        writes: Mutex<Vec<String>>,
        fail_requests: bool,
    }

    #[async_trait::async_trait]
    impl AuditRecorder for RecordingRecorder {
        async fn insert_request(&self, request: &AuditRequest) -> Result<RecordId, StoreError> {
            if self.fail_requests {
                return Err(StoreError::DuplicateRequestId(request.request_id.clone()));
            }
            let mut writes = self.writes.lock().unwrap();
            writes.push(format!("request:{}", request.method));
            Ok(RecordId::from(writes.len() as i64))
        }

        async fn insert_response(&self, response: &AuditResponse) -> Result<RecordId, StoreError> {
            let mut writes = self.writes.lock().unwrap();
            writes.push(format!("response:{}", response.status_code));
            Ok(RecordId::from(writes.len() as i64))
        }
    }

    fn rpc_request(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/rpc")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn missing_upstream_records_request_then_503() {
        let recorder = Arc::new(RecordingRecorder::default());
        let pipeline = AuditPipeline::new(recorder.clone(), &ProxyConfig::default()).unwrap();
        assert!(!pipeline.has_upstream());

        let response = pipeline
            .handle(rpc_request(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#))
            .await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["error"]["code"], -32603);

        let writes = recorder.writes.lock().unwrap().clone();
        assert_eq!(writes, vec!["request:ping", "response:503"]);
    }

    #[tokio::test]
    async fn failed_request_write_does_not_block_the_call() {
        let recorder = Arc::new(RecordingRecorder {
            fail_requests: true,
            ..RecordingRecorder::default()
        });
        let pipeline = AuditPipeline::new(recorder.clone(), &ProxyConfig::default()).unwrap();

        let response = pipeline.handle(rpc_request("{}")).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(*recorder.writes.lock().unwrap(), vec!["response:503"]);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_without_audit() {
        let recorder = Arc::new(RecordingRecorder::default());
        let config = ProxyConfig {
            max_request_size: RequestSizeLimit::try_new(8).unwrap(),
            ..ProxyConfig::default()
        };
        let pipeline = AuditPipeline::new(recorder.clone(), &config).unwrap();

        let response = pipeline
            .handle(rpc_request(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(recorder.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn client_ip_comes_from_connect_info() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteAuditStore::open_path(dir.path().join("audit.db"))
                .await
                .unwrap(),
        );
        let pipeline = AuditPipeline::new(store.clone(), &ProxyConfig::default()).unwrap();

        let mut request = rpc_request(r#"{"jsonrpc":"2.0","method":"status","id":7}"#);
        let peer: SocketAddr = "192.0.2.10:40000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        pipeline.handle(request).await;

        let logs: Vec<AuditLog> = store.list_combined_logs(Page::default(), None).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].ip_address, "192.0.2.10");
        assert_eq!(logs[0].method, "status");
        assert_eq!(logs[0].status_code, 503);
        assert_eq!(logs[0].error, "No upstream target configured");

        let stats: AuditStats = store.stats().await.unwrap();
        assert_eq!(stats.orphaned_requests, 0);
    }
}
