//! Upstream forwarding over a pooled HTTP/1 client, plain or TLS
//!
//! The inbound body is already fully buffered when it reaches this module, so
//! the outbound request carries it verbatim and the upstream response is
//! buffered in full before being handed back.

use crate::domain::RequestId;
use crate::proxy::headers::{
    is_connection_level, GATEWAY_NAME, X_FORWARDED_FOR, X_GATEWAY, X_REQUEST_ID,
};
use crate::proxy::types::{ProxyError, ProxyResult, UpstreamUrl};
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::error::Error as StdError;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

type HttpClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Fully buffered upstream reply
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Caller-facing response with the upstream status, headers and bytes
    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            if !is_connection_level(name.as_str()) {
                headers.append(name.clone(), value.clone());
            }
        }
        response
    }
}

/// Forwards buffered JSON-RPC calls to the single upstream target
#[derive(Clone)]
pub struct UpstreamForwarder {
    client: HttpClient,
    target: Uri,
    timeout: Duration,
}

impl UpstreamForwarder {
    pub fn new(upstream: &UpstreamUrl, timeout: Duration) -> ProxyResult<Self> {
        let target = upstream
            .as_ref()
            .parse::<Uri>()
            .map_err(|e| ProxyError::InvalidConfiguration(format!("upstream url: {e}")))?;

        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(https);

        Ok(Self {
            client,
            target,
            timeout,
        })
    }

    pub fn target(&self) -> &Uri {
        &self.target
    }

    /// POST the body upstream and buffer the reply
    ///
    /// Connect errors and the overall deadline map to
    /// [`ProxyError::TransportFailure`]; a body that breaks off mid-read maps
    /// to [`ProxyError::UpstreamReadFailure`].
    pub async fn forward(
        &self,
        inbound_headers: &HeaderMap,
        body: Bytes,
        client_ip: &str,
        request_id: &RequestId,
    ) -> ProxyResult<UpstreamResponse> {
        let deadline = Instant::now() + self.timeout;
        let request = self.outbound_request(inbound_headers, body, client_ip, request_id);

        let response = timeout_at(deadline, self.client.request(request))
            .await
            .map_err(|_| {
                ProxyError::TransportFailure(format!(
                    "upstream did not respond within {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e| ProxyError::TransportFailure(describe(&e)))?;

        let (parts, body) = response.into_parts();
        debug!(%request_id, status = parts.status.as_u16(), "Upstream responded");

        let body = timeout_at(deadline, body.collect())
            .await
            .map_err(|_| {
                ProxyError::UpstreamReadFailure(format!(
                    "upstream body not received within {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e| ProxyError::UpstreamReadFailure(describe(&e)))?
            .to_bytes();

        Ok(UpstreamResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    fn outbound_request(
        &self,
        inbound_headers: &HeaderMap,
        body: Bytes,
        client_ip: &str,
        request_id: &RequestId,
    ) -> Request<Full<Bytes>> {
        let mut request = Request::new(Full::new(body));
        *request.method_mut() = Method::POST;
        *request.uri_mut() = self.target.clone();

        let headers = request.headers_mut();
        for (name, value) in inbound_headers {
            if !is_connection_level(name.as_str()) {
                headers.append(name.clone(), value.clone());
            }
        }

        if let Ok(value) = HeaderValue::from_str(client_ip) {
            headers.insert(X_FORWARDED_FOR, value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            headers.insert(X_REQUEST_ID, value);
        }
        headers.insert(X_GATEWAY, HeaderValue::from_static(GATEWAY_NAME));

        request
    }
}

/// Error text including every source in the chain
fn describe(error: &(dyn StdError + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn forwarder(url: &str, timeout: Duration) -> UpstreamForwarder {
        let upstream = UpstreamUrl::try_new(url.to_string()).unwrap();
        UpstreamForwarder::new(&upstream, timeout).unwrap()
    }

    fn inbound_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("authorization", HeaderValue::from_static("Bearer caller"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.1"));
        headers.insert("host", HeaderValue::from_static("gateway.example"));
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers
    }

    #[tokio::test]
    async fn forwards_body_and_gateway_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("content-type", "application/json")
            .match_header("authorization", "Bearer caller")
            .match_header("x-forwarded-for", "203.0.113.9")
            .match_header("x-request-id", "req_forwarded")
            .match_header("x-gateway", GATEWAY_NAME)
            .match_header("connection", Matcher::Missing)
            .match_body(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("x-upstream", "yes")
            .with_body(r#"{"jsonrpc":"2.0","result":"pong","id":1}"#)
            .create_async()
            .await;

        let forwarder = forwarder(&server.url(), Duration::from_secs(5));
        let response = forwarder
            .forward(
                &inbound_headers(),
                Bytes::from_static(br#"{"jsonrpc":"2.0","method":"ping","id":1}"#),
                "203.0.113.9",
                &RequestId::new("req_forwarded".to_string()),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.as_ref(), br#"{"jsonrpc":"2.0","result":"pong","id":1}"#);

        let outbound = response.into_response();
        assert_eq!(outbound.headers()["x-upstream"], "yes");
    }

    #[tokio::test]
    async fn upstream_error_status_is_returned_not_raised() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let forwarder = forwarder(&server.url(), Duration::from_secs(5));
        let response = forwarder
            .forward(&HeaderMap::new(), Bytes::from_static(b"{}"), "", &RequestId::generate())
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body.as_ref(), b"boom");
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let forwarder = forwarder(&format!("http://{addr}"), Duration::from_secs(5));
        let err = forwarder
            .forward(&HeaderMap::new(), Bytes::from_static(b"{}"), "", &RequestId::generate())
            .await
            .unwrap_err();

        match err {
            ProxyError::TransportFailure(text) => assert!(!text.is_empty()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_upstream_hits_the_deadline() {
        // Accepts connections (via the backlog) but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let forwarder = forwarder(&format!("http://{addr}"), Duration::from_millis(200));
        let err = forwarder
            .forward(&HeaderMap::new(), Bytes::from_static(b"{}"), "", &RequestId::generate())
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::TransportFailure(_)));
        drop(listener);
    }

    #[test]
    fn https_upstream_builds_a_tls_forwarder() {
        let forwarder = forwarder("https://rpc.example.com/v1", Duration::from_secs(5));
        assert_eq!(forwarder.target().scheme_str(), Some("https"));
        assert_eq!(forwarder.target().path(), "/v1");
    }

    #[test]
    fn hop_by_hop_headers_are_not_returned_to_caller() {
        let mut headers = HeaderMap::new();
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("content-type", HeaderValue::from_static("text/event-stream"));

        let response = UpstreamResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(b"data: {}\n\n"),
        }
        .into_response();

        assert!(response.headers().get("transfer-encoding").is_none());
        assert_eq!(response.headers()["content-type"], "text/event-stream");
    }
}
