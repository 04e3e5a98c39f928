//! Gateway service wiring
//!
//! ```rust,ignore
//! use audit_gateway::proxy::{GatewayService, ProxyConfig};
//!
//! let service = GatewayService::new(audit_log, &ProxyConfig::default())?;
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(
//!     listener,
//!     service
//!         .into_router()
//!         .into_make_service_with_connect_info::<std::net::SocketAddr>(),
//! )
//! .await?;
//! ```

use crate::infrastructure::AuditStore;
use crate::proxy::audit_api;
use crate::proxy::error_response::standard_error_response;
use crate::proxy::headers::paths;
use crate::proxy::middleware::logging_middleware;
use crate::proxy::pipeline::AuditPipeline;
use crate::proxy::types::{ProxyConfig, ProxyResult};
use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware,
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state behind every route
pub struct GatewayState {
    pub pipeline: AuditPipeline,
    pub audit_log: Arc<dyn AuditStore>,
}

/// Forwarding routes plus the audit read API
pub struct GatewayService {
    state: Arc<GatewayState>,
}

impl GatewayService {
    pub fn new<S>(audit_log: Arc<S>, config: &ProxyConfig) -> ProxyResult<Self>
    where
        S: AuditStore + 'static,
    {
        let pipeline = AuditPipeline::new(audit_log.clone(), config)?;
        Ok(Self {
            state: Arc::new(GatewayState {
                pipeline,
                audit_log,
            }),
        })
    }

    pub fn has_upstream(&self) -> bool {
        self.state.pipeline.has_upstream()
    }

    /// Create an Axum router for the gateway with middleware
    pub fn into_router(self) -> Router {
        Router::new()
            .route(paths::RPC, post(proxy_handler).options(proxy_handler))
            .route(paths::MCP, post(proxy_handler).options(proxy_handler))
            .route(paths::AUDIT_LOGS, get(audit_api::list_logs))
            .route(paths::AUDIT_REQUESTS, get(audit_api::list_requests))
            .route(paths::AUDIT_RESPONSES, get(audit_api::list_responses))
            .route(paths::AUDIT_ORPHANED, get(audit_api::list_orphaned))
            .route(paths::AUDIT_STATS, get(audit_api::stats))
            .route(paths::HEALTH, get(audit_api::health))
            .fallback(not_found)
            .with_state(self.state)
            .layer(middleware::from_fn(logging_middleware))
            .layer(TraceLayer::new_for_http())
    }
}

async fn proxy_handler(State(state): State<Arc<GatewayState>>, request: Request<Body>) -> Response {
    state.pipeline.handle(request).await
}

async fn not_found() -> Response {
    standard_error_response(StatusCode::NOT_FOUND, None)
}
