//! Read-only HTTP API over the audit trail

use crate::domain::Page;
use crate::infrastructure::StoreError;
use crate::proxy::service::GatewayState;
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Raw listing query; values are parsed leniently into a [`Page`]
#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub method: Option<String>,
}

impl ListingQuery {
    pub fn page(&self) -> Page {
        Page::from_query(self.limit.as_deref(), self.offset.as_deref())
    }

    fn method(&self) -> Option<&str> {
        self.method
            .as_deref()
            .map(str::trim)
            .filter(|method| !method.is_empty())
    }
}

/// `{<key>: [...], limit, offset, count}`
fn listing<T: Serialize>(key: &str, items: Vec<T>, page: Page) -> Result<Json<Value>, StoreError> {
    let count = items.len();
    let mut body = Map::new();
    body.insert(key.to_string(), serde_json::to_value(items)?);
    body.insert("limit".to_string(), Value::from(page.limit()));
    body.insert("offset".to_string(), Value::from(page.offset()));
    body.insert("count".to_string(), Value::from(count));
    Ok(Json(Value::Object(body)))
}

pub async fn list_logs(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Value>, StoreError> {
    let page = query.page();
    let logs = state
        .audit_log
        .list_combined_logs(page, query.method())
        .await?;
    listing("logs", logs, page)
}

pub async fn list_requests(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Value>, StoreError> {
    let page = query.page();
    let requests = state.audit_log.list_requests(page).await?;
    listing("requests", requests, page)
}

pub async fn list_responses(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Value>, StoreError> {
    let page = query.page();
    let responses = state.audit_log.list_responses(page).await?;
    listing("responses", responses, page)
}

pub async fn list_orphaned(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Value>, StoreError> {
    let page = query.page();
    let orphaned = state.audit_log.list_orphaned_requests(page).await?;
    listing("orphaned_requests", orphaned, page)
}

pub async fn stats(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<crate::domain::AuditStats>, StoreError> {
    Ok(Json(state.audit_log.stats().await?))
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: chrono::DateTime<Utc>,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
