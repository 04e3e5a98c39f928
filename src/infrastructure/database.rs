//! SQLite-backed audit store
//!
//! Requests and responses live in separate tables joined on `request_id`;
//! the `audit_logs` view provides the combined left-joined shape. WAL journaling
//! plus a busy timeout lets concurrent calls write without the gateway taking
//! any lock of its own.

use crate::config::DatabaseSettings;
use crate::domain::event_stream::unwrap_event_stream;
use crate::domain::{
    AuditLog, AuditRequest, AuditResponse, AuditStats, CapturedHeaders, Page, Payload, RecordId,
    RequestId,
};
use crate::infrastructure::audit_store::{AuditQuery, AuditRecorder, AuditStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audit_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    method TEXT NOT NULL,
    request_id TEXT NOT NULL UNIQUE,
    ip_address TEXT NOT NULL DEFAULT '',
    user_agent TEXT NOT NULL DEFAULT '',
    request BLOB NOT NULL,
    headers TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS audit_responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    response BLOB NOT NULL,
    status_code INTEGER NOT NULL,
    process_time_ms INTEGER NOT NULL,
    error TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_audit_requests_timestamp ON audit_requests(timestamp);
CREATE INDEX IF NOT EXISTS idx_audit_requests_method ON audit_requests(method);
CREATE INDEX IF NOT EXISTS idx_audit_requests_ip_address ON audit_requests(ip_address);

CREATE INDEX IF NOT EXISTS idx_audit_responses_timestamp ON audit_responses(timestamp);
CREATE INDEX IF NOT EXISTS idx_audit_responses_request_id ON audit_responses(request_id);
CREATE INDEX IF NOT EXISTS idx_audit_responses_status_code ON audit_responses(status_code);

CREATE VIEW IF NOT EXISTS audit_logs AS
SELECT
    r.id,
    r.timestamp,
    r.method,
    r.request_id,
    r.ip_address,
    r.user_agent,
    r.request,
    r.headers,
    COALESCE(resp.response, CAST('{}' AS BLOB)) AS response,
    COALESCE(resp.status_code, 0) AS status_code,
    COALESCE(resp.process_time_ms, 0) AS process_time_ms,
    COALESCE(resp.error, '') AS error
FROM audit_requests r
LEFT JOIN audit_responses resp ON r.request_id = resp.request_id;
"#;

const REQUEST_COLUMNS: &str =
    "r.id, r.timestamp, r.method, r.request_id, r.ip_address, r.user_agent, r.request, r.headers";

const TOP_N: i64 = 10;

/// Audit store persisting to a single SQLite database file
#[derive(Clone)]
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    /// Open (creating if missing) the database described by the settings
    pub async fn open(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        Self::open_with(
            &settings.path,
            settings.max_connections,
            Duration::from_millis(settings.busy_timeout_ms),
        )
        .await
    }

    /// Open a database file with default pool settings
    pub async fn open_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let defaults = DatabaseSettings::default();
        Self::open_with(
            path.as_ref(),
            defaults.max_connections,
            Duration::from_millis(defaults.busy_timeout_ms),
        )
        .await
    }

    async fn open_with(
        path: &Path,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        info!(path = %path.display(), "Audit database ready");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    async fn count(&self, sql: &str) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn top_counts(&self, sql: &str) -> Result<BTreeMap<String, i64>, StoreError> {
        let rows = sqlx::query(sql).bind(TOP_N).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<(String, i64), StoreError> {
                Ok((row.try_get("label")?, row.try_get("count")?))
            })
            .collect()
    }
}

fn classify_insert_error(err: sqlx::Error, request_id: &RequestId) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::DuplicateRequestId(request_id.clone())
        }
        _ => StoreError::Storage(err),
    }
}

fn status_from_column(value: i64) -> u16 {
    u16::try_from(value).unwrap_or_default()
}

fn headers_from_column(row: &SqliteRow) -> Result<CapturedHeaders, StoreError> {
    let raw: String = row.try_get("headers")?;
    Ok(serde_json::from_str(&raw)?)
}

fn request_from_row(row: &SqliteRow) -> Result<AuditRequest, StoreError> {
    Ok(AuditRequest {
        id: Some(RecordId::from(row.try_get::<i64, _>("id")?)),
        timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
        method: row.try_get("method")?,
        request_id: RequestId::new(row.try_get::<String, _>("request_id")?),
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        body: Payload::from(row.try_get::<Vec<u8>, _>("request")?),
        headers: headers_from_column(row)?,
    })
}

fn response_from_row(row: &SqliteRow) -> Result<AuditResponse, StoreError> {
    Ok(AuditResponse {
        id: Some(RecordId::from(row.try_get::<i64, _>("id")?)),
        request_id: RequestId::new(row.try_get::<String, _>("request_id")?),
        timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
        body: Payload::from(row.try_get::<Vec<u8>, _>("response")?),
        status_code: status_from_column(row.try_get("status_code")?),
        process_time_ms: row.try_get("process_time_ms")?,
        error: row.try_get("error")?,
    })
}

fn log_from_row(row: &SqliteRow) -> Result<AuditLog, StoreError> {
    Ok(AuditLog {
        id: RecordId::from(row.try_get::<i64, _>("id")?),
        timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
        method: row.try_get("method")?,
        request_id: RequestId::new(row.try_get::<String, _>("request_id")?),
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        request: Payload::from(row.try_get::<Vec<u8>, _>("request")?),
        headers: headers_from_column(row)?,
        response: Payload::from(row.try_get::<Vec<u8>, _>("response")?),
        status_code: status_from_column(row.try_get("status_code")?),
        process_time_ms: row.try_get("process_time_ms")?,
        error: row.try_get("error")?,
    })
}

#[async_trait]
impl AuditRecorder for SqliteAuditStore {
    async fn insert_request(&self, request: &AuditRequest) -> Result<RecordId, StoreError> {
        let headers = serde_json::to_string(&request.headers)?;

        let result = sqlx::query(
            r#"
            INSERT INTO audit_requests (
                timestamp, method, request_id, ip_address, user_agent, request, headers
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.timestamp)
        .bind(request.method.as_str())
        .bind(request.request_id.to_string())
        .bind(request.ip_address.as_str())
        .bind(request.user_agent.as_str())
        .bind(request.body.as_bytes())
        .bind(headers)
        .execute(&self.pool)
        .await
        .map_err(|e| classify_insert_error(e, &request.request_id))?;

        let id = RecordId::from(result.last_insert_rowid());
        debug!(request_id = %request.request_id, id = %id, "Audit request stored");
        Ok(id)
    }

    async fn insert_response(&self, response: &AuditResponse) -> Result<RecordId, StoreError> {
        let body = unwrap_event_stream(response.body.as_bytes());

        let result = sqlx::query(
            r#"
            INSERT INTO audit_responses (
                request_id, timestamp, response, status_code, process_time_ms, error
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(response.request_id.to_string())
        .bind(response.timestamp)
        .bind(body.as_ref())
        .bind(i64::from(response.status_code))
        .bind(response.process_time_ms)
        .bind(response.error.as_str())
        .execute(&self.pool)
        .await?;

        let id = RecordId::from(result.last_insert_rowid());
        debug!(request_id = %response.request_id, id = %id, "Audit response stored");
        Ok(id)
    }
}

#[async_trait]
impl AuditQuery for SqliteAuditStore {
    async fn list_requests(&self, page: Page) -> Result<Vec<AuditRequest>, StoreError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM audit_requests r \
             ORDER BY r.timestamp DESC, r.id DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn list_responses(&self, page: Page) -> Result<Vec<AuditResponse>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, request_id, timestamp, response, status_code, process_time_ms, error
            FROM audit_responses
            ORDER BY timestamp DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(response_from_row).collect()
    }

    async fn list_orphaned_requests(&self, page: Page) -> Result<Vec<AuditRequest>, StoreError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM audit_requests r \
             WHERE NOT EXISTS (SELECT 1 FROM audit_responses resp WHERE resp.request_id = r.request_id) \
             ORDER BY r.timestamp DESC, r.id DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn list_combined_logs(
        &self,
        page: Page,
        method: Option<&str>,
    ) -> Result<Vec<AuditLog>, StoreError> {
        let rows = match method {
            Some(method) => {
                sqlx::query(
                    "SELECT * FROM audit_logs WHERE method = ? \
                     ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
                )
                .bind(method)
                .bind(page.limit())
                .bind(page.offset())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM audit_logs ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
                )
                .bind(page.limit())
                .bind(page.offset())
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(log_from_row).collect()
    }

    async fn stats(&self) -> Result<AuditStats, StoreError> {
        let total_requests = self.count("SELECT COUNT(*) FROM audit_requests").await?;
        let total_responses = self.count("SELECT COUNT(*) FROM audit_responses").await?;
        let orphaned_requests = self
            .count(
                "SELECT COUNT(*) FROM audit_requests r WHERE NOT EXISTS \
                 (SELECT 1 FROM audit_responses resp WHERE resp.request_id = r.request_id)",
            )
            .await?;

        let methods = self
            .top_counts(
                "SELECT method AS label, COUNT(*) AS count FROM audit_requests \
                 GROUP BY method ORDER BY count DESC, method ASC LIMIT ?",
            )
            .await?;
        let status_codes = self
            .top_counts(
                "SELECT CAST(status_code AS TEXT) AS label, COUNT(*) AS count FROM audit_responses \
                 GROUP BY status_code ORDER BY count DESC, status_code ASC LIMIT ?",
            )
            .await?;

        let cutoff = Utc::now() - ChronoDuration::hours(1);
        let requests_last_hour =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audit_requests WHERE timestamp > ?")
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await?;

        let error_count = self
            .count("SELECT COUNT(*) FROM audit_responses WHERE error != ''")
            .await?;

        let avg_response_time_ms = sqlx::query_scalar::<_, Option<f64>>(
            "SELECT AVG(process_time_ms) FROM audit_responses WHERE process_time_ms > 0",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AuditStats {
            total_requests,
            total_responses,
            orphaned_requests,
            methods,
            status_codes,
            requests_last_hour,
            error_count,
            error_rate: AuditStats::error_rate(error_count, total_responses),
            avg_response_time_ms,
        })
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn close(&self) {
        self.pool.close().await;
        info!("Audit database closed");
    }
}
