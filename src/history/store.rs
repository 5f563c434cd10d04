use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::types::{
    Delivery, DeliveryAttempt, DeliveryErrorKind, DeliveryStatus, EventType, WebhookStats,
};

#[derive(Debug)]
pub enum StoreError {
    Db(sqlx::Error),
    NotFound(String),
    Parse(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err)
    }
}

#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub endpoint_id: Uuid,
    pub event_type: EventType,
    pub payload: String,
    pub replayed_from_delivery_id: Option<Uuid>,
}

pub async fn create_delivery(
    pool: &SqlitePool,
    new: &NewDelivery,
) -> Result<Delivery, StoreError> {
    let id = Uuid::new_v4();
    let now = format_utc(Utc::now());

    sqlx::query(
        r#"
        INSERT INTO deliveries (
            id,
            endpoint_id,
            replayed_from_delivery_id,
            event_type,
            payload,
            status,
            attempts,
            last_error,
            created_at,
            updated_at
        )
        VALUES (?, ?, ?, ?, ?, 'pending', 0, NULL, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(new.endpoint_id.to_string())
    .bind(new.replayed_from_delivery_id.map(|id| id.to_string()))
    .bind(new.event_type.as_str())
    .bind(&new.payload)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_delivery(pool, id).await
}

pub async fn get_delivery(pool: &SqlitePool, id: Uuid) -> Result<Delivery, StoreError> {
    let row = sqlx::query_as::<_, DeliveryRow>(
        r#"
        SELECT
            id,
            endpoint_id,
            replayed_from_delivery_id,
            event_type,
            payload,
            status,
            attempts,
            last_error,
            created_at,
            updated_at
        FROM deliveries
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound("delivery not found".to_string()))?;

    row.try_into()
}

#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub delivery_id: Uuid,
    pub endpoint_id: Uuid,
    pub event_type: EventType,
    pub attempt_no: i64,
    pub status: DeliveryStatus,
    pub response_status: Option<i64>,
    pub response_body: Option<String>,
    pub error_kind: Option<DeliveryErrorKind>,
    pub error_message: Option<String>,
    pub duration_ms: i64,
}

/// Appends one attempt and rolls the owning delivery forward in a single
/// transaction. Prior attempt rows are never touched.
pub async fn record_attempt(
    pool: &SqlitePool,
    record: &AttemptRecord,
) -> Result<DeliveryAttempt, StoreError> {
    let attempt_id = Uuid::new_v4();
    let now = format_utc(Utc::now());

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO delivery_attempts (
            id,
            delivery_id,
            endpoint_id,
            event_type,
            attempt_no,
            status,
            response_status,
            response_body,
            error_kind,
            error_message,
            duration_ms,
            created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(attempt_id.to_string())
    .bind(record.delivery_id.to_string())
    .bind(record.endpoint_id.to_string())
    .bind(record.event_type.as_str())
    .bind(record.attempt_no)
    .bind(record.status.as_str())
    .bind(record.response_status)
    .bind(record.response_body.as_deref())
    .bind(record.error_kind.map(DeliveryErrorKind::as_str))
    .bind(record.error_message.as_deref())
    .bind(record.duration_ms)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE deliveries
        SET status = ?,
            attempts = ?,
            last_error = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(record.status.as_str())
    .bind(record.attempt_no)
    .bind(record.error_message.as_deref())
    .bind(&now)
    .bind(record.delivery_id.to_string())
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE endpoints SET last_triggered_at = ? WHERE id = ?")
        .bind(&now)
        .bind(record.endpoint_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    get_attempt(pool, attempt_id).await
}

/// Terminates a delivery without writing an attempt row. Used when a retry
/// sequence is abandoned (endpoint deactivated or deleted mid-backoff).
pub async fn abandon_delivery(
    pool: &SqlitePool,
    delivery_id: Uuid,
    reason: &str,
) -> Result<(), StoreError> {
    let now = format_utc(Utc::now());
    sqlx::query(
        r#"
        UPDATE deliveries
        SET status = 'failed',
            last_error = ?,
            updated_at = ?
        WHERE id = ? AND status NOT IN ('delivered', 'failed')
        "#,
    )
    .bind(reason)
    .bind(&now)
    .bind(delivery_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_attempt(pool: &SqlitePool, id: Uuid) -> Result<DeliveryAttempt, StoreError> {
    let row = sqlx::query_as::<_, AttemptRow>(
        r#"
        SELECT
            id,
            delivery_id,
            endpoint_id,
            event_type,
            attempt_no,
            status,
            response_status,
            response_body,
            error_kind,
            error_message,
            duration_ms,
            created_at
        FROM delivery_attempts
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound("attempt not found".to_string()))?;

    row.try_into()
}

/// Most recent attempts for an endpoint, newest first.
pub async fn list_attempts(
    pool: &SqlitePool,
    endpoint_id: Uuid,
    limit: i64,
) -> Result<Vec<DeliveryAttempt>, StoreError> {
    let rows: Vec<AttemptRow> = sqlx::query_as(
        r#"
        SELECT
            id,
            delivery_id,
            endpoint_id,
            event_type,
            attempt_no,
            status,
            response_status,
            response_body,
            error_kind,
            error_message,
            duration_ms,
            created_at
        FROM delivery_attempts
        WHERE endpoint_id = ?
        ORDER BY created_at DESC, attempt_no DESC
        LIMIT ?
        "#,
    )
    .bind(endpoint_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AttemptRow::try_into).collect()
}

/// Rollups over delivery occurrences; `endpoint_id = None` aggregates
/// globally. Average response time is computed over attempts that got an
/// HTTP response.
pub async fn stats(
    pool: &SqlitePool,
    endpoint_id: Option<Uuid>,
) -> Result<WebhookStats, StoreError> {
    let mut totals = sqlx::QueryBuilder::new(
        "SELECT \
            COUNT(*) AS total, \
            COALESCE(SUM(status = 'delivered'), 0) AS delivered, \
            COALESCE(SUM(status = 'failed'), 0) AS failed, \
            COALESCE(SUM(status IN ('pending', 'retrying')), 0) AS pending \
        FROM deliveries",
    );
    if let Some(id) = endpoint_id {
        totals.push(" WHERE endpoint_id = ");
        totals.push_bind(id.to_string());
    }
    let totals: TotalsRow = totals.build_query_as().fetch_one(pool).await?;

    let mut avg = sqlx::QueryBuilder::new(
        "SELECT AVG(duration_ms) AS avg_duration \
        FROM delivery_attempts \
        WHERE response_status IS NOT NULL",
    );
    if let Some(id) = endpoint_id {
        avg.push(" AND endpoint_id = ");
        avg.push_bind(id.to_string());
    }
    let avg: AvgRow = avg.build_query_as().fetch_one(pool).await?;

    let delivery_rate = if totals.total > 0 {
        totals.delivered as f64 / totals.total as f64
    } else {
        0.0
    };

    Ok(WebhookStats {
        total_deliveries: totals.total,
        successful_deliveries: totals.delivered,
        failed_deliveries: totals.failed,
        pending_deliveries: totals.pending,
        delivery_rate,
        average_response_time_ms: avg.avg_duration,
    })
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: String,
    endpoint_id: String,
    replayed_from_delivery_id: Option<String>,
    event_type: String,
    payload: String,
    status: String,
    attempts: i64,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<DeliveryRow> for Delivery {
    type Error = StoreError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        let replayed_from_delivery_id = match row.replayed_from_delivery_id {
            Some(raw) => Some(
                Uuid::parse_str(&raw)
                    .map_err(|err| StoreError::Parse(format!("invalid delivery id: {err}")))?,
            ),
            None => None,
        };

        Ok(Delivery {
            id: Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid delivery id: {err}")))?,
            endpoint_id: Uuid::parse_str(&row.endpoint_id)
                .map_err(|err| StoreError::Parse(format!("invalid endpoint id: {err}")))?,
            replayed_from_delivery_id,
            event_type: parse_event_type(&row.event_type)?,
            payload: row.payload,
            status: parse_status(&row.status)?,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: String,
    delivery_id: String,
    endpoint_id: String,
    event_type: String,
    attempt_no: i64,
    status: String,
    response_status: Option<i64>,
    response_body: Option<String>,
    error_kind: Option<String>,
    error_message: Option<String>,
    duration_ms: i64,
    created_at: String,
}

impl TryFrom<AttemptRow> for DeliveryAttempt {
    type Error = StoreError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let error_kind = match row.error_kind.as_deref() {
            Some(raw) => Some(
                DeliveryErrorKind::parse(raw)
                    .ok_or_else(|| StoreError::Parse(format!("unknown error kind: {raw}")))?,
            ),
            None => None,
        };

        Ok(DeliveryAttempt {
            id: Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid attempt id: {err}")))?,
            delivery_id: Uuid::parse_str(&row.delivery_id)
                .map_err(|err| StoreError::Parse(format!("invalid delivery id: {err}")))?,
            endpoint_id: Uuid::parse_str(&row.endpoint_id)
                .map_err(|err| StoreError::Parse(format!("invalid endpoint id: {err}")))?,
            event_type: parse_event_type(&row.event_type)?,
            attempt_no: row.attempt_no,
            status: parse_status(&row.status)?,
            response_status: row.response_status,
            response_body: row.response_body,
            error_kind,
            error_message: row.error_message,
            duration_ms: row.duration_ms,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TotalsRow {
    total: i64,
    delivered: i64,
    failed: i64,
    pending: i64,
}

#[derive(sqlx::FromRow)]
struct AvgRow {
    avg_duration: Option<f64>,
}

fn parse_status(status: &str) -> Result<DeliveryStatus, StoreError> {
    DeliveryStatus::parse(status)
        .ok_or_else(|| StoreError::Parse(format!("unknown status: {status}")))
}

fn parse_event_type(event_type: &str) -> Result<EventType, StoreError> {
    EventType::parse(event_type)
        .ok_or_else(|| StoreError::Parse(format!("unknown event type: {event_type}")))
}

fn format_utc(dt: chrono::DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
