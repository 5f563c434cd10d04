use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::types::{
    EventType, HttpMethod, MAX_RETRIES_CEILING, RetryPolicy, WebhookEndpoint,
};
use crate::validator;

#[derive(Debug)]
pub enum StoreError {
    Db(sqlx::Error),
    Validation(String),
    NotFound(String),
    Parse(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err)
    }
}

#[derive(Debug, Clone)]
pub struct NewEndpoint {
    pub name: String,
    pub target_url: String,
    pub method: HttpMethod,
    pub events: Vec<EventType>,
    pub secret: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub is_active: bool,
    pub retry_policy: RetryPolicy,
}

#[derive(Debug, Clone, Default)]
pub struct EndpointPatch {
    pub name: Option<String>,
    pub target_url: Option<String>,
    pub method: Option<HttpMethod>,
    pub events: Option<Vec<EventType>>,
    pub secret: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub retry_policy: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointFilter {
    pub active: Option<bool>,
    pub event_type: Option<EventType>,
}

pub async fn create_endpoint(
    pool: &SqlitePool,
    new: &NewEndpoint,
) -> Result<WebhookEndpoint, StoreError> {
    validate_name(&new.name)?;
    validate_url(&new.target_url)?;
    validate_events(&new.events)?;
    validate_retry_policy(&new.retry_policy)?;

    let id = Uuid::new_v4();
    let now = format_utc(Utc::now());
    let events = serialize_events(&new.events)?;
    let headers = serialize_headers(&new.headers)?;

    sqlx::query(
        r#"
        INSERT INTO endpoints (
            id,
            name,
            target_url,
            method,
            events,
            secret,
            headers,
            is_active,
            max_retries,
            retry_delay_ms,
            backoff_multiplier,
            last_triggered_at,
            created_at,
            updated_at,
            deleted_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, NULL)
        "#,
    )
    .bind(id.to_string())
    .bind(&new.name)
    .bind(&new.target_url)
    .bind(new.method.as_str())
    .bind(&events)
    .bind(new.secret.as_deref())
    .bind(&headers)
    .bind(new.is_active)
    .bind(i64::from(new.retry_policy.max_retries))
    .bind(i64::from(new.retry_policy.retry_delay_ms))
    .bind(new.retry_policy.backoff_multiplier)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_endpoint(pool, id).await
}

pub async fn get_endpoint(pool: &SqlitePool, id: Uuid) -> Result<WebhookEndpoint, StoreError> {
    let row = sqlx::query_as::<_, EndpointRow>(
        r#"
        SELECT
            id,
            name,
            target_url,
            method,
            events,
            secret,
            headers,
            is_active,
            max_retries,
            retry_delay_ms,
            backoff_multiplier,
            last_triggered_at,
            created_at,
            updated_at
        FROM endpoints
        WHERE id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound("endpoint not found".to_string()))?;

    row.try_into()
}

pub async fn list_endpoints(
    pool: &SqlitePool,
    filter: &EndpointFilter,
) -> Result<Vec<WebhookEndpoint>, StoreError> {
    let mut query = sqlx::QueryBuilder::new(
        "SELECT \
            id, \
            name, \
            target_url, \
            method, \
            events, \
            secret, \
            headers, \
            is_active, \
            max_retries, \
            retry_delay_ms, \
            backoff_multiplier, \
            last_triggered_at, \
            created_at, \
            updated_at \
        FROM endpoints \
        WHERE deleted_at IS NULL",
    );

    if let Some(active) = filter.active {
        query.push(" AND is_active = ");
        query.push_bind(active);
    }

    query.push(" ORDER BY created_at ASC, id ASC");

    let rows: Vec<EndpointRow> = query.build_query_as().fetch_all(pool).await?;
    let mut endpoints = Vec::with_capacity(rows.len());
    for row in rows {
        let endpoint: WebhookEndpoint = row.try_into()?;
        // The events column is a JSON array, so the subscription filter is
        // applied after decoding rather than in SQL.
        if let Some(event_type) = filter.event_type {
            if !endpoint.subscribes_to(event_type) {
                continue;
            }
        }
        endpoints.push(endpoint);
    }

    Ok(endpoints)
}

pub async fn update_endpoint(
    pool: &SqlitePool,
    id: Uuid,
    patch: &EndpointPatch,
) -> Result<WebhookEndpoint, StoreError> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, EndpointRow>(
        r#"
        SELECT
            id,
            name,
            target_url,
            method,
            events,
            secret,
            headers,
            is_active,
            max_retries,
            retry_delay_ms,
            backoff_multiplier,
            last_triggered_at,
            created_at,
            updated_at
        FROM endpoints
        WHERE id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| StoreError::NotFound("endpoint not found".to_string()))?;

    let current: WebhookEndpoint = current.try_into()?;

    let name = patch.name.clone().unwrap_or(current.name);
    let target_url = patch.target_url.clone().unwrap_or(current.target_url);
    let method = patch.method.unwrap_or(current.method);
    let events = patch.events.clone().unwrap_or(current.events);
    let secret = patch.secret.clone().or(current.secret);
    let headers = patch.headers.clone().unwrap_or(current.headers);
    let retry_policy = patch.retry_policy.unwrap_or(current.retry_policy);

    validate_name(&name)?;
    if patch.target_url.is_some() {
        validate_url(&target_url)?;
    }
    validate_events(&events)?;
    validate_retry_policy(&retry_policy)?;

    let events_json = serialize_events(&events)?;
    let headers_json = serialize_headers(&headers)?;
    let now = format_utc(Utc::now());

    // Full-row write inside the transaction: concurrent updates are
    // last-writer-wins, never an interleaving of partial field sets.
    sqlx::query(
        r#"
        UPDATE endpoints
        SET name = ?,
            target_url = ?,
            method = ?,
            events = ?,
            secret = ?,
            headers = ?,
            max_retries = ?,
            retry_delay_ms = ?,
            backoff_multiplier = ?,
            updated_at = ?
        WHERE id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(&name)
    .bind(&target_url)
    .bind(method.as_str())
    .bind(&events_json)
    .bind(secret.as_deref())
    .bind(&headers_json)
    .bind(i64::from(retry_policy.max_retries))
    .bind(i64::from(retry_policy.retry_delay_ms))
    .bind(retry_policy.backoff_multiplier)
    .bind(&now)
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    get_endpoint(pool, id).await
}

/// Tombstones the endpoint. Attempt history referencing the id stays
/// queryable; a second delete of the same id reports NotFound.
pub async fn delete_endpoint(pool: &SqlitePool, id: Uuid) -> Result<(), StoreError> {
    let now = format_utc(Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE endpoints
        SET deleted_at = ?,
            is_active = 0,
            updated_at = ?
        WHERE id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(&now)
    .bind(&now)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("endpoint not found".to_string()));
    }

    Ok(())
}

pub async fn set_active(
    pool: &SqlitePool,
    id: Uuid,
    is_active: bool,
) -> Result<WebhookEndpoint, StoreError> {
    let now = format_utc(Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE endpoints
        SET is_active = ?,
            updated_at = ?
        WHERE id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(is_active)
    .bind(&now)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("endpoint not found".to_string()));
    }

    get_endpoint(pool, id).await
}

#[derive(sqlx::FromRow)]
struct EndpointRow {
    id: String,
    name: String,
    target_url: String,
    method: String,
    events: String,
    secret: Option<String>,
    headers: String,
    is_active: bool,
    max_retries: i64,
    retry_delay_ms: i64,
    backoff_multiplier: f64,
    last_triggered_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<EndpointRow> for WebhookEndpoint {
    type Error = StoreError;

    fn try_from(row: EndpointRow) -> Result<Self, Self::Error> {
        let event_names: Vec<String> = serde_json::from_str(&row.events)
            .map_err(|err| StoreError::Parse(format!("invalid events JSON: {err}")))?;
        let mut events = Vec::with_capacity(event_names.len());
        for name in &event_names {
            events.push(
                EventType::parse(name)
                    .ok_or_else(|| StoreError::Parse(format!("unknown event type: {name}")))?,
            );
        }

        let headers: BTreeMap<String, String> = serde_json::from_str(&row.headers)
            .map_err(|err| StoreError::Parse(format!("invalid headers JSON: {err}")))?;

        let method = HttpMethod::parse(&row.method)
            .ok_or_else(|| StoreError::Parse(format!("unknown method: {}", row.method)))?;

        Ok(WebhookEndpoint {
            id: Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid endpoint id: {err}")))?,
            name: row.name,
            target_url: row.target_url,
            method,
            events,
            secret: row.secret,
            headers,
            is_active: row.is_active,
            retry_policy: RetryPolicy {
                max_retries: row.max_retries.clamp(0, i64::from(MAX_RETRIES_CEILING)) as u32,
                retry_delay_ms: row.retry_delay_ms.max(0) as u32,
                backoff_multiplier: row.backoff_multiplier,
            },
            last_triggered_at: row.last_triggered_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::Validation("name is required".to_string()));
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<(), StoreError> {
    let result = validator::validate(url);
    if !result.is_valid {
        return Err(StoreError::Validation(
            result.error.unwrap_or_else(|| "invalid URL".to_string()),
        ));
    }
    Ok(())
}

fn validate_events(events: &[EventType]) -> Result<(), StoreError> {
    if events.is_empty() {
        return Err(StoreError::Validation(
            "at least one subscribed event type is required".to_string(),
        ));
    }
    Ok(())
}

fn validate_retry_policy(policy: &RetryPolicy) -> Result<(), StoreError> {
    if policy.max_retries > MAX_RETRIES_CEILING {
        return Err(StoreError::Validation(format!(
            "max_retries must be <= {MAX_RETRIES_CEILING}"
        )));
    }
    if !policy.backoff_multiplier.is_finite() || policy.backoff_multiplier < 1.0 {
        return Err(StoreError::Validation(
            "backoff_multiplier must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn serialize_events(events: &[EventType]) -> Result<String, StoreError> {
    let names: Vec<&str> = events.iter().map(|event| event.as_str()).collect();
    serde_json::to_string(&names)
        .map_err(|err| StoreError::Parse(format!("invalid events JSON: {err}")))
}

fn serialize_headers(headers: &BTreeMap<String, String>) -> Result<String, StoreError> {
    serde_json::to_string(headers)
        .map_err(|err| StoreError::Parse(format!("invalid headers JSON: {err}")))
}

fn format_utc(dt: chrono::DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
