use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::{
    error::ApiError,
    extractors::{ValidJson, ValidPath, ValidQuery},
    history,
    registry::{self, EndpointFilter, EndpointPatch, NewEndpoint},
    signer,
    state::AppState,
    types::{
        CreateWebhookRequest, DeleteWebhookResponse, EventType, HttpMethod,
        ListWebhooksResponse, RetryDeliveryResponse, SetActiveRequest, TestWebhookResponse,
        UpdateWebhookRequest, ValidateUrlRequest, ValidateUrlResponse, WebhookLogsResponse,
        WebhookResponse, WebhookStats,
    },
    validator,
};

use super::{map_dispatch_error, map_history_error, map_store_error, parse_uuid};

pub async fn create_webhook_handler(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<WebhookResponse>), ApiError> {
    let secret = match req.secret {
        Some(secret) => Some(secret),
        None if req.generate_secret.unwrap_or(false) => Some(signer::generate_secret()),
        None => None,
    };
    let new = NewEndpoint {
        name: req.name,
        target_url: req.target_url,
        method: req.method.unwrap_or(HttpMethod::Post),
        events: req.events,
        secret,
        headers: req.headers.unwrap_or_default(),
        is_active: req.is_active.unwrap_or(true),
        retry_policy: req.retry_policy.unwrap_or_default(),
    };

    let webhook = registry::create_endpoint(&state.pool, &new)
        .await
        .map_err(map_store_error)?;

    Ok((StatusCode::CREATED, Json(WebhookResponse { webhook })))
}

#[derive(Debug, Deserialize)]
pub struct ListWebhooksQuery {
    active: Option<bool>,
    event_type: Option<String>,
}

pub async fn list_webhooks_handler(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ListWebhooksQuery>,
) -> Result<Json<ListWebhooksResponse>, ApiError> {
    let event_type = match query.event_type.as_deref() {
        Some(raw) => Some(parse_event_type(raw)?),
        None => None,
    };
    let filter = EndpointFilter {
        active: query.active,
        event_type,
    };

    let webhooks = registry::list_endpoints(&state.pool, &filter)
        .await
        .map_err(map_store_error)?;

    Ok(Json(ListWebhooksResponse { webhooks }))
}

pub async fn get_webhook_handler(
    State(state): State<AppState>,
    ValidPath(webhook_id): ValidPath<String>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let webhook_id = parse_uuid("webhook_id", &webhook_id)?;
    let webhook = registry::get_endpoint(&state.pool, webhook_id)
        .await
        .map_err(map_store_error)?;

    Ok(Json(WebhookResponse { webhook }))
}

pub async fn update_webhook_handler(
    State(state): State<AppState>,
    ValidPath(webhook_id): ValidPath<String>,
    ValidJson(req): ValidJson<UpdateWebhookRequest>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let webhook_id = parse_uuid("webhook_id", &webhook_id)?;
    let patch = EndpointPatch {
        name: req.name,
        target_url: req.target_url,
        method: req.method,
        events: req.events,
        secret: req.secret,
        headers: req.headers,
        retry_policy: req.retry_policy,
    };

    let webhook = registry::update_endpoint(&state.pool, webhook_id, &patch)
        .await
        .map_err(map_store_error)?;

    Ok(Json(WebhookResponse { webhook }))
}

pub async fn delete_webhook_handler(
    State(state): State<AppState>,
    ValidPath(webhook_id): ValidPath<String>,
) -> Result<Json<DeleteWebhookResponse>, ApiError> {
    let webhook_id = parse_uuid("webhook_id", &webhook_id)?;
    registry::delete_endpoint(&state.pool, webhook_id)
        .await
        .map_err(map_store_error)?;
    // Tombstone first, then wake sleeping retry tasks so they observe it.
    state.dispatcher.cancel_endpoint(webhook_id).await;

    Ok(Json(DeleteWebhookResponse {
        deleted: true,
        id: webhook_id,
    }))
}

pub async fn set_active_handler(
    State(state): State<AppState>,
    ValidPath(webhook_id): ValidPath<String>,
    ValidJson(req): ValidJson<SetActiveRequest>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let webhook_id = parse_uuid("webhook_id", &webhook_id)?;
    let webhook = registry::set_active(&state.pool, webhook_id, req.is_active)
        .await
        .map_err(map_store_error)?;
    if !req.is_active {
        state.dispatcher.cancel_endpoint(webhook_id).await;
    }

    Ok(Json(WebhookResponse { webhook }))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    limit: Option<i64>,
}

pub async fn webhook_logs_handler(
    State(state): State<AppState>,
    ValidPath(webhook_id): ValidPath<String>,
    ValidQuery(query): ValidQuery<LogsQuery>,
) -> Result<Json<WebhookLogsResponse>, ApiError> {
    let webhook_id = parse_uuid("webhook_id", &webhook_id)?;
    let limit = parse_limit(query.limit)?;

    registry::get_endpoint(&state.pool, webhook_id)
        .await
        .map_err(map_store_error)?;
    let logs = history::list_attempts(&state.pool, webhook_id, limit)
        .await
        .map_err(map_history_error)?;

    Ok(Json(WebhookLogsResponse { logs }))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    endpoint_id: Option<String>,
}

pub async fn webhook_stats_handler(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<StatsQuery>,
) -> Result<Json<WebhookStats>, ApiError> {
    let endpoint_id = match query.endpoint_id.as_deref() {
        Some(raw) => Some(parse_uuid("endpoint_id", raw)?),
        None => None,
    };

    let stats = history::stats(&state.pool, endpoint_id)
        .await
        .map_err(map_history_error)?;

    Ok(Json(stats))
}

pub async fn test_webhook_handler(
    State(state): State<AppState>,
    ValidPath(webhook_id): ValidPath<String>,
) -> Result<Json<TestWebhookResponse>, ApiError> {
    let webhook_id = parse_uuid("webhook_id", &webhook_id)?;
    let result = state
        .dispatcher
        .test_webhook(webhook_id)
        .await
        .map_err(map_dispatch_error)?;

    Ok(Json(result))
}

pub async fn validate_url_handler(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ValidateUrlRequest>,
) -> Result<Json<ValidateUrlResponse>, ApiError> {
    let syntax = validator::validate(&req.url);
    if !syntax.is_valid {
        return Ok(Json(ValidateUrlResponse {
            is_valid: false,
            is_reachable: None,
            latency_ms: None,
            error: syntax.error,
        }));
    }

    let probe = state.diagnostics.probe_url(&req.url).await;
    Ok(Json(ValidateUrlResponse {
        is_valid: true,
        is_reachable: Some(probe.is_reachable),
        latency_ms: probe.latency_ms,
        error: probe.error,
    }))
}

pub async fn retry_delivery_handler(
    State(state): State<AppState>,
    ValidPath(attempt_id): ValidPath<String>,
) -> Result<(StatusCode, Json<RetryDeliveryResponse>), ApiError> {
    let attempt_id = parse_uuid("attempt_id", &attempt_id)?;
    let delivery = state
        .dispatcher
        .retry_failed_delivery(attempt_id)
        .await
        .map_err(map_dispatch_error)?;

    Ok((StatusCode::ACCEPTED, Json(RetryDeliveryResponse { delivery })))
}

fn parse_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(50);
    if !(1..=200).contains(&limit) {
        return Err(ApiError::validation("limit must be between 1 and 200"));
    }
    Ok(limit)
}

fn parse_event_type(raw: &str) -> Result<EventType, ApiError> {
    EventType::parse(raw)
        .ok_or_else(|| ApiError::validation(format!("unknown event type: {raw}")))
}
