use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::{
    dispatcher::WebhookEvent,
    error::ApiError,
    extractors::ValidJson,
    state::AppState,
    types::{DispatchResponse, EventType},
};

use super::map_dispatch_error;

/// A business event handed in by another internal service.
#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub event_type: String,
    pub data: serde_json::Value,
}

pub async fn dispatch_event_handler(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<DispatchRequest>,
) -> Result<(StatusCode, Json<DispatchResponse>), ApiError> {
    let event_type = EventType::parse(&req.event_type)
        .ok_or_else(|| ApiError::validation(format!("unknown event type: {}", req.event_type)))?;

    let event = WebhookEvent::new(event_type, req.data);
    let dispatched = state
        .dispatcher
        .dispatch(&event)
        .await
        .map_err(map_dispatch_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DispatchResponse {
            dispatched,
            event_type,
        }),
    ))
}
