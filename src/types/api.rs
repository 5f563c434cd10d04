use serde::{Deserialize, Serialize};
use specta::Type;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{
    Delivery, DeliveryAttempt, EventType, HttpMethod, RetryPolicy, WebhookEndpoint,
};

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct CreateWebhookRequest {
    pub name: String,
    pub target_url: String,
    pub method: Option<HttpMethod>,
    pub events: Vec<EventType>,
    pub secret: Option<String>,
    /// When true and no secret is supplied, the server mints one.
    pub generate_secret: Option<bool>,
    pub headers: Option<BTreeMap<String, String>>,
    pub is_active: Option<bool>,
    pub retry_policy: Option<RetryPolicy>,
}

/// Partial update; absent fields keep their current value. Secrets can be
/// replaced but not cleared through this surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Type)]
pub struct UpdateWebhookRequest {
    pub name: Option<String>,
    pub target_url: Option<String>,
    pub method: Option<HttpMethod>,
    pub events: Option<Vec<EventType>>,
    pub secret: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub retry_policy: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct WebhookResponse {
    pub webhook: WebhookEndpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ListWebhooksResponse {
    pub webhooks: Vec<WebhookEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct WebhookLogsResponse {
    pub logs: Vec<DeliveryAttempt>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct TestWebhookResponse {
    pub success: bool,
    pub response_status: Option<i64>,
    pub response_time_ms: i64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ValidateUrlRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ValidateUrlResponse {
    pub is_valid: bool,
    /// None when the URL failed syntactic validation and no probe was made.
    pub is_reachable: Option<bool>,
    pub latency_ms: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct RetryDeliveryResponse {
    /// The fresh occurrence started by the manual retry.
    pub delivery: Delivery,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct DispatchResponse {
    /// Number of endpoints the event was fanned out to.
    pub dispatched: i64,
    pub event_type: EventType,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct DeleteWebhookResponse {
    pub deleted: bool,
    pub id: Uuid,
}
