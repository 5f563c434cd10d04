use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dispatcher::DispatcherConfig;
use crate::history::{self, AttemptRecord, NewDelivery};
use crate::registry::{self, EndpointFilter};
use crate::signer;
use crate::types::{
    Delivery, DeliveryErrorKind, DeliveryStatus, EventType, HttpMethod, RetryPolicy,
    TestWebhookResponse, WebhookEndpoint,
};

pub const USER_AGENT: &str = "relay-webhook/1.0";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("storage error: {0}")]
    Store(String),
}

impl From<registry::StoreError> for DispatchError {
    fn from(err: registry::StoreError) -> Self {
        match err {
            registry::StoreError::Db(db) => Self::Db(db),
            registry::StoreError::NotFound(message) => Self::NotFound(message),
            registry::StoreError::Validation(message) | registry::StoreError::Parse(message) => {
                Self::Store(message)
            }
        }
    }
}

impl From<history::StoreError> for DispatchError {
    fn from(err: history::StoreError) -> Self {
        match err {
            history::StoreError::Db(db) => Self::Db(db),
            history::StoreError::NotFound(message) => Self::NotFound(message),
            history::StoreError::Parse(message) => Self::Store(message),
        }
    }
}

/// A business event handed in by a producer, in its wire shape.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub event: EventType,
    pub timestamp: String,
    pub data: serde_json::Value,
    pub webhook_version: &'static str,
}

impl WebhookEvent {
    pub fn new(event: EventType, data: serde_json::Value) -> Self {
        Self {
            event,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            data,
            webhook_version: "1.0",
        }
    }
}

/// Shared outbound HTTP client; one per process, reused by the dispatcher
/// and the diagnostics probes.
pub fn build_client(config: &DispatcherConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .user_agent(USER_AGENT)
        .build()
}

/// Backoff slept after failed attempt `attempt_no` before the next one:
/// `retry_delay * multiplier^(attempt_no - 1)`, capped at `max_backoff_ms`.
pub fn backoff_delay(policy: &RetryPolicy, attempt_no: i64, max_backoff_ms: u64) -> Duration {
    let exponent = (attempt_no - 1).clamp(0, 31) as i32;
    let delay = f64::from(policy.retry_delay_ms) * policy.backoff_multiplier.powi(exponent);
    Duration::from_millis(delay.min(max_backoff_ms as f64).round() as u64)
}

/// Fans events out to subscribed endpoints and drives each retry sequence on
/// its own task. Cheap to clone; all state is behind one `Arc`.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    pool: SqlitePool,
    client: reqwest::Client,
    config: DispatcherConfig,
    cancellations: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl Dispatcher {
    pub fn new(pool: SqlitePool, client: reqwest::Client, config: DispatcherConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                client,
                config,
                cancellations: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    /// Fan an event out to every active endpoint subscribed to its type.
    /// Creates the delivery rows synchronously, then spawns one task per
    /// endpoint; the producer never waits for delivery outcomes.
    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<i64, DispatchError> {
        let filter = EndpointFilter {
            active: Some(true),
            event_type: Some(event.event),
        };
        let endpoints = registry::list_endpoints(&self.inner.pool, &filter).await?;
        let payload = serde_json::to_string(event)?;

        for endpoint in &endpoints {
            let delivery = history::create_delivery(
                &self.inner.pool,
                &NewDelivery {
                    endpoint_id: endpoint.id,
                    event_type: event.event,
                    payload: payload.clone(),
                    replayed_from_delivery_id: None,
                },
            )
            .await?;

            debug!(
                endpoint_id = %endpoint.id,
                delivery_id = %delivery.id,
                event = %event.event,
                "dispatching event"
            );
            self.spawn_delivery(endpoint.clone(), delivery).await;
        }

        Ok(endpoints.len() as i64)
    }

    /// One synthetic send, no retries, nothing recorded. Used by the
    /// interactive "Test" action; the raw outcome goes straight back to the
    /// caller.
    pub async fn test_webhook(
        &self,
        endpoint_id: Uuid,
    ) -> Result<TestWebhookResponse, DispatchError> {
        let endpoint = registry::get_endpoint(&self.inner.pool, endpoint_id).await?;
        let event = WebhookEvent::new(
            EventType::WebhookTest,
            serde_json::json!({
                "message": "test delivery",
                "test_id": format!("test_{}", Uuid::new_v4()),
            }),
        );
        let payload = serde_json::to_string(&event)?;

        let outcome = self
            .attempt_once(&endpoint, event.event, &payload, Uuid::new_v4(), 1)
            .await;

        let success = outcome
            .response_status
            .is_some_and(|status| (200..300).contains(&status));
        let error = if success {
            None
        } else {
            outcome.error_message.clone()
        };

        Ok(TestWebhookResponse {
            success,
            response_status: outcome.response_status,
            response_time_ms: outcome.duration_ms,
            error,
        })
    }

    /// Starts a fresh occurrence (attempt numbering restarts at 1) for a
    /// delivery that already reached terminal `failed`, reusing the stored
    /// payload.
    pub async fn retry_failed_delivery(&self, attempt_id: Uuid) -> Result<Delivery, DispatchError> {
        let attempt = history::get_attempt(&self.inner.pool, attempt_id).await?;
        let source = history::get_delivery(&self.inner.pool, attempt.delivery_id).await?;
        if source.status != DeliveryStatus::Failed {
            return Err(DispatchError::Conflict(
                "delivery is not in a terminal failed state".to_string(),
            ));
        }

        let endpoint = registry::get_endpoint(&self.inner.pool, source.endpoint_id).await?;
        if !endpoint.is_active {
            return Err(DispatchError::Conflict(
                "endpoint is deactivated".to_string(),
            ));
        }

        let delivery = history::create_delivery(
            &self.inner.pool,
            &NewDelivery {
                endpoint_id: endpoint.id,
                event_type: source.event_type,
                payload: source.payload.clone(),
                replayed_from_delivery_id: Some(source.id),
            },
        )
        .await?;

        info!(
            endpoint_id = %endpoint.id,
            delivery_id = %delivery.id,
            replayed_from = %source.id,
            "manual retry started"
        );
        self.spawn_delivery(endpoint, delivery.clone()).await;

        Ok(delivery)
    }

    /// Cancels any backoff timers currently pending for the endpoint. Called
    /// on deactivate and delete; the in-flight sequences abandon instead of
    /// attempting again.
    pub async fn cancel_endpoint(&self, endpoint_id: Uuid) {
        let mut cancellations = self.inner.cancellations.lock().await;
        if let Some(token) = cancellations.remove(&endpoint_id) {
            token.cancel();
        }
    }

    async fn cancellation_for(&self, endpoint_id: Uuid) -> CancellationToken {
        let mut cancellations = self.inner.cancellations.lock().await;
        cancellations
            .entry(endpoint_id)
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    async fn spawn_delivery(&self, endpoint: WebhookEndpoint, delivery: Delivery) {
        let dispatcher = self.clone();
        let token = self.cancellation_for(endpoint.id).await;
        tokio::spawn(async move {
            dispatcher.run_delivery(endpoint, delivery, token).await;
        });
    }

    /// The retry state machine for one delivery occurrence:
    /// pending -> (delivered | retrying -> ... -> delivered | failed).
    /// Attempts are strictly sequential; the backoff sleep is a cancellable
    /// timer, and the active flag is re-read before every retry.
    async fn run_delivery(
        &self,
        endpoint: WebhookEndpoint,
        delivery: Delivery,
        token: CancellationToken,
    ) {
        let max_attempts = i64::from(endpoint.retry_policy.max_retries) + 1;
        let mut attempt_no: i64 = 1;

        loop {
            let outcome = self
                .attempt_once(
                    &endpoint,
                    delivery.event_type,
                    &delivery.payload,
                    delivery.id,
                    attempt_no,
                )
                .await;

            let delivered = outcome
                .response_status
                .is_some_and(|status| (200..300).contains(&status));
            let exhausted = attempt_no >= max_attempts;
            let status = if delivered {
                DeliveryStatus::Delivered
            } else if exhausted {
                DeliveryStatus::Failed
            } else {
                DeliveryStatus::Retrying
            };

            let record = AttemptRecord {
                delivery_id: delivery.id,
                endpoint_id: endpoint.id,
                event_type: delivery.event_type,
                attempt_no,
                status,
                response_status: outcome.response_status,
                response_body: outcome.response_body,
                error_kind: outcome.error_kind,
                error_message: outcome.error_message,
                duration_ms: outcome.duration_ms,
            };
            if let Err(err) = history::record_attempt(&self.inner.pool, &record).await {
                error!(
                    delivery_id = %delivery.id,
                    error = ?err,
                    "failed to record delivery attempt"
                );
                return;
            }

            if delivered {
                info!(
                    endpoint_id = %endpoint.id,
                    delivery_id = %delivery.id,
                    attempts = attempt_no,
                    "webhook delivered"
                );
                return;
            }
            if exhausted {
                error!(
                    endpoint_id = %endpoint.id,
                    delivery_id = %delivery.id,
                    attempts = attempt_no,
                    "webhook delivery failed, retry budget exhausted"
                );
                return;
            }

            let delay = backoff_delay(
                &endpoint.retry_policy,
                attempt_no,
                self.inner.config.max_backoff_ms,
            );
            debug!(
                delivery_id = %delivery.id,
                attempt = attempt_no,
                delay_ms = delay.as_millis() as u64,
                "waiting before retry"
            );

            tokio::select! {
                () = token.cancelled() => {
                    self.abandon(delivery.id, "endpoint deactivated").await;
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }

            // Deactivation may have happened in another process between the
            // timer firing and now; the database flag is authoritative.
            match registry::get_endpoint(&self.inner.pool, endpoint.id).await {
                Ok(current) if current.is_active => {}
                Ok(_) => {
                    self.abandon(delivery.id, "endpoint deactivated").await;
                    return;
                }
                Err(_) => {
                    self.abandon(delivery.id, "endpoint deleted").await;
                    return;
                }
            }

            attempt_no += 1;
        }
    }

    async fn abandon(&self, delivery_id: Uuid, reason: &str) {
        warn!(delivery_id = %delivery_id, reason, "abandoning retry sequence");
        if let Err(err) = history::abandon_delivery(&self.inner.pool, delivery_id, reason).await {
            error!(delivery_id = %delivery_id, error = ?err, "failed to abandon delivery");
        }
    }

    async fn attempt_once(
        &self,
        endpoint: &WebhookEndpoint,
        event_type: EventType,
        payload: &str,
        delivery_id: Uuid,
        attempt_no: i64,
    ) -> AttemptOutcome {
        let started = Instant::now();

        let mut request = self
            .inner
            .client
            .request(to_reqwest_method(endpoint.method), &endpoint.target_url)
            .header("Content-Type", "application/json")
            .header("X-Relay-Event", event_type.as_str())
            .header("X-Relay-Delivery", delivery_id.to_string())
            .header("X-Relay-Timestamp", Utc::now().timestamp().to_string());

        for (key, value) in &endpoint.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        if let Some(secret) = endpoint.secret.as_deref() {
            request = request.header(
                "X-Relay-Signature",
                signer::signature_header(payload.as_bytes(), secret),
            );
        }

        let result = request.body(payload.to_string()).send().await;
        let duration_ms = started.elapsed().as_millis() as i64;

        match result {
            Ok(response) => {
                let status = i64::from(response.status().as_u16());
                let body = response.text().await.unwrap_or_default();
                let body = excerpt(&body, self.inner.config.response_excerpt_max);

                if (200..300).contains(&status) {
                    AttemptOutcome {
                        response_status: Some(status),
                        response_body: Some(body),
                        error_kind: None,
                        error_message: None,
                        duration_ms,
                    }
                } else {
                    warn!(
                        endpoint_id = %endpoint.id,
                        status,
                        attempt = attempt_no,
                        "webhook target returned non-success status"
                    );
                    AttemptOutcome {
                        response_status: Some(status),
                        error_kind: Some(DeliveryErrorKind::Http),
                        error_message: Some(format!("HTTP {status}: {}", excerpt(&body, 200))),
                        response_body: Some(body),
                        duration_ms,
                    }
                }
            }
            Err(err) => {
                warn!(
                    endpoint_id = %endpoint.id,
                    attempt = attempt_no,
                    error = %err,
                    "webhook request failed"
                );
                let kind = if err.is_timeout() {
                    DeliveryErrorKind::Timeout
                } else if err.is_connect() || err.is_request() {
                    DeliveryErrorKind::Network
                } else {
                    DeliveryErrorKind::Unexpected
                };
                AttemptOutcome {
                    response_status: None,
                    response_body: None,
                    error_kind: Some(kind),
                    error_message: Some(err.to_string()),
                    duration_ms,
                }
            }
        }
    }
}

struct AttemptOutcome {
    response_status: Option<i64>,
    response_body: Option<String>,
    error_kind: Option<DeliveryErrorKind>,
    error_message: Option<String>,
    duration_ms: i64,
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
    }
}

fn excerpt(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn policy(delay_ms: u32, multiplier: f64) -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            retry_delay_ms: delay_ms,
            backoff_multiplier: multiplier,
        }
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = policy(1_000, 2.0);
        assert_eq!(backoff_delay(&policy, 1, 600_000).as_millis(), 1_000);
        assert_eq!(backoff_delay(&policy, 2, 600_000).as_millis(), 2_000);
        assert_eq!(backoff_delay(&policy, 3, 600_000).as_millis(), 4_000);
    }

    #[test]
    fn backoff_with_unit_multiplier_is_flat() {
        let policy = policy(500, 1.0);
        assert_eq!(backoff_delay(&policy, 1, 600_000).as_millis(), 500);
        assert_eq!(backoff_delay(&policy, 5, 600_000).as_millis(), 500);
    }

    #[test]
    fn backoff_respects_cap() {
        let policy = policy(1_000, 10.0);
        assert_eq!(backoff_delay(&policy, 8, 600_000).as_millis(), 600_000);
    }

    #[test]
    fn excerpt_clamps_long_bodies() {
        let body = "x".repeat(5_000);
        assert_eq!(excerpt(&body, 1_000).len(), 1_000);
        assert_eq!(excerpt("short", 1_000), "short");
    }

    #[test]
    fn event_payload_wire_shape() {
        let event = WebhookEvent::new(
            EventType::InvoicePaid,
            serde_json::json!({"invoice_number": "INV-42"}),
        );
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(value["event"], "invoice.paid");
        assert_eq!(value["webhook_version"], "1.0");
        assert_eq!(value["data"]["invoice_number"], "INV-42");
        assert!(value["timestamp"].is_string());
    }
}
