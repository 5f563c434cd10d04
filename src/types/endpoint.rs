use serde::{Deserialize, Serialize};
use specta::Type;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::EventType;

/// Hard ceiling on `max_retries` so a misconfigured endpoint cannot turn a
/// flaky target into a retry storm.
pub const MAX_RETRIES_CEILING: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub name: String,
    pub target_url: String,
    pub method: HttpMethod,
    pub events: Vec<EventType>,
    pub secret: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub is_active: bool,
    pub retry_policy: RetryPolicy,
    /// Updated on every delivery attempt, regardless of outcome.
    pub last_triggered_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl WebhookEndpoint {
    pub fn subscribes_to(&self, event_type: EventType) -> bool {
        self.events.contains(&event_type)
    }
}

/// Outbound HTTP methods an endpoint may be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
    Patch,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Type)]
pub struct RetryPolicy {
    /// Retries after the initial attempt, so the attempt budget is
    /// `max_retries + 1`.
    pub max_retries: u32,
    pub retry_delay_ms: u32,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1_000,
            backoff_multiplier: 2.0,
        }
    }
}
