use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

use super::EventType;

/// One delivery occurrence: a single event fanned out to a single endpoint.
/// Tracks the retry sequence; the per-attempt history lives in
/// [`DeliveryAttempt`] rows.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct Delivery {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    /// Set when this occurrence was started by a manual retry of a dead one.
    pub replayed_from_delivery_id: Option<Uuid>,
    pub event_type: EventType,
    pub payload: String,
    pub status: DeliveryStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Retrying,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retrying => "retrying",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "retrying" => Some(Self::Retrying),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }
}

/// Append-only record of one HTTP call to an endpoint. Immutable once
/// written; survives endpoint deletion for audit.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub endpoint_id: Uuid,
    pub event_type: EventType,
    /// 1-based, contiguous within a delivery.
    pub attempt_no: i64,
    /// Delivery status at the time this attempt was written.
    pub status: DeliveryStatus,
    /// None when no HTTP response was obtained (timeout, DNS failure).
    pub response_status: Option<i64>,
    pub response_body: Option<String>,
    pub error_kind: Option<DeliveryErrorKind>,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryErrorKind {
    Timeout,
    Network,
    Http,
    Unexpected,
}

impl DeliveryErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Http => "http",
            Self::Unexpected => "unexpected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "timeout" => Some(Self::Timeout),
            "network" => Some(Self::Network),
            "http" => Some(Self::Http),
            "unexpected" => Some(Self::Unexpected),
            _ => None,
        }
    }
}
