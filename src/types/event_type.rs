use serde::{Deserialize, Serialize};
use specta::Type;

/// Catalog of business events that can be dispatched to webhook endpoints.
///
/// Unknown event names are rejected at the producer boundary; the dispatcher
/// itself only ever sees members of this catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
pub enum EventType {
    #[serde(rename = "invoice.created")]
    InvoiceCreated,
    #[serde(rename = "invoice.updated")]
    InvoiceUpdated,
    #[serde(rename = "invoice.paid")]
    InvoicePaid,
    #[serde(rename = "client.created")]
    ClientCreated,
    #[serde(rename = "payment.received")]
    PaymentReceived,
    /// Synthetic event used by interactive "Test" sends.
    #[serde(rename = "webhook.test")]
    WebhookTest,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvoiceCreated => "invoice.created",
            Self::InvoiceUpdated => "invoice.updated",
            Self::InvoicePaid => "invoice.paid",
            Self::ClientCreated => "client.created",
            Self::PaymentReceived => "payment.received",
            Self::WebhookTest => "webhook.test",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "invoice.created" => Some(Self::InvoiceCreated),
            "invoice.updated" => Some(Self::InvoiceUpdated),
            "invoice.paid" => Some(Self::InvoicePaid),
            "client.created" => Some(Self::ClientCreated),
            "payment.received" => Some(Self::PaymentReceived),
            "webhook.test" => Some(Self::WebhookTest),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
