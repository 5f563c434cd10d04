use serde::{Deserialize, Serialize};
use specta::Type;

/// Delivery rollups computed from the history tables, either globally or for
/// one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct WebhookStats {
    pub total_deliveries: i64,
    pub successful_deliveries: i64,
    pub failed_deliveries: i64,
    /// Occurrences still pending or mid-retry.
    pub pending_deliveries: i64,
    /// successful / total; 0.0 when there are no deliveries.
    pub delivery_rate: f64,
    /// Mean duration over attempts that got an HTTP response.
    pub average_response_time_ms: Option<f64>,
}
