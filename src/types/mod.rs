pub mod api;
pub mod api_error;
pub mod delivery;
pub mod diagnostics;
pub mod endpoint;
pub mod event_type;
pub mod stats;

#[allow(unused_imports)]
pub use api::{
    CreateWebhookRequest, DeleteWebhookResponse, DispatchResponse, ListWebhooksResponse,
    RetryDeliveryResponse, SetActiveRequest, TestWebhookResponse, UpdateWebhookRequest,
    ValidateUrlRequest, ValidateUrlResponse, WebhookLogsResponse, WebhookResponse,
};
#[allow(unused_imports)]
pub use api_error::{ApiErrorCode, ApiErrorResponse};
#[allow(unused_imports)]
pub use delivery::{Delivery, DeliveryAttempt, DeliveryErrorKind, DeliveryStatus};
#[allow(unused_imports)]
pub use diagnostics::{
    DiagnosticCategory, DiagnosticReport, DiagnosticStatus, DiagnosticSummary, DiagnosticTest,
    EndpointHealth, HealthFactor, HealthGrade, HealthScore,
};
#[allow(unused_imports)]
pub use endpoint::{HttpMethod, MAX_RETRIES_CEILING, RetryPolicy, WebhookEndpoint};
#[allow(unused_imports)]
pub use event_type::EventType;
#[allow(unused_imports)]
pub use stats::WebhookStats;
