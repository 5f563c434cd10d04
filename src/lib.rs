pub mod auth;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod history;
pub mod registry;
pub mod signer;
pub mod state;
pub mod types;
pub mod validator;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::handlers::{diagnostics as diag_handlers, events, webhooks};
use crate::state::AppState;

/// Full application router: admin surface behind bearer auth, plus the
/// unauthenticated internal event intake.
pub fn app(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/webhooks",
            post(webhooks::create_webhook_handler).get(webhooks::list_webhooks_handler),
        )
        .route("/webhooks/stats", get(webhooks::webhook_stats_handler))
        .route("/webhooks/validate-url", post(webhooks::validate_url_handler))
        .route(
            "/webhooks/:webhook_id",
            get(webhooks::get_webhook_handler)
                .patch(webhooks::update_webhook_handler)
                .delete(webhooks::delete_webhook_handler),
        )
        .route("/webhooks/:webhook_id/active", post(webhooks::set_active_handler))
        .route("/webhooks/:webhook_id/logs", get(webhooks::webhook_logs_handler))
        .route("/webhooks/:webhook_id/test", post(webhooks::test_webhook_handler))
        .route(
            "/webhooks/:webhook_id/diagnostics",
            post(diag_handlers::run_diagnostics_handler),
        )
        .route(
            "/webhooks/:webhook_id/health",
            get(diag_handlers::health_score_handler),
        )
        .route("/attempts/:attempt_id/retry", post(webhooks::retry_delivery_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::admin_auth,
        ));

    Router::new()
        .merge(admin)
        .route("/internal/events", post(events::dispatch_event_handler))
        .with_state(state)
}
