use sqlx::SqlitePool;

use crate::diagnostics::DiagnosticsRunner;
use crate::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub dispatcher: Dispatcher,
    pub diagnostics: DiagnosticsRunner,
    /// When unset, admin routes accept unauthenticated requests.
    pub admin_api_token: Option<String>,
}
