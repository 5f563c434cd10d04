pub mod diagnostics;
pub mod events;
pub mod webhooks;

use uuid::Uuid;

use crate::{dispatcher::DispatchError, error::ApiError, history, registry};

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|_| ApiError::validation(format!("{field} must be a UUID")))
}

fn map_store_error(err: registry::StoreError) -> ApiError {
    match err {
        registry::StoreError::Db(db) => ApiError::Db(db),
        registry::StoreError::Validation(message) => ApiError::Validation(message),
        registry::StoreError::NotFound(message) => ApiError::NotFound(message),
        registry::StoreError::Parse(message) => ApiError::Internal(message),
    }
}

fn map_history_error(err: history::StoreError) -> ApiError {
    match err {
        history::StoreError::Db(db) => ApiError::Db(db),
        history::StoreError::NotFound(message) => ApiError::NotFound(message),
        history::StoreError::Parse(message) => ApiError::Internal(message),
    }
}

fn map_dispatch_error(err: DispatchError) -> ApiError {
    match err {
        DispatchError::Db(db) => ApiError::Db(db),
        DispatchError::NotFound(message) => ApiError::NotFound(message),
        DispatchError::Conflict(message) => ApiError::Conflict(message),
        DispatchError::Serialize(err) => ApiError::Internal(err.to_string()),
        DispatchError::Store(message) => ApiError::Internal(message),
    }
}
