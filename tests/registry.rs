#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::fs;

use relay::history::{self, AttemptRecord, NewDelivery};
use relay::registry::{
    EndpointFilter, EndpointPatch, NewEndpoint, StoreError, create_endpoint, delete_endpoint,
    get_endpoint, list_endpoints, set_active, update_endpoint,
};
use relay::types::{DeliveryStatus, EventType, HttpMethod, RetryPolicy};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::NamedTempFile;

struct TestDb {
    pool: sqlx::SqlitePool,
    _db_file: NamedTempFile,
}

async fn setup_db() -> TestDb {
    let db_file = NamedTempFile::new().expect("create temp sqlite file");
    let options = SqliteConnectOptions::new()
        .filename(db_file.path())
        .create_if_missing(true)
        .busy_timeout(std::time::Duration::from_millis(500));

    let mut conn = sqlx::SqliteConnection::connect_with(&options)
        .await
        .expect("connect sqlite");
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(&mut conn)
        .await
        .expect("enable foreign keys");

    let mut entries: Vec<_> = fs::read_dir("migrations")
        .expect("read migrations dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some("sql"))
        .collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let contents = fs::read_to_string(entry.path()).expect("read migration");
        for stmt in contents.split(';') {
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(&mut conn)
                    .await
                    .expect("run migration");
            }
        }
    }

    use sqlx::Connection;
    conn.close().await.expect("close migration conn");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("connect pool");

    TestDb {
        pool,
        _db_file: db_file,
    }
}

fn sample_endpoint(name: &str) -> NewEndpoint {
    NewEndpoint {
        name: name.to_string(),
        target_url: "https://example.com/hooks/invoices".to_string(),
        method: HttpMethod::Post,
        events: vec![EventType::InvoiceCreated, EventType::InvoicePaid],
        secret: Some("whsec_registry_test".to_string()),
        headers: BTreeMap::from([("X-Team".to_string(), "billing".to_string())]),
        is_active: true,
        retry_policy: RetryPolicy::default(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Create / get
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_roundtrip() {
    let db = setup_db().await;

    let created = create_endpoint(&db.pool, &sample_endpoint("billing hook"))
        .await
        .expect("create endpoint");

    assert_eq!(created.name, "billing hook");
    assert_eq!(created.method, HttpMethod::Post);
    assert!(created.is_active);
    assert!(created.last_triggered_at.is_none());
    assert_eq!(created.headers.get("X-Team").map(String::as_str), Some("billing"));

    let fetched = get_endpoint(&db.pool, created.id).await.expect("get endpoint");
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.events, vec![EventType::InvoiceCreated, EventType::InvoicePaid]);
    assert_eq!(fetched.retry_policy.max_retries, 3);
}

#[tokio::test]
async fn create_rejects_empty_name() {
    let db = setup_db().await;
    let mut new = sample_endpoint("  ");
    new.name = "   ".to_string();

    let err = create_endpoint(&db.pool, &new).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn create_rejects_invalid_url() {
    let db = setup_db().await;
    let mut new = sample_endpoint("bad url");
    new.target_url = "ftp://example.com/hook".to_string();

    let err = create_endpoint(&db.pool, &new).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn create_rejects_empty_events() {
    let db = setup_db().await;
    let mut new = sample_endpoint("no events");
    new.events.clear();

    let err = create_endpoint(&db.pool, &new).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn create_rejects_excessive_retry_budget() {
    let db = setup_db().await;
    let mut new = sample_endpoint("retry storm");
    new.retry_policy.max_retries = 11;

    let err = create_endpoint(&db.pool, &new).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn create_rejects_sub_unit_backoff_multiplier() {
    let db = setup_db().await;
    let mut new = sample_endpoint("shrinking backoff");
    new.retry_policy.backoff_multiplier = 0.5;

    let err = create_endpoint(&db.pool, &new).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// List with filters
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_filters_by_active_and_event() {
    let db = setup_db().await;

    let mut inactive = sample_endpoint("inactive");
    inactive.is_active = false;
    create_endpoint(&db.pool, &inactive).await.expect("create");

    let mut payments_only = sample_endpoint("payments");
    payments_only.events = vec![EventType::PaymentReceived];
    create_endpoint(&db.pool, &payments_only).await.expect("create");

    create_endpoint(&db.pool, &sample_endpoint("invoices"))
        .await
        .expect("create");

    let all = list_endpoints(&db.pool, &EndpointFilter::default())
        .await
        .expect("list");
    assert_eq!(all.len(), 3);

    let active = list_endpoints(
        &db.pool,
        &EndpointFilter {
            active: Some(true),
            event_type: None,
        },
    )
    .await
    .expect("list active");
    assert_eq!(active.len(), 2);

    let payment_subscribers = list_endpoints(
        &db.pool,
        &EndpointFilter {
            active: Some(true),
            event_type: Some(EventType::PaymentReceived),
        },
    )
    .await
    .expect("list by event");
    assert_eq!(payment_subscribers.len(), 1);
    assert_eq!(payment_subscribers[0].name, "payments");
}

// ─────────────────────────────────────────────────────────────────────────────
// Update semantics
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_patches_only_provided_fields() {
    let db = setup_db().await;
    let created = create_endpoint(&db.pool, &sample_endpoint("before"))
        .await
        .expect("create");

    let patch = EndpointPatch {
        name: Some("after".to_string()),
        ..EndpointPatch::default()
    };
    let updated = update_endpoint(&db.pool, created.id, &patch)
        .await
        .expect("update");

    assert_eq!(updated.name, "after");
    assert_eq!(updated.target_url, created.target_url);
    assert_eq!(updated.events, created.events);
    // An absent secret in the patch keeps the stored one.
    assert_eq!(updated.secret, created.secret);
}

#[tokio::test]
async fn update_replaces_secret_but_never_clears_it() {
    let db = setup_db().await;
    let created = create_endpoint(&db.pool, &sample_endpoint("secret holder"))
        .await
        .expect("create");

    let patch = EndpointPatch {
        secret: Some("whsec_rotated".to_string()),
        ..EndpointPatch::default()
    };
    let updated = update_endpoint(&db.pool, created.id, &patch)
        .await
        .expect("update");
    assert_eq!(updated.secret.as_deref(), Some("whsec_rotated"));
}

#[tokio::test]
async fn update_validates_patched_fields() {
    let db = setup_db().await;
    let created = create_endpoint(&db.pool, &sample_endpoint("validated"))
        .await
        .expect("create");

    let patch = EndpointPatch {
        target_url: Some("notaurl".to_string()),
        ..EndpointPatch::default()
    };
    let err = update_endpoint(&db.pool, created.id, &patch)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn update_unknown_endpoint_not_found() {
    let db = setup_db().await;
    let err = update_endpoint(&db.pool, uuid::Uuid::new_v4(), &EndpointPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Activation and deletion
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn set_active_flips_the_flag() {
    let db = setup_db().await;
    let created = create_endpoint(&db.pool, &sample_endpoint("toggle"))
        .await
        .expect("create");

    let paused = set_active(&db.pool, created.id, false).await.expect("pause");
    assert!(!paused.is_active);

    let resumed = set_active(&db.pool, created.id, true).await.expect("resume");
    assert!(resumed.is_active);
}

#[tokio::test]
async fn delete_tombstones_and_second_delete_is_not_found() {
    let db = setup_db().await;
    let created = create_endpoint(&db.pool, &sample_endpoint("doomed"))
        .await
        .expect("create");

    delete_endpoint(&db.pool, created.id).await.expect("delete");

    let err = get_endpoint(&db.pool, created.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    let err = delete_endpoint(&db.pool, created.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn delete_keeps_attempt_history_queryable() {
    let db = setup_db().await;
    let created = create_endpoint(&db.pool, &sample_endpoint("historied"))
        .await
        .expect("create");

    let delivery = history::create_delivery(
        &db.pool,
        &NewDelivery {
            endpoint_id: created.id,
            event_type: EventType::InvoiceCreated,
            payload: "{}".to_string(),
            replayed_from_delivery_id: None,
        },
    )
    .await
    .expect("create delivery");
    let attempt = history::record_attempt(
        &db.pool,
        &AttemptRecord {
            delivery_id: delivery.id,
            endpoint_id: created.id,
            event_type: EventType::InvoiceCreated,
            attempt_no: 1,
            status: DeliveryStatus::Delivered,
            response_status: Some(200),
            response_body: Some("ok".to_string()),
            error_kind: None,
            error_message: None,
            duration_ms: 12,
        },
    )
    .await
    .expect("record attempt");

    delete_endpoint(&db.pool, created.id).await.expect("delete");

    let kept = history::get_attempt(&db.pool, attempt.id)
        .await
        .expect("attempt survives tombstone");
    assert_eq!(kept.endpoint_id, created.id);

    let attempts = history::list_attempts(&db.pool, created.id, 10)
        .await
        .expect("list attempts");
    assert_eq!(attempts.len(), 1);
}
