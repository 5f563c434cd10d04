#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::fs;

use relay::history::{
    AttemptRecord, NewDelivery, StoreError, abandon_delivery, create_delivery, get_attempt,
    get_delivery, list_attempts, record_attempt, stats,
};
use relay::registry::{self, NewEndpoint};
use relay::types::{
    DeliveryErrorKind, DeliveryStatus, EventType, HttpMethod, RetryPolicy, WebhookEndpoint,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::NamedTempFile;
use uuid::Uuid;

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

async fn make_endpoint(pool: &sqlx::SqlitePool, name: &str) -> WebhookEndpoint {
    registry::create_endpoint(
        pool,
        &NewEndpoint {
            name: name.to_string(),
            target_url: "https://example.com/hook".to_string(),
            method: HttpMethod::Post,
            events: vec![EventType::InvoiceCreated],
            secret: None,
            headers: BTreeMap::new(),
            is_active: true,
            retry_policy: RetryPolicy::default(),
        },
    )
    .await
    .expect("create endpoint")
}

async fn seed_delivery(
    pool: &sqlx::SqlitePool,
    endpoint_id: Uuid,
) -> relay::types::Delivery {
    create_delivery(
        pool,
        &NewDelivery {
            endpoint_id,
            event_type: EventType::InvoiceCreated,
            payload: r#"{"event":"invoice.created"}"#.to_string(),
            replayed_from_delivery_id: None,
        },
    )
    .await
    .expect("create delivery")
}

fn attempt(
    delivery_id: Uuid,
    endpoint_id: Uuid,
    attempt_no: i64,
    status: DeliveryStatus,
    response_status: Option<i64>,
    duration_ms: i64,
) -> AttemptRecord {
    AttemptRecord {
        delivery_id,
        endpoint_id,
        event_type: EventType::InvoiceCreated,
        attempt_no,
        status,
        response_status,
        response_body: response_status.map(|_| "body".to_string()),
        error_kind: if response_status.is_some() {
            None
        } else {
            Some(DeliveryErrorKind::Network)
        },
        error_message: None,
        duration_ms,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Deliveries and attempts
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn new_deliveries_start_pending_with_no_attempts() {
    let db = setup_db().await;
    let endpoint = make_endpoint(&db.pool, "fresh").await;

    let delivery = seed_delivery(&db.pool, endpoint.id).await;
    assert_eq!(delivery.status, DeliveryStatus::Pending);
    assert_eq!(delivery.attempts, 0);
    assert!(delivery.last_error.is_none());
    assert!(delivery.replayed_from_delivery_id.is_none());
}

#[tokio::test]
async fn record_attempt_rolls_the_delivery_forward() {
    let db = setup_db().await;
    let endpoint = make_endpoint(&db.pool, "rolling").await;
    let delivery = seed_delivery(&db.pool, endpoint.id).await;

    let first = record_attempt(
        &db.pool,
        &attempt(delivery.id, endpoint.id, 1, DeliveryStatus::Retrying, Some(500), 40),
    )
    .await
    .expect("record first attempt");
    assert_eq!(first.attempt_no, 1);

    let after_first = get_delivery(&db.pool, delivery.id).await.expect("get");
    assert_eq!(after_first.status, DeliveryStatus::Retrying);
    assert_eq!(after_first.attempts, 1);

    record_attempt(
        &db.pool,
        &attempt(delivery.id, endpoint.id, 2, DeliveryStatus::Delivered, Some(200), 25),
    )
    .await
    .expect("record second attempt");

    let done = get_delivery(&db.pool, delivery.id).await.expect("get");
    assert_eq!(done.status, DeliveryStatus::Delivered);
    assert_eq!(done.attempts, 2);

    // The attempt also bumps the endpoint's last_triggered_at.
    let endpoint = registry::get_endpoint(&db.pool, endpoint.id)
        .await
        .expect("get endpoint");
    assert!(endpoint.last_triggered_at.is_some());
}

#[tokio::test]
async fn list_attempts_is_newest_first_and_limited() {
    let db = setup_db().await;
    let endpoint = make_endpoint(&db.pool, "listed").await;
    let delivery = seed_delivery(&db.pool, endpoint.id).await;

    for attempt_no in 1..=5 {
        record_attempt(
            &db.pool,
            &attempt(
                delivery.id,
                endpoint.id,
                attempt_no,
                DeliveryStatus::Retrying,
                Some(500),
                10,
            ),
        )
        .await
        .expect("record attempt");
    }

    let attempts = list_attempts(&db.pool, endpoint.id, 3).await.expect("list");
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[0].attempt_no, 5);
    assert_eq!(attempts[2].attempt_no, 3);
}

#[tokio::test]
async fn abandon_terminates_only_non_terminal_deliveries() {
    let db = setup_db().await;
    let endpoint = make_endpoint(&db.pool, "abandoned").await;

    let pending = seed_delivery(&db.pool, endpoint.id).await;
    abandon_delivery(&db.pool, pending.id, "endpoint deactivated")
        .await
        .expect("abandon");
    let abandoned = get_delivery(&db.pool, pending.id).await.expect("get");
    assert_eq!(abandoned.status, DeliveryStatus::Failed);
    assert_eq!(abandoned.last_error.as_deref(), Some("endpoint deactivated"));

    let delivered = seed_delivery(&db.pool, endpoint.id).await;
    record_attempt(
        &db.pool,
        &attempt(delivered.id, endpoint.id, 1, DeliveryStatus::Delivered, Some(200), 15),
    )
    .await
    .expect("record");
    abandon_delivery(&db.pool, delivered.id, "endpoint deactivated")
        .await
        .expect("abandon is a no-op");
    let untouched = get_delivery(&db.pool, delivered.id).await.expect("get");
    assert_eq!(untouched.status, DeliveryStatus::Delivered);
    assert!(untouched.last_error.is_none());
}

#[tokio::test]
async fn get_attempt_unknown_id_is_not_found() {
    let db = setup_db().await;
    let err = get_attempt(&db.pool, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Stats rollups
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stats_on_an_empty_database_are_all_zero() {
    let db = setup_db().await;

    let stats = stats(&db.pool, None).await.expect("stats");
    assert_eq!(stats.total_deliveries, 0);
    assert_eq!(stats.delivery_rate, 0.0);
    assert!(stats.average_response_time_ms.is_none());
}

#[tokio::test]
async fn stats_aggregate_statuses_and_response_times() {
    let db = setup_db().await;
    let endpoint = make_endpoint(&db.pool, "stats").await;

    let delivered = seed_delivery(&db.pool, endpoint.id).await;
    record_attempt(
        &db.pool,
        &attempt(delivered.id, endpoint.id, 1, DeliveryStatus::Delivered, Some(200), 100),
    )
    .await
    .expect("record");

    let failed = seed_delivery(&db.pool, endpoint.id).await;
    record_attempt(
        &db.pool,
        &attempt(failed.id, endpoint.id, 1, DeliveryStatus::Failed, Some(500), 300),
    )
    .await
    .expect("record");

    // No HTTP response, so this attempt is excluded from the average.
    let network_failed = seed_delivery(&db.pool, endpoint.id).await;
    record_attempt(
        &db.pool,
        &attempt(network_failed.id, endpoint.id, 1, DeliveryStatus::Failed, None, 2_000),
    )
    .await
    .expect("record");

    // Still pending, counted in totals only.
    seed_delivery(&db.pool, endpoint.id).await;

    let stats = stats(&db.pool, Some(endpoint.id)).await.expect("stats");
    assert_eq!(stats.total_deliveries, 4);
    assert_eq!(stats.successful_deliveries, 1);
    assert_eq!(stats.failed_deliveries, 2);
    assert_eq!(stats.pending_deliveries, 1);
    assert!((stats.delivery_rate - 0.25).abs() < f64::EPSILON);
    assert_eq!(stats.average_response_time_ms, Some(200.0));
}

#[tokio::test]
async fn stats_scope_to_the_requested_endpoint() {
    let db = setup_db().await;
    let noisy = make_endpoint(&db.pool, "noisy").await;
    let quiet = make_endpoint(&db.pool, "quiet").await;

    let delivery = seed_delivery(&db.pool, noisy.id).await;
    record_attempt(
        &db.pool,
        &attempt(delivery.id, noisy.id, 1, DeliveryStatus::Delivered, Some(200), 50),
    )
    .await
    .expect("record");

    let global = stats(&db.pool, None).await.expect("global stats");
    assert_eq!(global.total_deliveries, 1);

    let scoped = stats(&db.pool, Some(quiet.id)).await.expect("scoped stats");
    assert_eq!(scoped.total_deliveries, 0);
    assert_eq!(scoped.delivery_rate, 0.0);
    assert!(scoped.average_response_time_ms.is_none());
}
