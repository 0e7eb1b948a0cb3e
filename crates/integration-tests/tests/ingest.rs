//! Entity event ingest: upserts and dead letters.

#![allow(clippy::unwrap_used)]

use serde_json::json;
use uuid::Uuid;

use ecomm_core::{CategoryId, ProductId, SessionId, UserId};
use ecomm_db::db::{
    CatalogRepository, FailedEventRepository, SessionRepository, UserRepository,
};
use ecomm_db::services::{EventIngestor, IngestError, RetryReport, Topic};
use ecomm_integration_tests::{TestDb, money};

fn line(topic: &str, data: &serde_json::Value) -> String {
    json!({ "topic": topic, "data": data }).to_string()
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_bad_lines_are_dead_lettered_and_run_continues() {
    let db = TestDb::new().await.unwrap();
    let user_id = Uuid::new_v4();
    let category_id = Uuid::new_v4();

    let input = [
        line(
            "users",
            &json!({
                "user_id": user_id,
                "email": format!("ingest.{}@example.com", user_id.simple()),
                "first_name": "Ida",
                "last_name": "Rhodes",
                "registration_date": "2024-03-01 09:30:00",
            }),
        ),
        "{not json".to_string(),
        String::new(),
        line("orders", &json!({ "order_id": Uuid::new_v4() })),
        line(
            "sessions",
            &json!({ "session_id": Uuid::new_v4(), "ip_address": "999.1.1.1" }),
        ),
        line(
            "product_categories",
            &json!({ "category_id": category_id, "name": "Imported" }),
        ),
        line(
            "products",
            &json!({
                "product_id": Uuid::new_v4(),
                "sku": "IMP-1",
                "name": "Imported thing",
                "category_id": Uuid::new_v4(),
                "price": "10.00",
                "cost": "4.00",
            }),
        ),
    ]
    .join("\n");

    let report = EventIngestor::new(&db.pool)
        .run(input.as_bytes())
        .await
        .unwrap();
    assert_eq!(report.ingested, 2);
    assert_eq!(report.failed, 4);

    let failed = FailedEventRepository::new(&db.pool);
    let all = failed.list(None, 100).await.unwrap();
    assert_eq!(all.len(), 4);
    let topics: Vec<_> = all.iter().map(|f| f.topic.as_str()).collect();
    assert!(topics.contains(&"unknown"));
    assert!(topics.contains(&"orders"));
    assert!(topics.contains(&"sessions"));
    assert!(topics.contains(&"products"));

    let unreadable = all.iter().find(|f| f.topic == "unknown").unwrap();
    assert_eq!(unreadable.event_data, json!("{not json"));

    let product_failure = &failed.list(Some("products"), 10).await.unwrap()[0];
    assert_eq!(product_failure.retry_count, 0);
    assert!(product_failure.last_retry_at.is_none());

    // The good lines landed.
    let user = UserRepository::new(&db.pool)
        .get_by_id(UserId::new(user_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.first_name, "Ida");
    assert!(
        CatalogRepository::new(&db.pool)
            .get_category(CategoryId::new(category_id))
            .await
            .unwrap()
            .is_some()
    );

    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_upserts_are_idempotent_and_update_in_place() {
    let db = TestDb::new().await.unwrap();
    let ingestor = EventIngestor::new(&db.pool);
    let category = db.category("Garden", None).await.unwrap();
    let product_id = Uuid::new_v4();

    let mut product = json!({
        "product_id": product_id,
        "sku": format!("GRD-{}", product_id.simple()),
        "name": "Rake",
        "category_id": category.id.as_uuid(),
        "price": "19.50",
        "cost": "7.25",
        "stock_quantity": 12,
    });
    let first = line("products", &product);
    assert_eq!(ingestor.ingest_line(&first).await.unwrap(), Topic::Products);
    assert_eq!(ingestor.ingest_line(&first).await.unwrap(), Topic::Products);

    let catalog = CatalogRepository::new(&db.pool);
    let stored = catalog
        .get_product(ProductId::new(product_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.price, money("19.50"));
    assert_eq!(stored.stock_quantity, 12);
    assert!(stored.is_active);

    product["price"] = json!("21.00");
    product["is_active"] = json!(false);
    ingestor
        .ingest_line(&line("products", &product))
        .await
        .unwrap();
    let updated = catalog
        .get_product(ProductId::new(product_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.price, money("21.00"));
    assert!(!updated.is_active);
    assert_eq!(updated.created_at, stored.created_at);

    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM products WHERE product_id = $1")
        .bind(product_id)
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_ingested_sessions_keep_their_timing() {
    let db = TestDb::new().await.unwrap();
    let ingestor = EventIngestor::new(&db.pool);
    let session_id = Uuid::new_v4();

    ingestor
        .ingest_line(&line(
            "sessions",
            &json!({
                "session_id": session_id,
                "timestamp_start": "2024-05-01T10:00:00Z",
                "timestamp_end": "2024-05-01T10:20:00",
                "device_type": "mobile",
                "ip_address": "2001:db8::1",
                "utm_source": "newsletter",
            }),
        ))
        .await
        .unwrap();

    let session = SessionRepository::new(&db.pool)
        .get(SessionId::new(session_id))
        .await
        .unwrap()
        .unwrap();
    assert!(!session.is_open());
    assert_eq!(
        (session.timestamp_end.unwrap() - session.timestamp_start).num_minutes(),
        20
    );

    let backwards = ingestor
        .ingest_line(&line(
            "sessions",
            &json!({
                "session_id": Uuid::new_v4(),
                "timestamp_start": "2024-05-01T10:00:00Z",
                "timestamp_end": "2024-05-01T09:00:00Z",
            }),
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        backwards,
        IngestError::InvalidField {
            field: "timestamp_end",
            ..
        }
    ));

    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_ingested_categories_cannot_form_a_cycle() {
    let db = TestDb::new().await.unwrap();
    let ingestor = EventIngestor::new(&db.pool);
    let parent = db.category("Outdoors", None).await.unwrap();
    let child = db.category("Tents", Some(parent.id)).await.unwrap();

    let err = ingestor
        .ingest_line(&line(
            "product_categories",
            &json!({
                "category_id": parent.id.as_uuid(),
                "parent_category_id": child.id.as_uuid(),
                "name": "Outdoors",
            }),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Write(_)));

    let forest = CatalogRepository::new(&db.pool).load_forest().await.unwrap();
    assert!(forest.problems().is_empty());
    assert_eq!(forest.parent(child.id), Some(parent.id));

    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_nul_characters_do_not_stop_the_run() {
    let db = TestDb::new().await.unwrap();
    let bad_id = Uuid::new_v4();
    let good_id = Uuid::new_v4();

    let user = |id: Uuid, first_name: &str| {
        line(
            "users",
            &json!({
                "user_id": id,
                "email": format!("nul.{}@example.com", id.simple()),
                "first_name": first_name,
                "last_name": "Byte",
            }),
        )
    };
    let input = [
        user(bad_id, "A\u{0}"),
        "raw \u{0} line".to_string(),
        user(good_id, "Ada"),
    ]
    .join("\n");

    let report = EventIngestor::new(&db.pool)
        .run(input.as_bytes())
        .await
        .unwrap();
    assert_eq!(report.ingested, 1);
    assert_eq!(report.failed, 2);

    let users = UserRepository::new(&db.pool);
    assert!(users.get_by_id(UserId::new(good_id)).await.unwrap().is_some());
    assert!(users.get_by_id(UserId::new(bad_id)).await.unwrap().is_none());

    let failed = FailedEventRepository::new(&db.pool);
    let stored = &failed.list(Some("users"), 10).await.unwrap()[0];
    assert_eq!(stored.event_data["data"]["first_name"], json!("A\u{FFFD}"));
    let unreadable = &failed.list(Some("unknown"), 10).await.unwrap()[0];
    assert_eq!(unreadable.event_data, json!("raw \u{FFFD} line"));

    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_retry_applies_events_whose_parents_arrived() {
    let db = TestDb::new().await.unwrap();
    let ingestor = EventIngestor::new(&db.pool);
    let category_id = Uuid::new_v4();
    let product_id = Uuid::new_v4();

    // The product arrives before its category.
    let input = [
        line(
            "products",
            &json!({
                "product_id": product_id,
                "sku": format!("LATE-{}", product_id.simple()),
                "name": "Early bird",
                "category_id": category_id,
                "price": "5.00",
                "cost": "2.00",
            }),
        ),
        line("orders", &json!({ "order_id": Uuid::new_v4() })),
    ]
    .join("\n");
    let report = ingestor.run(input.as_bytes()).await.unwrap();
    assert_eq!(report.failed, 2);

    // Nothing has changed yet.
    let first_pass = ingestor.retry_failed(None, 100).await.unwrap();
    assert_eq!(
        first_pass,
        RetryReport {
            resolved: 0,
            still_failing: 2
        }
    );

    ingestor
        .ingest_line(&line(
            "product_categories",
            &json!({ "category_id": category_id, "name": "Late" }),
        ))
        .await
        .unwrap();

    let second_pass = ingestor.retry_failed(None, 100).await.unwrap();
    assert_eq!(
        second_pass,
        RetryReport {
            resolved: 1,
            still_failing: 1
        }
    );

    assert!(
        CatalogRepository::new(&db.pool)
            .get_product(ProductId::new(product_id))
            .await
            .unwrap()
            .is_some()
    );

    let failed = FailedEventRepository::new(&db.pool);
    let left = failed.list(None, 100).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].topic, "orders");
    assert_eq!(left[0].retry_count, 2);
    assert!(left[0].last_retry_at.is_some());
    assert!(left[0].error_message.contains("unknown topic"));

    // Topic filters narrow the pass.
    let products_only = ingestor.retry_failed(Some("products"), 100).await.unwrap();
    assert_eq!(products_only, RetryReport::default());

    db.cleanup().await.unwrap();
}
