//! HTTP surface tests: routing, status-code mapping, and response shapes.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use courier_api::{create_router, AppState, Config};
use courier_core::{storage::MemoryStore, NotificationStore};
use courier_dispatch::{NotificationService, PriorityQueue};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(PriorityQueue::new());
    let service = Arc::new(NotificationService::new(store.clone(), queue.clone()));
    let state = AppState::new(service, queue, None);

    let config = Config {
        database_url: "postgresql://localhost/courier".to_string(),
        provider_base_url: "https://provider.example.com/send".to_string(),
        ..Default::default()
    };

    TestApp { router: create_router(state, &config), store }
}

fn notification_body() -> Value {
    json!({
        "channel": "sms",
        "recipient": "+905551234567",
        "content": "Hello",
        "priority": "normal",
    })
}

async fn send_json(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .expect("request builds"),
        None => builder.body(Body::empty()).expect("request builds"),
    };

    let response = router.clone().oneshot(request).await.expect("handler responds");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body reads").to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn create_returns_created_with_queued_row() {
    let app = test_app();

    let (status, body) =
        send_json(&app.router, "POST", "/api/v1/notifications", Some(notification_body()), &[])
            .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["channel"], "sms");
    assert!(body["id"].is_string());
}

#[tokio::test]
async fn idempotent_replay_returns_ok_with_same_id() {
    let app = test_app();
    let headers = [("x-idempotency-key", "order-42")];

    let (first_status, first) = send_json(
        &app.router,
        "POST",
        "/api/v1/notifications",
        Some(notification_body()),
        &headers,
    )
    .await;
    let (second_status, second) = send_json(
        &app.router,
        "POST",
        "/api/v1/notifications",
        Some(notification_body()),
        &headers,
    )
    .await;

    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first["id"], second["id"]);
}

#[tokio::test]
async fn validation_failures_map_to_unprocessable() {
    let app = test_app();

    let mut body = notification_body();
    body["recipient"] = json!("");
    let (status, response) =
        send_json(&app.router, "POST", "/api/v1/notifications", Some(body), &[]).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response["error"].as_str().expect("error message").contains("recipient"));
}

#[tokio::test]
async fn unknown_channel_and_priority_map_to_unprocessable() {
    let app = test_app();

    let mut body = notification_body();
    body["channel"] = json!("fax");
    let (status, response) =
        send_json(&app.router, "POST", "/api/v1/notifications", Some(body), &[]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response["error"].as_str().expect("error message").contains("channel"));

    let mut body = notification_body();
    body["priority"] = json!("urgent");
    let (status, response) =
        send_json(&app.router, "POST", "/api/v1/notifications", Some(body), &[]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response["error"].as_str().expect("error message").contains("priority"));

    // The same rule guards every batch item.
    let mut bad_item = notification_body();
    bad_item["channel"] = json!("fax");
    let (status, response) = send_json(
        &app.router,
        "POST",
        "/api/v1/notifications/batch",
        Some(json!({ "notifications": [notification_body(), bad_item] })),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response["error"].as_str().expect("error message").contains("channel"));
}

#[tokio::test]
async fn missing_notification_is_not_found() {
    let app = test_app();

    let (status, _) = send_json(
        &app.router,
        "GET",
        &format!("/api/v1/notifications/{}", uuid::Uuid::new_v4()),
        None,
        &[],
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_flow_maps_conflicts() {
    let app = test_app();

    let (_, created) =
        send_json(&app.router, "POST", "/api/v1/notifications", Some(notification_body()), &[])
            .await;
    let id = created["id"].as_str().expect("id in response").to_string();
    let uri = format!("/api/v1/notifications/{id}");

    let (status, _) = send_json(&app.router, "DELETE", &uri, None, &[]).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send_json(&app.router, "DELETE", &uri, None, &[]).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().expect("error message").contains("already cancelled"));
}

#[tokio::test]
async fn sent_notification_is_not_cancellable() {
    let app = test_app();

    let (_, created) =
        send_json(&app.router, "POST", "/api/v1/notifications", Some(notification_body()), &[])
            .await;
    let id: uuid::Uuid =
        created["id"].as_str().expect("id in response").parse().expect("valid uuid");
    app.store.mark_sent(id.into(), "msg-1", Utc::now()).await.expect("mark sent");

    let (status, _) =
        send_json(&app.router, "DELETE", &format!("/api/v1/notifications/{id}"), None, &[])
            .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn list_paginates_and_filters() {
    let app = test_app();

    for _ in 0..3 {
        send_json(&app.router, "POST", "/api/v1/notifications", Some(notification_body()), &[])
            .await;
    }
    let mut email = notification_body();
    email["channel"] = json!("email");
    send_json(&app.router, "POST", "/api/v1/notifications", Some(email), &[]).await;

    let (status, body) =
        send_json(&app.router, "GET", "/api/v1/notifications?channel=sms&limit=2", None, &[])
            .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["page"], 1);
    assert_eq!(body["data"].as_array().expect("data array").len(), 2);
}

#[tokio::test]
async fn batch_endpoints_round_trip() {
    let app = test_app();

    let (status, batch) = send_json(
        &app.router,
        "POST",
        "/api/v1/notifications/batch",
        Some(json!({ "notifications": [notification_body(), notification_body()] })),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(batch["total"], 2);

    let batch_id = batch["id"].as_str().expect("batch id");
    let (status, body) =
        send_json(&app.router, "GET", &format!("/api/v1/batches/{batch_id}"), None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["batch"]["total"], 2);
    assert_eq!(body["notifications"].as_array().expect("children").len(), 2);
}

#[tokio::test]
async fn empty_batch_is_unprocessable() {
    let app = test_app();

    let (status, _) = send_json(
        &app.router,
        "POST",
        "/api/v1/notifications/batch",
        Some(json!({ "notifications": [] })),
        &[],
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn health_and_metrics_respond() {
    let app = test_app();

    let (status, body) = send_json(&app.router, "GET", "/health", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).expect("request"))
        .await
        .expect("metrics responds");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn correlation_id_is_echoed() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-correlation-id", "corr-123")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("handler responds");

    assert_eq!(
        response.headers().get("x-correlation-id").and_then(|v| v.to_str().ok()),
        Some("corr-123")
    );

    // A missing header is replaced by a generated ID.
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
        .await
        .expect("handler responds");
    assert!(response.headers().contains_key("x-correlation-id"));
}
