//! Common test utilities

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::util::ServiceExt;

use merlyn_bills::aggregate::SystemConfig;
use merlyn_bills::api::{ApiKeys, AppState};
use merlyn_bills::store::{EconomyRepository, MemoryAggregateStore};
use merlyn_bills::Balance;

pub const ADMIN_KEY: &str = "test-admin-key";
pub const SERVICE_KEY: &str = "test-service-key";

/// App over a fresh in-memory store; approved users start with 10 MB
pub fn setup_app() -> (Router, EconomyRepository) {
    let seed = SystemConfig {
        default_points: Balance::new(rust_decimal::Decimal::TEN).unwrap(),
        ..SystemConfig::default()
    };
    let repository = EconomyRepository::new(Arc::new(MemoryAggregateStore::new()), seed);
    let state = AppState::new(repository.clone(), ApiKeys::new(ADMIN_KEY, SERVICE_KEY));
    (merlyn_bills::build_router(state), repository)
}

/// One request against `/api/v1`; returns the status and the decoded body
pub async fn send(
    app: &Router,
    method: &str,
    path: &str,
    api_key: Option<&str>,
    user_id: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(format!("/api/v1{}", path))
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("X-API-Key", key);
    }
    if let Some(user) = user_id {
        builder = builder.header("X-Request-User-Id", user);
    }
    let body = body.map_or_else(Body::empty, |v| Body::from(v.to_string()));

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

pub async fn admin(
    app: &Router,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send(app, method, path, Some(ADMIN_KEY), None, body).await
}

pub async fn as_user(
    app: &Router,
    user_id: &str,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send(app, method, path, Some(SERVICE_KEY), Some(user_id), body).await
}

/// Register and approve a user
pub async fn active_user(app: &Router, id: &str, first_name: &str) {
    let (status, _) = as_user(
        app,
        id,
        "POST",
        "/users",
        Some(serde_json::json!({ "id": id, "firstName": first_name, "lastName": "Test" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "registration of {} failed", id);

    let (status, _) = admin(app, "POST", &format!("/users/{}/approve", id), None).await;
    assert_eq!(status, StatusCode::OK, "approval of {} failed", id);
}

/// Decimal fields serialize as strings
pub fn decimal(value: &Value) -> rust_decimal::Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}
