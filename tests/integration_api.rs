//! API integration tests over the in-memory store

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use serde_json::json;

use merlyn_bills::audit::verify_hash_chain;

mod common;

use common::{active_user, admin, as_user, decimal, send, setup_app};

async fn create_auction(app: &axum::Router, base_price: u32) -> String {
    let now = Utc::now();
    let (status, body) = admin(
        app,
        "POST",
        "/admin/auctions",
        Some(json!({
            "title": "Calculadora científica",
            "basePrice": base_price,
            "startDate": (now - Duration::hours(1)).to_rfc3339(),
            "endDate": (now + Duration::days(2)).to_rfc3339(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "auction creation failed: {}", body);
    body["auction"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_needs_no_key() {
    let (app, _) = setup_app();
    let response = tower::ServiceExt::oneshot(
        app,
        axum::http::Request::builder()
            .uri("/health")
            .body(axum::body::Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_authentication_and_permissions() {
    let (app, _) = setup_app();

    let (status, body) = send(&app, "GET", "/users", None, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "missing_api_key");

    let (status, _) = send(&app, "GET", "/users", Some("wrong"), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let grant = json!({ "id": "u1", "amount": 5 });
    let (status, body) = as_user(&app, "u1", "POST", "/admin/points", Some(grant)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "permission_denied");

    let (status, _) = as_user(&app, "u1", "POST", "/users/u1/approve", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) =
        send(&app, "GET", "/users", Some(common::SERVICE_KEY), Some("  "), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_body_is_invalid_request() {
    let (app, _) = setup_app();
    let (status, body) = admin(&app, "POST", "/admin/points", Some(json!({ "id": "u1" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");
}

#[tokio::test]
async fn test_points_flow() {
    let (app, _) = setup_app();
    active_user(&app, "u1", "Ana").await;

    let (status, body) = admin(
        &app,
        "POST",
        "/admin/points",
        Some(json!({ "id": "u1", "amount": 40, "observation": "Taller" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["record"]["type"], "Asignación");

    let (status, body) = as_user(&app, "u1", "GET", "/points", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["points"]), dec!(50));
    assert_eq!(decimal(&body["availablePoints"]), dec!(50));

    // Deduction larger than the balance
    let deduction = json!({ "id": "u1", "amount": -80 });
    let (status, body) = admin(&app, "POST", "/admin/points", Some(deduction)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "insufficient_balance");

    let (status, body) = admin(&app, "GET", "/users/u1/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, _) = admin(&app, "GET", "/points?userId=ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_auction_lifecycle() {
    let (app, _) = setup_app();
    active_user(&app, "u1", "Ana").await;
    active_user(&app, "u2", "Luis").await;
    let auction_id = create_auction(&app, 2).await;

    let bid = |user: &'static str, amount: u32| {
        json!({ "auctionId": auction_id, "userId": user, "amount": amount })
    };

    let (status, body) = as_user(&app, "u1", "POST", "/auctions/bid", Some(bid("u1", 4))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["auction"]["highestBid"]), dec!(4));

    let (status, body) = as_user(&app, "u2", "POST", "/auctions/bid", Some(bid("u2", 4))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "bid_too_low");

    let (status, _) = as_user(&app, "u2", "POST", "/auctions/bid", Some(bid("u2", 7))).await;
    assert_eq!(status, StatusCode::OK);

    // Bids hold points without debiting them
    let (_, body) = as_user(&app, "u2", "GET", "/points", None).await;
    assert_eq!(decimal(&body["points"]), dec!(10));
    assert_eq!(decimal(&body["committedPoints"]), dec!(7));
    assert_eq!(decimal(&body["availablePoints"]), dec!(3));

    let (status, body) = as_user(&app, "u1", "GET", "/auctions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = admin(
        &app,
        "POST",
        "/admin/auctions/status",
        Some(json!({ "id": auction_id, "status": "Finalizada" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    assert_eq!(body["winner"]["userId"], "u2");
    assert_eq!(body["auction"]["status"], "Finalizada");

    // Closed auctions leave the open listing and release committed points
    let (_, body) = as_user(&app, "u1", "GET", "/auctions", None).await;
    assert!(body.as_array().unwrap().is_empty());
    let (_, body) = as_user(&app, "u2", "GET", "/points", None).await;
    assert_eq!(decimal(&body["availablePoints"]), dec!(10));

    let (status, _) = as_user(&app, "u1", "POST", "/auctions/bid", Some(bid("u1", 9))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = admin(
        &app,
        "POST",
        "/admin/auctions/status",
        Some(json!({ "id": auction_id, "status": "Cancelada" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);
}

#[tokio::test]
async fn test_exchange_workflow_and_stats() {
    let (app, _) = setup_app();
    active_user(&app, "u1", "Ana").await;
    active_user(&app, "u2", "Luis").await;

    let (status, body) =
        admin(&app, "PUT", "/admin/exchange-rate", Some(json!({ "rate": 5 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["previous"]), dec!(100));

    let (status, body) = as_user(
        &app,
        "u1",
        "POST",
        "/exchanges",
        Some(json!({ "type": "Puntos académicos", "amount": 10, "description": "Final" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let request_id = body["request"]["id"].as_str().unwrap().to_string();

    // Users only see their own requests
    let (status, _) = as_user(&app, "u2", "GET", "/exchanges?userId=u1", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, body) = as_user(&app, "u2", "GET", "/exchanges", None).await;
    assert!(body.as_array().unwrap().is_empty());
    let (_, body) = admin(&app, "GET", "/exchanges?status=Pendiente", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    // Rate changes after the request do not affect it
    let (status, _) = admin(&app, "PUT", "/admin/exchange-rate", Some(json!({ "rate": 2 }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = admin(
        &app,
        "POST",
        "/admin/exchanges/review",
        Some(json!({ "id": request_id, "status": "Aprobado" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"]["status"], "Aprobado");
    assert_eq!(decimal(&body["updated"]["academicPoints"]), dec!(2));
    assert_eq!(body["badgesAwarded"], json!(["first_exchange"]));

    let (_, body) = as_user(&app, "u1", "GET", "/points", None).await;
    assert_eq!(decimal(&body["points"]), dec!(0));

    let (status, body) = as_user(&app, "u1", "GET", "/badges/u1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["badges"], json!(["first_exchange"]));

    let (status, body) = as_user(&app, "u1", "GET", "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalExchanges"], 1);
    assert_eq!(body["ranking"][0]["userId"], "u2");

    let (status, body) = as_user(&app, "u1", "GET", "/stats?limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ranking"].as_array().unwrap().len(), 1);

    let (status, body) = as_user(&app, "u1", "GET", "/stats/users/u1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exchanges"], 1);
}

#[tokio::test]
async fn test_audit_chain_covers_every_mutation() {
    let (app, repository) = setup_app();
    active_user(&app, "u1", "Ana").await;
    admin(&app, "POST", "/admin/points", Some(json!({ "id": "u1", "amount": 3 }))).await;
    admin(&app, "POST", "/announcements", Some(json!({ "message": "Bienvenidos" }))).await;

    let (status, body) = admin(&app, "GET", "/admin/audit/verify", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isValid"], true);
    assert_eq!(body["entriesChecked"], 4);

    let (_, body) = admin(&app, "GET", "/admin/audit?limit=2", None).await;
    assert_eq!(body["total"], 4);
    assert_eq!(body["entries"].as_array().unwrap().len(), 2);

    let economy = repository.load().await.unwrap();
    assert!(verify_hash_chain(economy.audit_logs()).is_valid);
}

#[tokio::test]
async fn test_announcements_are_admin_only_to_post() {
    let (app, _) = setup_app();

    let message = json!({ "message": "Hola" });
    let (status, _) = as_user(&app, "u1", "POST", "/announcements", Some(message.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = admin(&app, "POST", "/announcements", Some(message)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = as_user(&app, "u1", "GET", "/announcements", None).await;
    assert_eq!(body[0]["message"], "Hola");
}

#[tokio::test]
async fn test_maintenance_mode_blocks_user_operations() {
    let (app, _) = setup_app();
    active_user(&app, "u1", "Ana").await;

    let maintenance = json!({ "maintenanceMode": true });
    let (status, body) = admin(&app, "PUT", "/admin/config", Some(maintenance)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["maintenanceMode"], true);

    let (status, body) = as_user(
        &app,
        "u1",
        "POST",
        "/exchanges",
        Some(json!({ "type": "Bono", "amount": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error_code"], "maintenance");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_assignments_are_not_lost() {
    let (app, _) = setup_app();
    active_user(&app, "u1", "Ana").await;

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let app = app.clone();
        tasks.push(tokio::spawn(async move {
            admin(&app, "POST", "/admin/points", Some(json!({ "id": "u1", "amount": 1 }))).await.0
        }));
    }

    let mut succeeded: i64 = 0;
    for task in tasks {
        let status = task.await.unwrap();
        assert!(
            status == StatusCode::OK || status == StatusCode::SERVICE_UNAVAILABLE,
            "unexpected status {}",
            status
        );
        if status == StatusCode::OK {
            succeeded += 1;
        }
    }

    // Every acknowledged assignment is reflected in the balance and history
    let (_, body) = admin(&app, "GET", "/points?userId=u1", None).await;
    assert_eq!(decimal(&body["points"]), rust_decimal::Decimal::from(10 + succeeded));
    let (_, history) = admin(&app, "GET", "/users/u1/history", None).await;
    assert_eq!(history.as_array().unwrap().len() as i64, 1 + succeeded);
}
