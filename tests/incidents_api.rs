//! Incident lifecycle exercised through the HTTP surface: listing, the
//! assembled report, and the approve/dismiss transitions, including the
//! bearer-auth gate in front of all of it.

mod common;

use std::sync::Arc;

use aegis::services::{Architect, LineageEngine, Notifier, Orchestrator};
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tower::util::ServiceExt;

async fn seed_incident(pool: &sqlx::SqlitePool) -> (i64, i64) {
    let connection_id = common::seed_connection(pool).await;
    let table_id = common::seed_table(pool, connection_id).await;
    let anomaly_id = common::seed_anomaly(pool, table_id).await;

    let anomaly: aegis::models::Anomaly =
        sqlx::query_as("SELECT * FROM anomalies WHERE id = ?").bind(anomaly_id).fetch_one(pool).await.unwrap();
    let table: aegis::models::MonitoredTable =
        sqlx::query_as("SELECT * FROM monitored_tables WHERE id = ?").bind(table_id).fetch_one(pool).await.unwrap();

    let orchestrator =
        Orchestrator::new(pool.clone(), Architect::new(None), LineageEngine::new(pool.clone()), Arc::new(Notifier::new()));
    let incident = orchestrator.handle_anomaly(&anomaly, &table).await.unwrap();
    (incident.id, table_id)
}

fn authed_get(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {}", common::API_KEY))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn protected_routes_reject_missing_credential() {
    let pool = common::create_test_db().await;
    let app = common::test_app(pool).await;

    let req = Request::builder().uri("/api/v1/incidents").body(Body::empty()).unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_is_reachable_without_a_credential() {
    let pool = common::create_test_db().await;
    let app = common::test_app(pool).await;

    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn list_and_report_reflect_a_freshly_created_incident() {
    let pool = common::create_test_db().await;
    let (incident_id, _table_id) = seed_incident(&pool).await;
    let app = common::test_app(pool).await;

    let response = app.clone().oneshot(authed_get("/api/v1/incidents")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["status"], "pending_review");

    let response = app.oneshot(authed_get(&format!("/api/v1/incidents/{incident_id}/report"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["anomaly_type"], "schema_drift");
    assert_eq!(body["status"], "pending_review");
}

#[tokio::test]
async fn approve_transitions_to_resolved_and_rejects_a_second_approval() {
    let pool = common::create_test_db().await;
    let (incident_id, _table_id) = seed_incident(&pool).await;
    let app = common::test_app(pool).await;

    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/incidents/{incident_id}/approve"))
        .header(header::AUTHORIZATION, format!("Bearer {}", common::API_KEY))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["status"], "resolved");

    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/incidents/{incident_id}/approve"))
        .header(header::AUTHORIZATION, format!("Bearer {}", common::API_KEY))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dismiss_without_a_reason_is_rejected() {
    let pool = common::create_test_db().await;
    let (incident_id, _table_id) = seed_incident(&pool).await;
    let app = common::test_app(pool).await;

    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/incidents/{incident_id}/dismiss"))
        .header(header::AUTHORIZATION, format!("Bearer {}", common::API_KEY))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/incidents/{incident_id}/dismiss"))
        .header(header::AUTHORIZATION, format!("Bearer {}", common::API_KEY))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({ "reason": "" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/incidents/{incident_id}/dismiss"))
        .header(header::AUTHORIZATION, format!("Bearer {}", common::API_KEY))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({ "reason": "known false positive" }).to_string()))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["status"], "dismissed");
}

#[tokio::test]
async fn missing_incident_is_a_404() {
    let pool = common::create_test_db().await;
    let app = common::test_app(pool).await;

    let response = app.oneshot(authed_get("/api/v1/incidents/999")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
