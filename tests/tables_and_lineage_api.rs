//! Monitored-table CRUD and the lineage traversal endpoints, including the
//! cross-resource validation (a table can't be created against a connection
//! that doesn't exist).

mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::util::ServiceExt;

fn authed(method: &str, path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {}", common::API_KEY))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn create_table_requires_an_existing_connection() {
    let pool = common::create_test_db().await;
    let app = common::test_app(pool).await;

    let req = authed(
        "POST",
        "/api/v1/tables",
        json!({
            "connection_id": 999,
            "schema_name": "analytics",
            "table_name": "orders",
            "check_types": ["schema"],
            "freshness_sla_minutes": null
        }),
    );
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_table_and_filter_list_by_connection() {
    let pool = common::create_test_db().await;
    let connection_id = common::seed_connection(&pool).await;
    let app = common::test_app(pool).await;

    let req = authed(
        "POST",
        "/api/v1/tables",
        json!({
            "connection_id": connection_id,
            "schema_name": "analytics",
            "table_name": "orders",
            "check_types": ["schema", "freshness"],
            "freshness_sla_minutes": 60
        }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(created["fully_qualified_name"], "analytics.orders");

    let req = Request::builder()
        .uri(format!("/api/v1/tables?connection_id={connection_id}"))
        .header(header::AUTHORIZATION, format!("Bearer {}", common::API_KEY))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn lineage_graph_reflects_ingested_edges() {
    let pool = common::create_test_db().await;
    let lineage = aegis::services::LineageEngine::new(pool.clone());
    lineage.ingest_query("INSERT INTO analytics.orders SELECT * FROM raw.orders_staging").await.unwrap();

    let app = common::test_app(pool).await;

    let req = Request::builder()
        .uri("/api/v1/lineage/graph")
        .header(header::AUTHORIZATION, format!("Bearer {}", common::API_KEY))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let graph: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert!(!graph["edges"].as_array().unwrap().is_empty());

    let req = Request::builder()
        .uri("/api/v1/lineage/raw.orders_staging/downstream?depth=2")
        .header(header::AUTHORIZATION, format!("Bearer {}", common::API_KEY))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let nodes: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert!(nodes.as_array().unwrap().iter().any(|n| n["table"] == "analytics.orders"));
}
