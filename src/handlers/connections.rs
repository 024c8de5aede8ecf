//! Connection CRUD plus the probe/discover/confirm trio that turns a raw
//! warehouse credential into a set of monitored tables.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::models::{
    ConfirmDiscoveryRequest, Connection, ConnectionResponse, CreateConnectionRequest, Dialect,
    UpdateConnectionRequest,
};
use crate::services::warehouse::create_connector;
use crate::utils::encryption;
use crate::utils::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize, Default)]
pub struct ListConnectionsQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListConnectionsResponse {
    pub data: Vec<ConnectionResponse>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Serialize)]
pub struct TestConnectionResponse {
    pub ok: bool,
    pub schemas_found: Option<usize>,
    pub error: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListConnectionsQuery>,
) -> ApiResult<Json<ListConnectionsResponse>> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(20).clamp(1, 200);
    let offset = (page - 1) * page_size;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM connections").fetch_one(&state.db).await?;
    let rows: Vec<Connection> = sqlx::query_as("SELECT * FROM connections ORDER BY created_at DESC LIMIT ? OFFSET ?")
        .bind(page_size)
        .bind(offset)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(ListConnectionsResponse {
        data: rows.into_iter().map(ConnectionResponse::from).collect(),
        total,
        page,
        page_size,
    }))
}

pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResult<Json<ConnectionResponse>> {
    let connection = load_connection(&state, id).await?;
    Ok(Json(connection.into()))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConnectionRequest>,
) -> ApiResult<Json<ConnectionResponse>> {
    if req.name.trim().is_empty() {
        return Err(ApiError::validation_error("name must not be empty"));
    }
    if req.uri.trim().is_empty() {
        return Err(ApiError::validation_error("uri must not be empty"));
    }

    let ciphertext = encryption::encrypt(&req.uri, &state.config.security.encryption_key)
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO connections (name, dialect, uri_ciphertext, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, 1, ?, ?)",
    )
    .bind(&req.name)
    .bind(req.dialect.as_str())
    .bind(&ciphertext)
    .bind(now)
    .bind(now)
    .execute(&state.db)
    .await?;

    let connection = load_connection(&state, result.last_insert_rowid()).await?;
    Ok(Json(connection.into()))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateConnectionRequest>,
) -> ApiResult<Json<ConnectionResponse>> {
    let existing = load_connection(&state, id).await?;

    let name = req.name.unwrap_or(existing.name);
    let is_active = req.is_active.unwrap_or(existing.is_active);
    let uri_ciphertext = match req.uri {
        Some(uri) => encryption::encrypt(&uri, &state.config.security.encryption_key)
            .map_err(|e| ApiError::internal_error(e.to_string()))?,
        None => existing.uri_ciphertext,
    };

    sqlx::query(
        "UPDATE connections SET name = ?, uri_ciphertext = ?, is_active = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(&uri_ciphertext)
    .bind(is_active)
    .bind(Utc::now())
    .bind(id)
    .execute(&state.db)
    .await?;

    let connection = load_connection(&state, id).await?;
    Ok(Json(connection.into()))
}

pub async fn delete(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResult<Json<serde_json::Value>> {
    load_connection(&state, id).await?;
    sqlx::query("DELETE FROM connections WHERE id = ?").bind(id).execute(&state.db).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Decrypts and instantiates a connector, runs a trivial `list_schemas`
/// probe, and disposes it. Never returns a transport error: connectivity
/// failures surface in the response body, not as a 5xx.
pub async fn test(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResult<Json<TestConnectionResponse>> {
    let connection = load_connection(&state, id).await?;
    let connector = build_connector(&state, &connection)?;

    let response = match connector.list_schemas().await {
        Ok(schemas) => TestConnectionResponse { ok: true, schemas_found: Some(schemas.len()), error: None },
        Err(e) => TestConnectionResponse { ok: false, schemas_found: None, error: Some(e.to_string()) },
    };
    connector.dispose().await;

    Ok(Json(response))
}

pub async fn discover(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<crate::models::DiscoveryReport>> {
    let connection = load_connection(&state, id).await?;
    let connector = build_connector(&state, &connection)?;

    let report = state.investigator.discover(connector.as_ref(), &connection, &state.lineage).await;
    connector.dispose().await;

    Ok(Json(report))
}

/// Idempotent: selections already present in `monitored_tables` (matched by
/// `connection_id` + `fully_qualified_name`) are skipped silently.
pub async fn confirm_discovery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ConfirmDiscoveryRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    load_connection(&state, id).await?;

    let mut inserted = 0u32;
    for selection in &req.table_selections {
        let fqn = crate::models::fully_qualified_name(&selection.schema, &selection.table);
        let already_monitored: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM monitored_tables WHERE connection_id = ? AND fully_qualified_name = ?",
        )
        .bind(id)
        .bind(&fqn)
        .fetch_optional(&state.db)
        .await?;
        if already_monitored.is_some() {
            continue;
        }

        let check_types = serde_json::to_string(&selection.check_types)?;
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO monitored_tables \
             (connection_id, schema_name, table_name, fully_qualified_name, check_types, freshness_sla_minutes, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&selection.schema)
        .bind(&selection.table)
        .bind(&fqn)
        .bind(&check_types)
        .bind(selection.freshness_sla_minutes)
        .bind(now)
        .bind(now)
        .execute(&state.db)
        .await?;
        inserted += 1;
    }

    Ok(Json(serde_json::json!({ "inserted": inserted })))
}

async fn load_connection(state: &AppState, id: i64) -> ApiResult<Connection> {
    sqlx::query_as("SELECT * FROM connections WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("connection {id}")))
}

fn build_connector(state: &AppState, connection: &Connection) -> ApiResult<Box<dyn crate::services::WarehouseConnector>> {
    let dialect = connection
        .dialect()
        .map_err(|e| ApiError::internal_error(format!("stored connection has invalid dialect: {e}")))?;
    let uri = encryption::decrypt(&connection.uri_ciphertext, &state.config.security.encryption_key)
        .map_err(|e| ApiError::internal_error(e.to_string()))?;
    Ok(create_connector(dialect, &uri))
}
