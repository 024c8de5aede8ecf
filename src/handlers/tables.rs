//! Monitored-table CRUD.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;
use crate::models::{CreateMonitoredTableRequest, ListTablesQuery, MonitoredTable, UpdateMonitoredTableRequest};
use crate::utils::error::{ApiError, ApiResult};

#[derive(Debug, Serialize)]
pub struct ListTablesResponse {
    pub data: Vec<MonitoredTable>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTablesQuery>,
) -> ApiResult<Json<ListTablesResponse>> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(50).clamp(1, 500);
    let offset = (page - 1) * page_size;

    let (total, rows): (i64, Vec<MonitoredTable>) = match params.connection_id {
        Some(connection_id) => {
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM monitored_tables WHERE connection_id = ?")
                .bind(connection_id)
                .fetch_one(&state.db)
                .await?;
            let rows = sqlx::query_as(
                "SELECT * FROM monitored_tables WHERE connection_id = ? ORDER BY fully_qualified_name LIMIT ? OFFSET ?",
            )
            .bind(connection_id)
            .bind(page_size)
            .bind(offset)
            .fetch_all(&state.db)
            .await?;
            (total, rows)
        },
        None => {
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM monitored_tables").fetch_one(&state.db).await?;
            let rows = sqlx::query_as("SELECT * FROM monitored_tables ORDER BY fully_qualified_name LIMIT ? OFFSET ?")
                .bind(page_size)
                .bind(offset)
                .fetch_all(&state.db)
                .await?;
            (total, rows)
        },
    };

    Ok(Json(ListTablesResponse { data: rows, total, page, page_size }))
}

pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResult<Json<MonitoredTable>> {
    Ok(Json(load_table(&state, id).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMonitoredTableRequest>,
) -> ApiResult<Json<MonitoredTable>> {
    let connection_exists: Option<i64> =
        sqlx::query_scalar("SELECT id FROM connections WHERE id = ?").bind(req.connection_id).fetch_optional(&state.db).await?;
    if connection_exists.is_none() {
        return Err(ApiError::not_found(format!("connection {}", req.connection_id)));
    }

    let fqn = crate::models::fully_qualified_name(&req.schema_name, &req.table_name);

    let already_enrolled: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM monitored_tables WHERE connection_id = ? AND schema_name = ? AND table_name = ?",
    )
    .bind(req.connection_id)
    .bind(&req.schema_name)
    .bind(&req.table_name)
    .fetch_optional(&state.db)
    .await?;
    if already_enrolled.is_some() {
        return Err(ApiError::duplicate_enrollment(format!("{fqn} is already monitored on this connection")));
    }

    let check_types = serde_json::to_string(&req.check_types)?;
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO monitored_tables \
         (connection_id, schema_name, table_name, fully_qualified_name, check_types, freshness_sla_minutes, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(req.connection_id)
    .bind(&req.schema_name)
    .bind(&req.table_name)
    .bind(&fqn)
    .bind(&check_types)
    .bind(req.freshness_sla_minutes)
    .bind(now)
    .bind(now)
    .execute(&state.db)
    .await?;

    Ok(Json(load_table(&state, result.last_insert_rowid()).await?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateMonitoredTableRequest>,
) -> ApiResult<Json<MonitoredTable>> {
    let existing = load_table(&state, id).await?;

    let check_types = match req.check_types {
        Some(types) => serde_json::to_string(&types)?,
        None => existing.check_types,
    };
    let freshness_sla_minutes = req.freshness_sla_minutes.unwrap_or(existing.freshness_sla_minutes);

    sqlx::query("UPDATE monitored_tables SET check_types = ?, freshness_sla_minutes = ?, updated_at = ? WHERE id = ?")
        .bind(&check_types)
        .bind(freshness_sla_minutes)
        .bind(Utc::now())
        .bind(id)
        .execute(&state.db)
        .await?;

    Ok(Json(load_table(&state, id).await?))
}

pub async fn delete(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResult<Json<serde_json::Value>> {
    load_table(&state, id).await?;
    sqlx::query("DELETE FROM monitored_tables WHERE id = ?").bind(id).execute(&state.db).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn load_table(state: &AppState, id: i64) -> ApiResult<MonitoredTable> {
    sqlx::query_as("SELECT * FROM monitored_tables WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("monitored table {id}")))
}
