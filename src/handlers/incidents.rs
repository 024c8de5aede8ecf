//! Incident listing plus the `approve`/`dismiss` transitions and on-demand
//! report assembly.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::AppState;
use crate::models::{ApproveIncidentRequest, DismissIncidentRequest, Incident, ListIncidentsQuery, MonitoredTable};
use crate::services::incident_report;
use crate::utils::error::{ApiError, ApiResult};

#[derive(Debug, Serialize)]
pub struct ListIncidentsResponse {
    pub data: Vec<Incident>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListIncidentsQuery>,
) -> ApiResult<Json<ListIncidentsResponse>> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(50).clamp(1, 500);
    let offset = (page - 1) * page_size;

    let mut conditions = Vec::new();
    if params.status.is_some() {
        conditions.push("status = ?");
    }
    if params.severity.is_some() {
        conditions.push("severity = ?");
    }
    if params.table_id.is_some() {
        conditions.push("table_id = ?");
    }
    if params.since.is_some() {
        conditions.push("created_at >= ?");
    }
    let where_clause = if conditions.is_empty() { String::new() } else { format!("WHERE {}", conditions.join(" AND ")) };

    let count_sql = format!("SELECT COUNT(*) FROM incidents {where_clause}");
    let mut count_query = sqlx::query_scalar(&count_sql);
    if let Some(status) = &params.status {
        count_query = count_query.bind(status);
    }
    if let Some(severity) = &params.severity {
        count_query = count_query.bind(severity);
    }
    if let Some(table_id) = params.table_id {
        count_query = count_query.bind(table_id);
    }
    if let Some(since) = params.since {
        count_query = count_query.bind(since);
    }
    let total: i64 = count_query.fetch_one(&state.db).await?;

    let list_sql = format!("SELECT * FROM incidents {where_clause} ORDER BY created_at DESC LIMIT ? OFFSET ?");
    let mut list_query = sqlx::query_as(&list_sql);
    if let Some(status) = &params.status {
        list_query = list_query.bind(status);
    }
    if let Some(severity) = &params.severity {
        list_query = list_query.bind(severity);
    }
    if let Some(table_id) = params.table_id {
        list_query = list_query.bind(table_id);
    }
    if let Some(since) = params.since {
        list_query = list_query.bind(since);
    }
    let rows: Vec<Incident> = list_query.bind(page_size).bind(offset).fetch_all(&state.db).await?;

    Ok(Json(ListIncidentsResponse { data: rows, total, page, page_size }))
}

pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResult<Json<Incident>> {
    Ok(Json(load_incident(&state, id).await?))
}

/// 200 with the assembled report, or 204 when the incident hasn't finished
/// diagnosis yet (no diagnosis/remediation recorded).
pub async fn report(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResult<Response> {
    let incident = load_incident(&state, id).await?;

    let anomaly: Option<crate::models::Anomaly> = sqlx::query_as("SELECT * FROM anomalies WHERE id = ?")
        .bind(incident.anomaly_id)
        .fetch_optional(&state.db)
        .await?;
    let table: Option<MonitoredTable> = sqlx::query_as("SELECT * FROM monitored_tables WHERE id = ?")
        .bind(incident.table_id)
        .fetch_optional(&state.db)
        .await?;

    let (Some(anomaly), Some(table)) = (anomaly, table) else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let diagnosis: Option<crate::services::Diagnosis> = incident
        .diagnosis_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;
    let remediation: Option<crate::services::Remediation> = incident
        .remediation_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    if diagnosis.is_none() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let report = incident_report::assemble(&incident, &anomaly, &table, diagnosis.as_ref(), remediation.as_ref());
    Ok(Json(report).into_response())
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ApproveIncidentRequest>,
) -> ApiResult<Json<Incident>> {
    let incident = state.orchestrator.approve(id, req.note.as_deref()).await?;
    Ok(Json(incident))
}

pub async fn dismiss(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<DismissIncidentRequest>,
) -> ApiResult<Json<Incident>> {
    let incident = state.orchestrator.dismiss(id, req.reason.as_deref().unwrap_or("")).await?;
    Ok(Json(incident))
}

async fn load_incident(state: &AppState, id: i64) -> ApiResult<Incident> {
    sqlx::query_as("SELECT * FROM incidents WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("incident {id}")))
}
