//! Aggregate dashboard counters. Cheap, uncached `COUNT`/`GROUP BY` queries —
//! this surface is polled at dashboard-refresh cadence, not request rate.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;
use crate::utils::error::ApiResult;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub active_connections: i64,
    pub monitored_tables: i64,
    pub incidents_by_status: IncidentsByStatus,
    pub anomalies_last_24h: i64,
    pub lineage_edges: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct IncidentsByStatus {
    pub investigating: i64,
    pub pending_review: i64,
    pub resolved: i64,
    pub dismissed: i64,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatsResponse>> {
    let active_connections: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM connections WHERE is_active = 1").fetch_one(&state.db).await?;
    let monitored_tables: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM monitored_tables").fetch_one(&state.db).await?;
    let lineage_edges: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lineage_edges").fetch_one(&state.db).await?;
    let anomalies_last_24h: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM anomalies WHERE detected_at >= datetime('now', '-1 day')")
            .fetch_one(&state.db)
            .await?;

    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM incidents GROUP BY status").fetch_all(&state.db).await?;
    let mut incidents_by_status = IncidentsByStatus::default();
    for (status, count) in rows {
        match status.as_str() {
            "investigating" => incidents_by_status.investigating = count,
            "pending_review" => incidents_by_status.pending_review = count,
            "resolved" => incidents_by_status.resolved = count,
            "dismissed" => incidents_by_status.dismissed = count,
            _ => {},
        }
    }

    Ok(Json(StatsResponse {
        active_connections,
        monitored_tables,
        incidents_by_status,
        anomalies_last_24h,
        lineage_edges,
    }))
}
