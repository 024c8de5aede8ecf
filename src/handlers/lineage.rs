//! Lineage graph and traversal endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::AppState;
use crate::models::{BlastRadius, LineageGraph, TraversalNode};
use crate::utils::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct TraversalQuery {
    #[serde(default = "default_depth")]
    pub depth: u32,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_depth() -> u32 {
    3
}
fn default_min_confidence() -> f64 {
    0.5
}

pub async fn graph(State(state): State<Arc<AppState>>) -> ApiResult<Json<LineageGraph>> {
    Ok(Json(state.lineage.graph().await?))
}

pub async fn upstream(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<TraversalQuery>,
) -> ApiResult<Json<Vec<TraversalNode>>> {
    Ok(Json(state.lineage.upstream(&table, params.depth, params.min_confidence).await?))
}

pub async fn downstream(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<TraversalQuery>,
) -> ApiResult<Json<Vec<TraversalNode>>> {
    Ok(Json(state.lineage.downstream(&table, params.depth, params.min_confidence).await?))
}

pub async fn blast_radius(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<TraversalQuery>,
) -> ApiResult<Json<BlastRadius>> {
    Ok(Json(state.lineage.blast_radius(&table, params.depth, params.min_confidence).await?))
}
