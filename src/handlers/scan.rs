//! Manual scan-cycle trigger. Spawned rather than awaited inline: a scan
//! cycle may run long against a slow warehouse, and the caller only needs
//! acknowledgement that one was kicked off, not its result.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ScanTriggerResponse {
    pub triggered: bool,
}

pub async fn trigger(State(state): State<Arc<AppState>>) -> Json<ScanTriggerResponse> {
    let scanner = state.scanner.clone();
    tokio::spawn(async move {
        if let Err(e) = scanner.scan_once().await {
            tracing::warn!(error = %e, "manually triggered scan cycle failed");
        }
    });
    Json(ScanTriggerResponse { triggered: true })
}
