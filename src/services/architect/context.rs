//! Everything the Architect is handed about one anomaly, serialized
//! verbatim as the chat request's user content.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Anomaly, ColumnDef, Severity, TraversalNode};

#[derive(Debug, Clone, Serialize)]
pub struct AnomalySummary {
    pub id: i64,
    pub anomaly_type: String,
    pub severity: Severity,
    pub detail: serde_json::Value,
    pub detected_at: DateTime<Utc>,
}

impl AnomalySummary {
    pub fn from_anomaly(anomaly: &Anomaly) -> Self {
        Self {
            id: anomaly.id,
            anomaly_type: anomaly.anomaly_type.clone(),
            severity: anomaly.severity(),
            detail: anomaly
                .detail()
                .ok()
                .and_then(|d| serde_json::to_value(d).ok())
                .unwrap_or(serde_json::Value::Null),
            detected_at: anomaly.detected_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub fqn: String,
    pub columns: Vec<ColumnDef>,
    pub latest_snapshot_hash: Option<String>,
    pub freshness_sla_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisContext {
    pub anomaly: AnomalySummary,
    pub table: TableSummary,
    pub upstream: Vec<TraversalNode>,
    pub downstream: Vec<TraversalNode>,
    /// Anomalies on this table and its 1-hop lineage neighbors, within the
    /// configured history window (default 30 days).
    pub recent_anomaly_history: Vec<AnomalySummary>,
}

pub const SYSTEM_PROMPT: &str = r#"You are a data reliability engineer diagnosing a data-quality anomaly \
in an analytical warehouse. You are given the anomaly, the table's upstream \
and downstream lineage, recent anomaly history, and table metadata. \
Respond with a single JSON object matching exactly this schema, no prose \
outside the object:
{
  "root_cause": string,
  "root_cause_table": string (a fully-qualified table name),
  "blast_radius": array of fully-qualified table names (may be a subset of the provided downstream tables),
  "severity": "critical" | "high" | "medium" | "low",
  "confidence": number between 0.0 and 1.0,
  "recommendations": [
    {
      "action": "revert_schema" | "add_cast" | "notify_team" | "pause_pipeline" | "investigate",
      "description": string,
      "sql": string or null,
      "priority": positive integer, 1 = first
    }
  ]
}"#;
