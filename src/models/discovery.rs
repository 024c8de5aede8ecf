//! Transient report shapes for the Investigator. Never persisted; these live
//! only as API request/response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::table::CheckType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRole {
    Fact,
    Dimension,
    Staging,
    Raw,
    Snapshot,
    System,
    Unknown,
}

impl TableRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Dimension => "dimension",
            Self::Staging => "staging",
            Self::Raw => "raw",
            Self::Snapshot => "snapshot",
            Self::System => "system",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableProposal {
    pub schema: String,
    pub table: String,
    pub fqn: String,
    pub role: TableRole,
    pub columns: Vec<crate::models::schema_snapshot::ColumnDef>,
    pub recommended_checks: Vec<CheckType>,
    pub suggested_sla_minutes: Option<i64>,
    pub reasoning: String,
    pub skip: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub connection_id: i64,
    pub connection_name: String,
    pub schemas_found: Vec<String>,
    pub total_tables: usize,
    pub proposals: Vec<TableProposal>,
    pub concerns: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaAction {
    New,
    Dropped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDelta {
    pub action: DeltaAction,
    pub schema: String,
    pub table: String,
    pub fqn: String,
    pub proposal: Option<TableProposal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableSelection {
    pub schema: String,
    pub table: String,
    pub check_types: Vec<CheckType>,
    pub freshness_sla_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmDiscoveryRequest {
    pub table_selections: Vec<TableSelection>,
}
