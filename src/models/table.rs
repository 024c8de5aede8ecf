use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    Schema,
    Freshness,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Freshness => "freshness",
        }
    }
}

pub fn fully_qualified_name(schema: &str, table: &str) -> String {
    format!("{schema}.{table}")
}

/// A table registered for monitoring. `check_types` and `freshness_sla_minutes`
/// are stored as columns on the row but exposed through this typed view.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MonitoredTable {
    pub id: i64,
    pub connection_id: i64,
    pub schema_name: String,
    pub table_name: String,
    pub fully_qualified_name: String,
    /// JSON-encoded `Vec<CheckType>`.
    pub check_types: String,
    pub freshness_sla_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonitoredTable {
    pub fn checks(&self) -> Vec<CheckType> {
        serde_json::from_str(&self.check_types).unwrap_or_default()
    }

    pub fn has_check(&self, check: CheckType) -> bool {
        self.checks().contains(&check)
    }

    /// Freshness is only evaluable when both the check is enabled and an SLA is set.
    pub fn freshness_enabled(&self) -> bool {
        self.has_check(CheckType::Freshness) && self.freshness_sla_minutes.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMonitoredTableRequest {
    pub connection_id: i64,
    pub schema_name: String,
    pub table_name: String,
    pub check_types: Vec<CheckType>,
    pub freshness_sla_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateMonitoredTableRequest {
    pub check_types: Option<Vec<CheckType>>,
    pub freshness_sla_minutes: Option<Option<i64>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListTablesQuery {
    pub connection_id: Option<i64>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}
