use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn max(self, other: Self) -> Self {
        std::cmp::max(self, other)
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    SchemaDrift,
    FreshnessViolation,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaDrift => "schema_drift",
            Self::FreshnessViolation => "freshness_violation",
        }
    }
}

impl std::str::FromStr for AnomalyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "schema_drift" => Ok(Self::SchemaDrift),
            "freshness_violation" => Ok(Self::FreshnessViolation),
            other => Err(format!("unknown anomaly type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnChangeKind {
    ColumnAdded,
    ColumnDeleted,
    ColumnTypeChanged,
    ColumnRenamed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnChange {
    pub kind: ColumnChangeKind,
    pub column: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub nullable: Option<bool>,
}

/// Tagged variant per anomaly kind, the typed boundary representation of
/// `Anomaly.detail`; the store holds the serialized form only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyDetail {
    SchemaDrift { changes: Vec<ColumnChange> },
    FreshnessViolation { last_update: DateTime<Utc>, sla_minutes: i64, minutes_overdue: i64 },
}

/// A raw detector signal, immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Anomaly {
    pub id: i64,
    pub table_id: i64,
    pub anomaly_type: String,
    pub severity: String,
    pub detail_json: String,
    pub detected_at: DateTime<Utc>,
}

impl Anomaly {
    pub fn detail(&self) -> Result<AnomalyDetail, serde_json::Error> {
        serde_json::from_str(&self.detail_json)
    }

    pub fn kind(&self) -> AnomalyType {
        self.anomaly_type.parse().unwrap_or(AnomalyType::SchemaDrift)
    }

    pub fn severity(&self) -> Severity {
        self.severity.parse().unwrap_or(Severity::Low)
    }
}
