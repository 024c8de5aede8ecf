use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Investigating,
    PendingReview,
    Resolved,
    Dismissed,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Investigating => "investigating",
            Self::PendingReview => "pending_review",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }

    /// `resolved`/`dismissed` are terminal: no further transitions succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Dismissed)
    }
}

impl std::str::FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "investigating" => Ok(Self::Investigating),
            "pending_review" => Ok(Self::PendingReview),
            "resolved" => Ok(Self::Resolved),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(format!("unknown incident status: {other}")),
        }
    }
}

/// A user-facing, deduplicated and diagnosed grouping. At most one row with
/// `is_active()` true exists per `(table_id, anomaly_type)`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Incident {
    pub id: i64,
    pub table_id: i64,
    pub anomaly_id: i64,
    pub anomaly_type: String,
    pub status: String,
    pub severity: String,
    pub diagnosis_json: Option<String>,
    pub remediation_json: Option<String>,
    pub blast_radius_json: Option<String>,
    pub incident_report_json: Option<String>,
    pub error: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub dismiss_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Incident {
    pub fn status(&self) -> IncidentStatus {
        self.status.parse().unwrap_or(IncidentStatus::Investigating)
    }

    pub fn is_active(&self) -> bool {
        !self.status().is_terminal()
    }

    pub fn severity(&self) -> Severity {
        self.severity.parse().unwrap_or(Severity::Low)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListIncidentsQuery {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub table_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApproveIncidentRequest {
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DismissIncidentRequest {
    pub reason: Option<String>,
}
