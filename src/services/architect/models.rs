use serde::{Deserialize, Serialize};

use crate::models::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    RevertSchema,
    AddCast,
    NotifyTeam,
    PausePipeline,
    Investigate,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RevertSchema => "revert_schema",
            Self::AddCast => "add_cast",
            Self::NotifyTeam => "notify_team",
            Self::PausePipeline => "pause_pipeline",
            Self::Investigate => "investigate",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: RecommendedAction,
    pub description: String,
    pub sql: Option<String>,
    /// 1 = first.
    pub priority: u32,
}

/// Structured output of the Architect, persisted on the incident it diagnosed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub root_cause: String,
    pub root_cause_table: String,
    pub blast_radius: Vec<String>,
    pub severity: Severity,
    pub confidence: f64,
    pub recommendations: Vec<Recommendation>,
}

impl Diagnosis {
    /// `severity = anomaly.severity`, `confidence = 0.0`, zero external
    /// dependencies, always succeeds.
    pub fn fallback(table: &str, downstream: Vec<String>, severity: Severity) -> Self {
        Self {
            root_cause: "Automated diagnosis unavailable; manual investigation required.".to_string(),
            root_cause_table: table.to_string(),
            blast_radius: downstream,
            severity,
            confidence: 0.0,
            recommendations: vec![Recommendation {
                action: RecommendedAction::Investigate,
                description: "Manual investigation required.".to_string(),
                sql: None,
                priority: 1,
            }],
        }
    }
}
