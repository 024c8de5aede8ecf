//! Executor: pure transformation from a `Diagnosis` into a `Remediation`
//! plan. No I/O, no SQL execution — only planning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::architect::Diagnosis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStatus {
    PendingApproval,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationAction {
    /// Mirrors `Recommendation.action`.
    pub r#type: String,
    pub description: String,
    pub sql: Option<String>,
    pub status: RemediationStatus,
    pub priority: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remediation {
    pub actions: Vec<RemediationAction>,
    pub summary: String,
    pub generated_at: DateTime<Utc>,
}

pub struct Executor;

impl Executor {
    /// `status` is `pending_approval` iff the recommendation carries SQL,
    /// else `manual`. Ordering is preserved from the diagnosis.
    pub fn plan(diagnosis: &Diagnosis) -> Remediation {
        let actions: Vec<RemediationAction> = diagnosis
            .recommendations
            .iter()
            .map(|r| RemediationAction {
                r#type: r.action.as_str().to_string(),
                description: r.description.clone(),
                sql: r.sql.clone(),
                status: if r.sql.is_some() {
                    RemediationStatus::PendingApproval
                } else {
                    RemediationStatus::Manual
                },
                priority: r.priority,
            })
            .collect();

        let summary = Self::summarize(diagnosis, &actions);

        Remediation { actions, summary, generated_at: Utc::now() }
    }

    fn summarize(diagnosis: &Diagnosis, actions: &[RemediationAction]) -> String {
        let pending_sql = actions.iter().filter(|a| a.status == RemediationStatus::PendingApproval).count();
        if actions.is_empty() {
            return format!("No remediation actions for {}.", diagnosis.root_cause_table);
        }
        if pending_sql == 0 {
            format!(
                "{} action(s) recommended for {}, all requiring manual follow-up.",
                actions.len(),
                diagnosis.root_cause_table
            )
        } else {
            format!(
                "{} action(s) recommended for {}, {} awaiting SQL approval.",
                actions.len(),
                diagnosis.root_cause_table,
                pending_sql
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use crate::services::architect::{Recommendation, RecommendedAction};

    fn diagnosis(recommendations: Vec<Recommendation>) -> Diagnosis {
        Diagnosis {
            root_cause: "column type changed".to_string(),
            root_cause_table: "analytics.orders".to_string(),
            blast_radius: vec!["mart.revenue".to_string()],
            severity: Severity::Critical,
            confidence: 0.8,
            recommendations,
        }
    }

    #[test]
    fn sql_bearing_recommendation_is_pending_approval() {
        let d = diagnosis(vec![Recommendation {
            action: RecommendedAction::AddCast,
            description: "cast column back".to_string(),
            sql: Some("ALTER TABLE analytics.orders ALTER COLUMN price TYPE FLOAT".to_string()),
            priority: 1,
        }]);
        let remediation = Executor::plan(&d);
        assert_eq!(remediation.actions[0].status, RemediationStatus::PendingApproval);
    }

    #[test]
    fn sql_less_recommendation_is_manual() {
        let d = diagnosis(vec![Recommendation {
            action: RecommendedAction::NotifyTeam,
            description: "ping the owning team".to_string(),
            sql: None,
            priority: 1,
        }]);
        let remediation = Executor::plan(&d);
        assert_eq!(remediation.actions[0].status, RemediationStatus::Manual);
    }

    #[test]
    fn ordering_is_preserved_from_diagnosis() {
        let d = diagnosis(vec![
            Recommendation {
                action: RecommendedAction::PausePipeline,
                description: "pause".to_string(),
                sql: None,
                priority: 1,
            },
            Recommendation {
                action: RecommendedAction::Investigate,
                description: "investigate".to_string(),
                sql: None,
                priority: 2,
            },
        ]);
        let remediation = Executor::plan(&d);
        assert_eq!(remediation.actions[0].r#type, "pause_pipeline");
        assert_eq!(remediation.actions[1].r#type, "investigate");
    }
}
