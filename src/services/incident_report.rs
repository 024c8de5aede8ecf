//! Assembles the fixed `IncidentReport` shape from an incident, its
//! originating anomaly, the monitored table, and optionally a diagnosis and
//! remediation. Deterministic except for `generated_at`; regeneration is
//! idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Anomaly, Incident, IncidentStatus, MonitoredTable, Severity};
use crate::services::architect::Diagnosis;
use crate::services::executor::{Remediation, RemediationAction};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    pub event: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentReport {
    pub title: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub generated_at: DateTime<Utc>,
    pub summary: String,
    pub anomaly_type: String,
    pub root_cause: Option<String>,
    pub blast_radius: Vec<String>,
    pub recommended_actions: Vec<RemediationAction>,
    pub timeline: Vec<TimelineEntry>,
}

pub fn assemble(
    incident: &Incident,
    anomaly: &Anomaly,
    table: &MonitoredTable,
    diagnosis: Option<&Diagnosis>,
    remediation: Option<&Remediation>,
) -> IncidentReport {
    let severity = incident.severity();
    let status = incident.status();

    let title = format!("{} on {}", anomaly.kind().as_str(), table.fully_qualified_name);

    let summary = summarize(table, severity, diagnosis);

    let mut timeline = vec![
        TimelineEntry { at: anomaly.detected_at, event: "anomaly detected".to_string() },
        TimelineEntry { at: incident.created_at, event: "incident created".to_string() },
    ];
    if diagnosis.is_some() {
        timeline.push(TimelineEntry { at: incident.updated_at, event: "diagnosis completed".to_string() });
    }
    if remediation.is_some() {
        timeline.push(TimelineEntry {
            at: incident.updated_at,
            event: "remediation plan generated".to_string(),
        });
    }
    timeline.sort_by_key(|t| t.at);

    IncidentReport {
        title,
        severity,
        status,
        generated_at: Utc::now(),
        summary,
        anomaly_type: anomaly.anomaly_type.clone(),
        root_cause: diagnosis.map(|d| d.root_cause.clone()),
        blast_radius: diagnosis.map(|d| d.blast_radius.clone()).unwrap_or_default(),
        recommended_actions: remediation.map(|r| r.actions.clone()).unwrap_or_default(),
        timeline,
    }
}

fn summarize(table: &MonitoredTable, severity: Severity, diagnosis: Option<&Diagnosis>) -> String {
    let affected = diagnosis.map(|d| d.blast_radius.len()).unwrap_or(0);
    match diagnosis {
        Some(d) => format!(
            "{} severity issue on {}: {}. {} downstream table(s) potentially affected.",
            severity.as_str(),
            table.fully_qualified_name,
            d.root_cause,
            affected
        ),
        None => format!(
            "{} severity issue on {}; diagnosis pending.",
            severity.as_str(),
            table.fully_qualified_name
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyType, CheckType};
    use crate::services::architect::{Recommendation, RecommendedAction};
    use crate::services::executor::Executor;

    fn table() -> MonitoredTable {
        MonitoredTable {
            id: 1,
            connection_id: 1,
            schema_name: "analytics".to_string(),
            table_name: "orders".to_string(),
            fully_qualified_name: "analytics.orders".to_string(),
            check_types: serde_json::to_string(&vec![CheckType::Schema]).unwrap(),
            freshness_sla_minutes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn anomaly() -> Anomaly {
        Anomaly {
            id: 1,
            table_id: 1,
            anomaly_type: AnomalyType::SchemaDrift.as_str().to_string(),
            severity: Severity::Critical.as_str().to_string(),
            detail_json: "{}".to_string(),
            detected_at: Utc::now(),
        }
    }

    fn incident() -> Incident {
        Incident {
            id: 1,
            table_id: 1,
            anomaly_id: 1,
            anomaly_type: AnomalyType::SchemaDrift.as_str().to_string(),
            status: IncidentStatus::PendingReview.as_str().to_string(),
            severity: Severity::Critical.as_str().to_string(),
            diagnosis_json: None,
            remediation_json: None,
            blast_radius_json: None,
            incident_report_json: None,
            error: None,
            resolved_at: None,
            resolved_by: None,
            dismiss_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn regeneration_is_idempotent_modulo_generated_at() {
        let diagnosis = Diagnosis {
            root_cause: "column type changed".to_string(),
            root_cause_table: "analytics.orders".to_string(),
            blast_radius: vec!["mart.revenue".to_string()],
            severity: Severity::Critical,
            confidence: 0.9,
            recommendations: vec![Recommendation {
                action: RecommendedAction::AddCast,
                description: "cast back".to_string(),
                sql: Some("ALTER TABLE x".to_string()),
                priority: 1,
            }],
        };
        let remediation = Executor::plan(&diagnosis);

        let r1 = assemble(&incident(), &anomaly(), &table(), Some(&diagnosis), Some(&remediation));
        let r2 = assemble(&incident(), &anomaly(), &table(), Some(&diagnosis), Some(&remediation));

        assert_eq!(r1.title, r2.title);
        assert_eq!(r1.summary, r2.summary);
        assert_eq!(r1.blast_radius, r2.blast_radius);
        assert_eq!(r1.timeline.len(), r2.timeline.len());
    }

    #[test]
    fn timeline_includes_diagnosis_and_remediation_when_present() {
        let diagnosis = Diagnosis {
            root_cause: "x".to_string(),
            root_cause_table: "analytics.orders".to_string(),
            blast_radius: vec![],
            severity: Severity::Low,
            confidence: 0.5,
            recommendations: vec![],
        };
        let remediation = Executor::plan(&diagnosis);
        let report = assemble(&incident(), &anomaly(), &table(), Some(&diagnosis), Some(&remediation));
        assert_eq!(report.timeline.len(), 4);
    }

    #[test]
    fn timeline_has_only_base_entries_without_diagnosis() {
        let report = assemble(&incident(), &anomaly(), &table(), None, None);
        assert_eq!(report.timeline.len(), 2);
        assert!(report.root_cause.is_none());
    }
}
