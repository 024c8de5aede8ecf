//! Orchestrator: the incident state machine. Deduplicates anomalies against
//! active incidents, drives the Architect/Executor pipeline on creation, and
//! guards every externally-triggered transition.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{Anomaly, Incident, IncidentStatus, MonitoredTable};
use crate::services::architect::{Architect, AnomalySummary, Diagnosis, DiagnosisContext, TableSummary};
use crate::services::executor::{Executor, Remediation};
use crate::services::incident_report;
use crate::services::lineage::LineageEngine;
use crate::services::notifier::{EventPayload, Notifier};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("missing reason: {0}")]
    MissingReason(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct Orchestrator {
    pool: SqlitePool,
    architect: Architect,
    lineage: LineageEngine,
    notifier: std::sync::Arc<Notifier>,
}

const LINEAGE_DEPTH: u32 = 3;
const MIN_LINEAGE_CONFIDENCE: f64 = 0.5;
const ANOMALY_HISTORY_WINDOW_DAYS: i64 = 30;

impl Orchestrator {
    pub fn new(
        pool: SqlitePool,
        architect: Architect,
        lineage: LineageEngine,
        notifier: std::sync::Arc<Notifier>,
    ) -> Self {
        Self { pool, architect, lineage, notifier }
    }

    /// Looks up the active incident for `(table_id, anomaly.anomaly_type)`.
    /// If found, merges (updates `updated_at`, emits `incident.updated`, does
    /// not re-run the pipeline). If not found, creates and runs the pipeline.
    pub async fn handle_anomaly(
        &self,
        anomaly: &Anomaly,
        table: &MonitoredTable,
    ) -> Result<Incident, OrchestratorError> {
        // The dedup lookup and the resulting update-or-insert must be
        // serializable against a concurrent scan finding the same anomaly
        // twice; both run inside one transaction.
        let mut tx = self.pool.begin().await?;

        let candidates: Vec<Incident> = sqlx::query_as(
            "SELECT * FROM incidents WHERE table_id = ? AND anomaly_type = ? ORDER BY created_at DESC",
        )
        .bind(table.id)
        .bind(&anomaly.anomaly_type)
        .fetch_all(&mut *tx)
        .await?;
        let existing = candidates.into_iter().find(|i| i.is_active());

        if let Some(existing) = existing {
            let now = Utc::now();
            sqlx::query("UPDATE incidents SET updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(existing.id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            self.notifier.publish(EventPayload::IncidentUpdated {
                incident_id: existing.id,
                status: existing.status,
                severity: existing.severity,
            });
            return self.load_incident(existing.id).await;
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO incidents (table_id, anomaly_id, anomaly_type, status, severity, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(table.id)
        .bind(anomaly.id)
        .bind(&anomaly.anomaly_type)
        .bind(IncidentStatus::Investigating.as_str())
        .bind(&anomaly.severity)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let incident_id = result.last_insert_rowid();
        tx.commit().await?;

        self.run_pipeline(incident_id, anomaly, table).await
    }

    /// Runs the Architect and Executor synchronously and assembles the
    /// report. On failure the incident stays in `investigating` with an
    /// `error` annotation, retryable idempotently on the next scan cycle.
    async fn run_pipeline(
        &self,
        incident_id: i64,
        anomaly: &Anomaly,
        table: &MonitoredTable,
    ) -> Result<Incident, OrchestratorError> {
        match self.diagnose_and_remediate(anomaly, table).await {
            Ok((diagnosis, remediation)) => {
                self.finalize_pipeline(incident_id, anomaly, table, diagnosis, remediation).await
            },
            Err(e) => {
                sqlx::query("UPDATE incidents SET error = ?, updated_at = ? WHERE id = ?")
                    .bind(e.to_string())
                    .bind(Utc::now())
                    .bind(incident_id)
                    .execute(&self.pool)
                    .await?;
                self.load_incident(incident_id).await
            },
        }
    }

    async fn diagnose_and_remediate(
        &self,
        anomaly: &Anomaly,
        table: &MonitoredTable,
    ) -> Result<(Diagnosis, Remediation), OrchestratorError> {
        let context = self.build_context(anomaly, table).await?;
        let diagnosis = self.architect.diagnose(&context).await;
        let remediation = Executor::plan(&diagnosis);
        Ok((diagnosis, remediation))
    }

    async fn build_context(
        &self,
        anomaly: &Anomaly,
        table: &MonitoredTable,
    ) -> Result<DiagnosisContext, OrchestratorError> {
        let upstream = self
            .lineage
            .upstream(&table.fully_qualified_name, LINEAGE_DEPTH, MIN_LINEAGE_CONFIDENCE)
            .await?;
        let downstream = self
            .lineage
            .downstream(&table.fully_qualified_name, LINEAGE_DEPTH, MIN_LINEAGE_CONFIDENCE)
            .await?;

        let neighbor_fqns: Vec<String> = upstream
            .iter()
            .chain(downstream.iter())
            .filter(|n| n.depth == 1)
            .map(|n| n.table.clone())
            .collect();

        let history = self.recent_anomaly_history(table, &neighbor_fqns).await?;

        let latest_snapshot_hash: Option<String> = sqlx::query_scalar(
            "SELECT snapshot_hash FROM schema_snapshots WHERE table_id = ? ORDER BY captured_at DESC LIMIT 1",
        )
        .bind(table.id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(DiagnosisContext {
            anomaly: AnomalySummary::from_anomaly(anomaly),
            table: TableSummary {
                fqn: table.fully_qualified_name.clone(),
                columns: vec![],
                latest_snapshot_hash,
                freshness_sla_minutes: table.freshness_sla_minutes,
            },
            upstream,
            downstream,
            recent_anomaly_history: history,
        })
    }

    async fn recent_anomaly_history(
        &self,
        table: &MonitoredTable,
        neighbor_fqns: &[String],
    ) -> Result<Vec<AnomalySummary>, OrchestratorError> {
        let since = Utc::now() - chrono::Duration::days(ANOMALY_HISTORY_WINDOW_DAYS);

        let mut table_ids = vec![table.id];
        if !neighbor_fqns.is_empty() {
            let placeholders: Vec<String> = neighbor_fqns.iter().map(|_| "?".to_string()).collect();
            let query = format!(
                "SELECT id FROM monitored_tables WHERE fully_qualified_name IN ({})",
                placeholders.join(", ")
            );
            let mut q = sqlx::query_scalar(&query);
            for fqn in neighbor_fqns {
                q = q.bind(fqn);
            }
            let neighbor_ids: Vec<i64> = q.fetch_all(&self.pool).await?;
            table_ids.extend(neighbor_ids);
        }

        let placeholders: Vec<String> = table_ids.iter().map(|_| "?".to_string()).collect();
        let query = format!(
            "SELECT * FROM anomalies WHERE table_id IN ({}) AND detected_at >= ? ORDER BY detected_at DESC",
            placeholders.join(", ")
        );
        let mut q = sqlx::query_as::<_, Anomaly>(&query);
        for id in &table_ids {
            q = q.bind(id);
        }
        q = q.bind(since);

        let anomalies = q.fetch_all(&self.pool).await?;
        Ok(anomalies.iter().map(AnomalySummary::from_anomaly).collect())
    }

    async fn finalize_pipeline(
        &self,
        incident_id: i64,
        anomaly: &Anomaly,
        table: &MonitoredTable,
        diagnosis: Diagnosis,
        remediation: Remediation,
    ) -> Result<Incident, OrchestratorError> {
        let diagnosis_json = serde_json::to_string(&diagnosis)?;
        let remediation_json = serde_json::to_string(&remediation)?;
        let blast_radius_json = serde_json::to_string(&diagnosis.blast_radius)?;

        let incident_for_report = Incident {
            id: incident_id,
            table_id: table.id,
            anomaly_id: anomaly.id,
            anomaly_type: anomaly.anomaly_type.clone(),
            status: IncidentStatus::PendingReview.as_str().to_string(),
            severity: diagnosis.severity.as_str().to_string(),
            diagnosis_json: Some(diagnosis_json.clone()),
            remediation_json: Some(remediation_json.clone()),
            blast_radius_json: Some(blast_radius_json.clone()),
            incident_report_json: None,
            error: None,
            resolved_at: None,
            resolved_by: None,
            dismiss_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let report = incident_report::assemble(&incident_for_report, anomaly, table, Some(&diagnosis), Some(&remediation));
        let report_json = serde_json::to_string(&report)?;

        let now = Utc::now();
        sqlx::query(
            "UPDATE incidents SET status = ?, severity = ?, diagnosis_json = ?, remediation_json = ?, \
             blast_radius_json = ?, incident_report_json = ?, error = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(IncidentStatus::PendingReview.as_str())
        .bind(diagnosis.severity.as_str())
        .bind(diagnosis_json)
        .bind(remediation_json)
        .bind(blast_radius_json)
        .bind(report_json)
        .bind(now)
        .bind(incident_id)
        .execute(&self.pool)
        .await?;

        self.notifier.publish(EventPayload::IncidentCreated {
            incident_id,
            severity: diagnosis.severity.as_str().to_string(),
            table: table.fully_qualified_name.clone(),
            r#type: anomaly.anomaly_type.clone(),
        });

        self.load_incident(incident_id).await
    }

    /// `pending_review -> resolved`. Fails with `InvalidTransition` unless
    /// the incident is currently `pending_review`.
    pub async fn approve(&self, incident_id: i64, resolved_by: Option<&str>) -> Result<Incident, OrchestratorError> {
        let incident = self.load_incident(incident_id).await?;
        if incident.status() != IncidentStatus::PendingReview {
            return Err(OrchestratorError::InvalidTransition(format!(
                "cannot approve incident in status {:?}",
                incident.status()
            )));
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE incidents SET status = ?, resolved_at = ?, resolved_by = ?, updated_at = ? WHERE id = ?",
        )
        .bind(IncidentStatus::Resolved.as_str())
        .bind(now)
        .bind(resolved_by)
        .bind(now)
        .bind(incident_id)
        .execute(&self.pool)
        .await?;

        self.notifier.publish(EventPayload::IncidentUpdated {
            incident_id,
            status: IncidentStatus::Resolved.as_str().to_string(),
            severity: incident.severity,
        });

        self.load_incident(incident_id).await
    }

    /// `pending_review -> dismissed`. Fails with `MissingReason` if `reason`
    /// is empty, `InvalidTransition` unless currently `pending_review`.
    pub async fn dismiss(&self, incident_id: i64, reason: &str) -> Result<Incident, OrchestratorError> {
        if reason.trim().is_empty() {
            return Err(OrchestratorError::MissingReason(
                "dismiss requires a non-empty reason".to_string(),
            ));
        }

        let incident = self.load_incident(incident_id).await?;
        if incident.status() != IncidentStatus::PendingReview {
            return Err(OrchestratorError::InvalidTransition(format!(
                "cannot dismiss incident in status {:?}",
                incident.status()
            )));
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE incidents SET status = ?, dismiss_reason = ?, resolved_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(IncidentStatus::Dismissed.as_str())
        .bind(reason)
        .bind(now)
        .bind(now)
        .bind(incident_id)
        .execute(&self.pool)
        .await?;

        self.notifier.publish(EventPayload::IncidentUpdated {
            incident_id,
            status: IncidentStatus::Dismissed.as_str().to_string(),
            severity: incident.severity,
        });

        self.load_incident(incident_id).await
    }

    async fn load_incident(&self, id: i64) -> Result<Incident, OrchestratorError> {
        sqlx::query_as("SELECT * FROM incidents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("incident {id}")))
    }

    /// Retries any `investigating` incident carrying an `error` annotation,
    /// intended to be called once per scan cycle.
    pub async fn retry_failed(&self) -> Result<(), OrchestratorError> {
        let stuck: Vec<Incident> = sqlx::query_as(
            "SELECT * FROM incidents WHERE status = ? AND error IS NOT NULL",
        )
        .bind(IncidentStatus::Investigating.as_str())
        .fetch_all(&self.pool)
        .await?;

        for incident in stuck {
            let anomaly: Option<Anomaly> = sqlx::query_as("SELECT * FROM anomalies WHERE id = ?")
                .bind(incident.anomaly_id)
                .fetch_optional(&self.pool)
                .await?;
            let table: Option<MonitoredTable> = sqlx::query_as("SELECT * FROM monitored_tables WHERE id = ?")
                .bind(incident.table_id)
                .fetch_optional(&self.pool)
                .await?;
            if let (Some(anomaly), Some(table)) = (anomaly, table) {
                self.run_pipeline(incident.id, &anomaly, &table).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_db;
    use crate::models::AnomalyType;

    async fn orchestrator(pool: SqlitePool) -> Orchestrator {
        let lineage = LineageEngine::new(pool.clone());
        let architect = Architect::new(None);
        let notifier = std::sync::Arc::new(Notifier::new());
        Orchestrator::new(pool, architect, lineage, notifier)
    }

    async fn seed_table(pool: &SqlitePool) -> MonitoredTable {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO connections (name, dialect, uri_ciphertext, is_active, created_at, updated_at) \
             VALUES ('warehouse', 'postgres', 'ciphertext', 1, ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap();

        let result = sqlx::query(
            "INSERT INTO monitored_tables \
             (connection_id, schema_name, table_name, fully_qualified_name, check_types, freshness_sla_minutes, created_at, updated_at) \
             VALUES (1, 'analytics', 'orders', 'analytics.orders', '[\"schema\"]', NULL, ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap();

        sqlx::query_as("SELECT * FROM monitored_tables WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn seed_anomaly(pool: &SqlitePool, table_id: i64, anomaly_type: AnomalyType) -> Anomaly {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO anomalies (table_id, anomaly_type, severity, detail_json, detected_at) \
             VALUES (?, ?, 'high', '{}', ?)",
        )
        .bind(table_id)
        .bind(anomaly_type.as_str())
        .bind(now)
        .execute(pool)
        .await
        .unwrap();

        sqlx::query_as("SELECT * FROM anomalies WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_anomaly_creates_a_pending_review_incident() {
        let pool = create_test_db().await;
        let orch = orchestrator(pool.clone()).await;
        let table = seed_table(&pool).await;
        let anomaly = seed_anomaly(&pool, table.id, AnomalyType::SchemaDrift).await;

        let incident = orch.handle_anomaly(&anomaly, &table).await.unwrap();
        assert_eq!(incident.status(), IncidentStatus::PendingReview);
        assert!(incident.diagnosis_json.is_some());
    }

    #[tokio::test]
    async fn second_anomaly_of_same_type_merges_into_active_incident() {
        let pool = create_test_db().await;
        let orch = orchestrator(pool.clone()).await;
        let table = seed_table(&pool).await;
        let anomaly1 = seed_anomaly(&pool, table.id, AnomalyType::SchemaDrift).await;
        let anomaly2 = seed_anomaly(&pool, table.id, AnomalyType::SchemaDrift).await;

        let first = orch.handle_anomaly(&anomaly1, &table).await.unwrap();
        let second = orch.handle_anomaly(&anomaly2, &table).await.unwrap();

        assert_eq!(first.id, second.id);

        let all: Vec<Incident> = sqlx::query_as("SELECT * FROM incidents WHERE table_id = ?")
            .bind(table.id)
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn resolved_incident_does_not_absorb_a_new_anomaly() {
        let pool = create_test_db().await;
        let orch = orchestrator(pool.clone()).await;
        let table = seed_table(&pool).await;
        let anomaly1 = seed_anomaly(&pool, table.id, AnomalyType::SchemaDrift).await;
        let anomaly2 = seed_anomaly(&pool, table.id, AnomalyType::SchemaDrift).await;

        let first = orch.handle_anomaly(&anomaly1, &table).await.unwrap();
        orch.approve(first.id, Some("alice")).await.unwrap();

        let second = orch.handle_anomaly(&anomaly2, &table).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.status(), IncidentStatus::PendingReview);
    }

    #[tokio::test]
    async fn approve_requires_pending_review() {
        let pool = create_test_db().await;
        let orch = orchestrator(pool.clone()).await;
        let table = seed_table(&pool).await;
        let anomaly = seed_anomaly(&pool, table.id, AnomalyType::SchemaDrift).await;
        let incident = orch.handle_anomaly(&anomaly, &table).await.unwrap();

        orch.approve(incident.id, None).await.unwrap();
        let err = orch.approve(incident.id, None).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn dismiss_requires_non_empty_reason() {
        let pool = create_test_db().await;
        let orch = orchestrator(pool.clone()).await;
        let table = seed_table(&pool).await;
        let anomaly = seed_anomaly(&pool, table.id, AnomalyType::SchemaDrift).await;
        let incident = orch.handle_anomaly(&anomaly, &table).await.unwrap();

        let err = orch.dismiss(incident.id, "   ").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingReason(_)));

        let dismissed = orch.dismiss(incident.id, "false positive").await.unwrap();
        assert_eq!(dismissed.status(), IncidentStatus::Dismissed);
    }

    #[tokio::test]
    async fn load_incident_not_found() {
        let pool = create_test_db().await;
        let orch = orchestrator(pool.clone()).await;
        let err = orch.load_incident(999).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }
}
