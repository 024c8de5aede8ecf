//! Schema-drift detector: compares current columns against the latest
//! persisted snapshot and emits a classified `Anomaly` on drift.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{
    AnomalyDetail, AnomalyType, ColumnChange, ColumnChangeKind, ColumnDef,
    MonitoredTable, Severity, SchemaSnapshot, snapshot_hash,
};
use crate::services::warehouse::{ConnectorError, WarehouseConnector};

pub struct SchemaSentinel<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SchemaSentinel<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns `Some(anomaly_id)` if drift was detected and persisted, `None`
    /// on a clean comparison or a freshly-established baseline. The snapshot
    /// is persisted in both cases, since hash comparison must stay cheap.
    pub async fn check(
        &self,
        table: &MonitoredTable,
        connector: &dyn WarehouseConnector,
    ) -> Result<Option<i64>, ConnectorError> {
        let current_columns = connector.fetch_columns(&table.schema_name, &table.table_name).await?;
        if current_columns.is_empty() {
            tracing::debug!(table = %table.fully_qualified_name, "schema sentinel skipping table with zero columns");
            return Ok(None);
        }

        let current_hash = snapshot_hash(&current_columns);

        let prior: Option<SchemaSnapshot> = sqlx::query_as(
            "SELECT * FROM schema_snapshots WHERE table_id = ? ORDER BY captured_at DESC LIMIT 1",
        )
        .bind(table.id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| ConnectorError::Connectivity(e.to_string()))?;

        let anomaly_id = match &prior {
            None => {
                // Establishing the baseline is not drift.
                None
            },
            Some(prior) if prior.snapshot_hash == current_hash => None,
            Some(prior) => {
                let changes = diff_columns(&prior.columns(), &current_columns);
                if changes.is_empty() {
                    None
                } else {
                    let severity = classify_severity(&changes);
                    Some(self.persist_anomaly(table.id, changes, severity).await?)
                }
            },
        };

        self.persist_snapshot(table.id, &current_columns, &current_hash).await?;

        Ok(anomaly_id)
    }

    async fn persist_snapshot(
        &self,
        table_id: i64,
        columns: &[ColumnDef],
        hash: &str,
    ) -> Result<(), ConnectorError> {
        let columns_json = serde_json::to_string(columns)
            .map_err(|e| ConnectorError::Connectivity(e.to_string()))?;
        sqlx::query(
            "INSERT INTO schema_snapshots (table_id, columns_json, snapshot_hash, captured_at) VALUES (?, ?, ?, ?)",
        )
        .bind(table_id)
        .bind(columns_json)
        .bind(hash)
        .bind(Utc::now())
        .execute(self.pool)
        .await
        .map_err(|e| ConnectorError::Connectivity(e.to_string()))?;
        Ok(())
    }

    async fn persist_anomaly(
        &self,
        table_id: i64,
        changes: Vec<ColumnChange>,
        severity: Severity,
    ) -> Result<i64, ConnectorError> {
        let detail = AnomalyDetail::SchemaDrift { changes };
        let detail_json =
            serde_json::to_string(&detail).map_err(|e| ConnectorError::Connectivity(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO anomalies (table_id, anomaly_type, severity, detail_json, detected_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(table_id)
        .bind(AnomalyType::SchemaDrift.as_str())
        .bind(severity.as_str())
        .bind(detail_json)
        .bind(Utc::now())
        .execute(self.pool)
        .await
        .map_err(|e| ConnectorError::Connectivity(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }
}

/// Diff by position + name, per the rules in the column-change table.
fn diff_columns(prior: &[ColumnDef], current: &[ColumnDef]) -> Vec<ColumnChange> {
    let mut changes = Vec::new();

    let prior_by_name: std::collections::HashMap<&str, &ColumnDef> =
        prior.iter().map(|c| (c.name.as_str(), c)).collect();
    let current_by_name: std::collections::HashMap<&str, &ColumnDef> =
        current.iter().map(|c| (c.name.as_str(), c)).collect();
    let prior_by_ordinal: std::collections::HashMap<i32, &ColumnDef> =
        prior.iter().map(|c| (c.ordinal, c)).collect();
    let current_by_ordinal: std::collections::HashMap<i32, &ColumnDef> =
        current.iter().map(|c| (c.ordinal, c)).collect();

    let mut renamed_names: std::collections::HashSet<&str> = std::collections::HashSet::new();

    // Inferred renames: same ordinal, different name, compatible type.
    for (ordinal, prior_col) in &prior_by_ordinal {
        if let Some(current_col) = current_by_ordinal.get(ordinal) {
            if prior_col.name != current_col.name
                && !current_by_name.contains_key(prior_col.name.as_str())
                && !prior_by_name.contains_key(current_col.name.as_str())
                && prior_col.data_type == current_col.data_type
            {
                changes.push(ColumnChange {
                    kind: ColumnChangeKind::ColumnRenamed,
                    column: current_col.name.clone(),
                    from: Some(prior_col.name.clone()),
                    to: Some(current_col.name.clone()),
                    nullable: Some(current_col.nullable),
                });
                renamed_names.insert(prior_col.name.as_str());
                renamed_names.insert(current_col.name.as_str());
            }
        }
    }

    for col in current {
        if renamed_names.contains(col.name.as_str()) {
            continue;
        }
        match prior_by_name.get(col.name.as_str()) {
            None => changes.push(ColumnChange {
                kind: ColumnChangeKind::ColumnAdded,
                column: col.name.clone(),
                from: None,
                to: Some(col.data_type.clone()),
                nullable: Some(col.nullable),
            }),
            Some(prior_col) if prior_col.data_type != col.data_type => {
                changes.push(ColumnChange {
                    kind: ColumnChangeKind::ColumnTypeChanged,
                    column: col.name.clone(),
                    from: Some(prior_col.data_type.clone()),
                    to: Some(col.data_type.clone()),
                    nullable: Some(col.nullable),
                });
            },
            Some(_) => {},
        }
    }

    for col in prior {
        if renamed_names.contains(col.name.as_str()) {
            continue;
        }
        if !current_by_name.contains_key(col.name.as_str()) {
            changes.push(ColumnChange {
                kind: ColumnChangeKind::ColumnDeleted,
                column: col.name.clone(),
                from: Some(col.data_type.clone()),
                to: None,
                nullable: None,
            });
        }
    }

    changes
}

fn classify_severity(changes: &[ColumnChange]) -> Severity {
    changes
        .iter()
        .map(|c| match c.kind {
            ColumnChangeKind::ColumnDeleted => Severity::Critical,
            ColumnChangeKind::ColumnTypeChanged => Severity::Critical,
            ColumnChangeKind::ColumnRenamed => Severity::High,
            ColumnChangeKind::ColumnAdded => {
                if c.nullable == Some(false) {
                    Severity::Medium
                } else {
                    Severity::Low
                }
            },
        })
        .fold(Severity::Low, Severity::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, ty: &str, nullable: bool, ordinal: i32) -> ColumnDef {
        ColumnDef { name: name.to_string(), data_type: ty.to_string(), nullable, ordinal }
    }

    #[test]
    fn type_change_is_critical() {
        let prior = vec![col("id", "INT", false, 1), col("price", "FLOAT", true, 2)];
        let current = vec![col("id", "INT", false, 1), col("price", "VARCHAR(255)", true, 2)];
        let changes = diff_columns(&prior, &current);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ColumnChangeKind::ColumnTypeChanged);
        assert_eq!(classify_severity(&changes), Severity::Critical);
    }

    #[test]
    fn rename_beats_add_delete_pair() {
        let prior = vec![col("id", "INT", false, 1), col("qty", "INT", true, 2)];
        let current = vec![col("id", "INT", false, 1), col("quantity", "INT", true, 2)];
        let changes = diff_columns(&prior, &current);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ColumnChangeKind::ColumnRenamed);
        assert_eq!(classify_severity(&changes), Severity::High);
    }

    #[test]
    fn non_nullable_add_is_medium_nullable_add_is_low() {
        let prior = vec![col("id", "INT", false, 1)];
        let current_nn =
            vec![col("id", "INT", false, 1), col("region", "TEXT", false, 2)];
        let current_null =
            vec![col("id", "INT", false, 1), col("region", "TEXT", true, 2)];
        assert_eq!(classify_severity(&diff_columns(&prior, &current_nn)), Severity::Medium);
        assert_eq!(classify_severity(&diff_columns(&prior, &current_null)), Severity::Low);
    }

    #[test]
    fn identical_columns_produce_no_changes() {
        let cols = vec![col("id", "INT", false, 1)];
        assert!(diff_columns(&cols, &cols).is_empty());
    }
}
