//! Freshness-violation detector: compares the warehouse's reported last
//! update time against a table's configured SLA.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{AnomalyDetail, AnomalyType, MonitoredTable, Severity};
use crate::services::warehouse::{ConnectorError, WarehouseConnector};

pub struct FreshnessSentinel<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FreshnessSentinel<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns `Some(anomaly_id)` if the table is overdue past its SLA.
    /// A missing last-update time (warehouse can't answer) is not itself an
    /// anomaly — only a confirmed violation is.
    pub async fn check(
        &self,
        table: &MonitoredTable,
        connector: &dyn WarehouseConnector,
    ) -> Result<Option<i64>, ConnectorError> {
        let Some(sla_minutes) = table.freshness_sla_minutes else {
            return Ok(None);
        };

        let Some(last_update) =
            connector.fetch_last_update_time(&table.schema_name, &table.table_name).await?
        else {
            tracing::debug!(table = %table.fully_qualified_name, "warehouse reported no last-update time");
            return Ok(None);
        };

        let now = Utc::now();
        let age_minutes = (now - last_update).num_minutes();
        let overdue_minutes = age_minutes - sla_minutes;

        if overdue_minutes <= 0 {
            return Ok(None);
        }

        let severity = classify_severity(overdue_minutes, sla_minutes);

        let detail = AnomalyDetail::FreshnessViolation {
            last_update,
            sla_minutes,
            minutes_overdue: overdue_minutes,
        };
        let detail_json =
            serde_json::to_string(&detail).map_err(|e| ConnectorError::Connectivity(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO anomalies (table_id, anomaly_type, severity, detail_json, detected_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(table.id)
        .bind(AnomalyType::FreshnessViolation.as_str())
        .bind(severity.as_str())
        .bind(detail_json)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| ConnectorError::Connectivity(e.to_string()))?;

        Ok(Some(result.last_insert_rowid()))
    }
}

/// Ratio of overdue time to the SLA window itself: under one SLA window late
/// is `medium`, one to four windows late is `high`, four or more is `critical`.
fn classify_severity(overdue_minutes: i64, sla_minutes: i64) -> Severity {
    if sla_minutes <= 0 {
        return Severity::Critical;
    }
    let ratio = overdue_minutes as f64 / sla_minutes as f64;
    if ratio >= 4.0 {
        Severity::Critical
    } else if ratio >= 1.0 {
        Severity::High
    } else {
        Severity::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_one_sla_window_is_medium() {
        assert_eq!(classify_severity(30, 60), Severity::Medium);
    }

    #[test]
    fn one_to_four_sla_windows_is_high() {
        assert_eq!(classify_severity(60, 60), Severity::High);
        assert_eq!(classify_severity(180, 60), Severity::High);
    }

    #[test]
    fn four_or_more_sla_windows_is_critical() {
        assert_eq!(classify_severity(240, 60), Severity::Critical);
        assert_eq!(classify_severity(10_000, 60), Severity::Critical);
    }
}
