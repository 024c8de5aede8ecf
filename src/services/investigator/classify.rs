//! Deterministic name-pattern classification, the fallback path and the
//! scoring rubric the agentic path is checked against.

use crate::models::{CheckType, ColumnDef, TableRole};

pub struct Classification {
    pub role: TableRole,
    pub recommended_checks: Vec<CheckType>,
    pub suggested_sla_minutes: Option<i64>,
    pub skip: bool,
    pub reasoning: String,
}

fn has_timestamp_column(columns: &[ColumnDef]) -> bool {
    columns.iter().any(|c| {
        let t = c.data_type.to_lowercase();
        t.contains("timestamp") || t.contains("datetime") || t.contains("date")
    })
}

/// `schema` and `table` are matched case-insensitively; patterns are prefix
/// or suffix globs as written in the role table.
pub fn classify(schema: &str, table: &str, columns: &[ColumnDef]) -> Classification {
    let schema_lower = schema.to_lowercase();
    let table_lower = table.to_lowercase();

    if table_lower.starts_with("_tmp")
        || table_lower.starts_with("_temp")
        || table_lower.starts_with("_test")
        || table_lower.starts_with("_backup")
    {
        return Classification {
            role: TableRole::System,
            recommended_checks: vec![],
            suggested_sla_minutes: None,
            skip: true,
            reasoning: "name matches a temporary/test/backup pattern".to_string(),
        };
    }

    if table_lower.starts_with("stg_") || matches!(schema_lower.as_str(), "staging" | "stg") {
        return Classification {
            role: TableRole::Staging,
            recommended_checks: vec![CheckType::Schema],
            suggested_sla_minutes: Some(60),
            skip: false,
            reasoning: "staging table: schema-drift only, 1h SLA".to_string(),
        };
    }

    if table_lower.starts_with("raw_") || matches!(schema_lower.as_str(), "raw" | "landing") {
        return Classification {
            role: TableRole::Raw,
            recommended_checks: vec![CheckType::Schema],
            suggested_sla_minutes: Some(1440),
            skip: false,
            reasoning: "raw landing table: schema-drift only, 24h SLA".to_string(),
        };
    }

    if table_lower.starts_with("dim_") {
        return dimension_or_fact(TableRole::Dimension, columns, "dimension table");
    }

    if table_lower.starts_with("fct_") || table_lower.starts_with("fact_") {
        return dimension_or_fact(TableRole::Fact, columns, "fact table");
    }

    if table_lower.ends_with("_snapshot") || table_lower.contains("_hist") {
        return Classification {
            role: TableRole::Snapshot,
            recommended_checks: vec![CheckType::Schema],
            suggested_sla_minutes: None,
            skip: false,
            reasoning: "snapshot/history table: schema-drift only, no SLA".to_string(),
        };
    }

    let has_ts = has_timestamp_column(columns);
    let mut checks = vec![CheckType::Schema];
    if has_ts {
        checks.push(CheckType::Freshness);
    }
    Classification {
        role: TableRole::Unknown,
        recommended_checks: checks,
        suggested_sla_minutes: None,
        skip: false,
        reasoning: "no recognized naming convention; defaulting to schema-only monitoring"
            .to_string(),
    }
}

fn dimension_or_fact(role: TableRole, columns: &[ColumnDef], label: &str) -> Classification {
    let has_ts = has_timestamp_column(columns);
    let mut checks = vec![CheckType::Schema];
    if has_ts {
        checks.push(CheckType::Freshness);
    }
    Classification {
        role,
        recommended_checks: checks,
        suggested_sla_minutes: if has_ts { Some(360) } else { None },
        skip: false,
        reasoning: if has_ts {
            format!("{label} with a timestamp column: schema + freshness, 6h SLA")
        } else {
            format!("{label} with no timestamp column: schema-drift only")
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, data_type: &str) -> ColumnDef {
        ColumnDef { name: name.to_string(), data_type: data_type.to_string(), nullable: true, ordinal: 0 }
    }

    #[test]
    fn backup_table_is_system_and_skipped() {
        let c = classify("analytics", "_backup_orders", &[]);
        assert_eq!(c.role, TableRole::System);
        assert!(c.skip);
        assert!(c.recommended_checks.is_empty());
    }

    #[test]
    fn stg_prefix_is_staging_with_60_minute_sla() {
        let c = classify("analytics", "stg_orders", &[]);
        assert_eq!(c.role, TableRole::Staging);
        assert_eq!(c.suggested_sla_minutes, Some(60));
        assert_eq!(c.recommended_checks, vec![CheckType::Schema]);
    }

    #[test]
    fn raw_schema_is_raw_with_1440_minute_sla() {
        let c = classify("landing", "orders", &[]);
        assert_eq!(c.role, TableRole::Raw);
        assert_eq!(c.suggested_sla_minutes, Some(1440));
    }

    #[test]
    fn fact_table_with_timestamp_gets_freshness_and_sla() {
        let c = classify("analytics", "fct_orders", &[col("id", "bigint"), col("created_at", "timestamp")]);
        assert_eq!(c.role, TableRole::Fact);
        assert_eq!(c.suggested_sla_minutes, Some(360));
        assert!(c.recommended_checks.contains(&CheckType::Freshness));
    }

    #[test]
    fn dim_table_without_timestamp_has_no_sla() {
        let c = classify("analytics", "dim_customer", &[col("id", "bigint")]);
        assert_eq!(c.role, TableRole::Dimension);
        assert_eq!(c.suggested_sla_minutes, None);
        assert!(!c.recommended_checks.contains(&CheckType::Freshness));
    }

    #[test]
    fn snapshot_suffix_is_snapshot_role() {
        let c = classify("analytics", "orders_snapshot", &[]);
        assert_eq!(c.role, TableRole::Snapshot);
        assert_eq!(c.suggested_sla_minutes, None);
    }

    #[test]
    fn hist_infix_is_snapshot_role() {
        let c = classify("analytics", "orders_hist_2024", &[]);
        assert_eq!(c.role, TableRole::Snapshot);
    }

    #[test]
    fn unrecognized_name_is_unknown() {
        let c = classify("analytics", "customer_metrics", &[col("updated_at", "timestamptz")]);
        assert_eq!(c.role, TableRole::Unknown);
        assert!(c.recommended_checks.contains(&CheckType::Freshness));
    }
}
