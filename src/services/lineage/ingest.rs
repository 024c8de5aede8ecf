//! SQL-log parsing: identify the write target and source tables of a single
//! captured statement, with confidence decaying by nesting shape.

use sqlparser::ast::{
    Query, SetExpr, Statement, TableFactor, TableWithJoins,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::models::Relationship;

const DIRECT_CONFIDENCE: f64 = 1.0;
const NESTED_CONFIDENCE: f64 = 0.8;
const DEEP_NESTED_CONFIDENCE: f64 = 0.6;
const DEEP_NESTING_DEPTH: u32 = 3;

/// Returns `(write_target, [(source_table, relationship, confidence)])`, or
/// `None` if the statement doesn't parse or carries no target-modifying
/// semantics.
pub fn extract_lineage(sql: &str) -> Option<(String, Vec<(String, Relationship, f64)>)> {
    let dialect = GenericDialect {};
    let statements = Parser::parse_sql(&dialect, sql).ok()?;
    let statement = statements.into_iter().next()?;

    match statement {
        Statement::Insert(insert) => {
            let target = insert.table_name.to_string();
            let mut sources = Vec::new();
            if let Some(query) = &insert.source {
                collect_query_sources(query, 0, false, &mut sources);
            }
            Some((target, sources))
        },
        Statement::CreateTable(create_table) => {
            let query = create_table.query.as_ref()?;
            let target = create_table.name.to_string();
            let mut sources = Vec::new();
            collect_query_sources(query, 0, false, &mut sources);
            Some((target, sources))
        },
        Statement::Merge { table, source, .. } => {
            let target = table_factor_name(&table)?;
            // MERGE's source is itself a table-or-query, treated as a
            // depth-0 source the same way a direct FROM would be.
            let mut sources = Vec::new();
            collect_table_factor_sources(&source, 0, false, &mut sources);
            Some((target, sources))
        },
        _ => None,
    }
}

fn table_factor_name(tf: &TableFactor) -> Option<String> {
    match tf {
        TableFactor::Table { name, .. } => Some(name.to_string()),
        _ => None,
    }
}

fn collect_table_factor_sources(
    tf: &TableFactor,
    depth: u32,
    in_subquery: bool,
    out: &mut Vec<(String, Relationship, f64)>,
) {
    match tf {
        TableFactor::Table { name, .. } => {
            let (relationship, confidence) = confidence_for_depth(depth, in_subquery);
            out.push((name.to_string(), relationship, confidence));
        },
        TableFactor::Derived { subquery, .. } => {
            collect_query_sources(subquery, depth + 1, true, out);
        },
        _ => {},
    }
}

fn collect_query_sources(
    query: &Query,
    depth: u32,
    in_subquery: bool,
    out: &mut Vec<(String, Relationship, f64)>,
) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            // Tables referenced inside a CTE body are CTE-shaped sources
            // regardless of how deep the CTE definition itself is nested.
            collect_query_sources(&cte.query, depth + 1, true, out);
        }
    }

    collect_set_expr_sources(&query.body, depth, in_subquery, out);
}

fn collect_set_expr_sources(
    body: &SetExpr,
    depth: u32,
    in_subquery: bool,
    out: &mut Vec<(String, Relationship, f64)>,
) {
    match body {
        SetExpr::Select(select) => {
            for twj in &select.from {
                collect_table_with_joins(twj, depth, in_subquery, out);
            }
        },
        SetExpr::Query(inner) => collect_query_sources(inner, depth, in_subquery, out),
        SetExpr::SetOperation { left, right, .. } => {
            collect_set_expr_sources(left, depth, in_subquery, out);
            collect_set_expr_sources(right, depth, in_subquery, out);
        },
        _ => {},
    }
}

fn collect_table_with_joins(
    twj: &TableWithJoins,
    depth: u32,
    in_subquery: bool,
    out: &mut Vec<(String, Relationship, f64)>,
) {
    collect_table_factor_sources(&twj.relation, depth, in_subquery, out);
    for join in &twj.joins {
        collect_table_factor_sources(&join.relation, depth, in_subquery, out);
    }
}

fn confidence_for_depth(depth: u32, in_subquery: bool) -> (Relationship, f64) {
    if !in_subquery && depth == 0 {
        (Relationship::Direct, DIRECT_CONFIDENCE)
    } else if depth >= DEEP_NESTING_DEPTH {
        (Relationship::Aggregated, DEEP_NESTED_CONFIDENCE)
    } else {
        (Relationship::Derived, NESTED_CONFIDENCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_insert_select_is_full_confidence() {
        let (target, sources) =
            extract_lineage("INSERT INTO analytics.orders SELECT * FROM raw.orders").unwrap();
        assert_eq!(target, "analytics.orders");
        assert_eq!(sources, vec![("raw.orders".to_string(), Relationship::Direct, 1.0)]);
    }

    #[test]
    fn subquery_source_gets_nested_confidence() {
        let (_, sources) = extract_lineage(
            "INSERT INTO mart.summary SELECT * FROM (SELECT * FROM stg.events) t",
        )
        .unwrap();
        assert_eq!(sources[0].1, Relationship::Derived);
        assert_eq!(sources[0].2, NESTED_CONFIDENCE);
    }

    #[test]
    fn unparseable_sql_returns_none() {
        assert!(extract_lineage("THIS IS NOT SQL !!!").is_none());
    }

    #[test]
    fn select_only_statement_has_no_write_target() {
        assert!(extract_lineage("SELECT * FROM raw.orders").is_none());
    }
}
