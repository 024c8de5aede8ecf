use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{ColumnDef, ConnectorError, QueryLogEntry, TableKind, TableRef, WarehouseConnector};
use crate::models::Dialect;

const SYSTEM_SCHEMAS: &[&str] = &["information_schema", "pg_catalog", "pg_toast"];

pub struct PostgresConnector {
    pool: PgPool,
}

impl PostgresConnector {
    pub fn new(uri: &str) -> Self {
        // connect_lazy defers the actual TCP/auth handshake to first use, so
        // constructing a connector never blocks and never fails eagerly.
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect_lazy(uri)
            .expect("invalid postgres connection string");
        Self { pool }
    }

    fn map_connect_err(e: sqlx::Error) -> ConnectorError {
        match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("42501") => {
                ConnectorError::Permission(db.message().to_string())
            },
            other => ConnectorError::Connectivity(other.to_string()),
        }
    }
}

#[async_trait]
impl WarehouseConnector for PostgresConnector {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn list_schemas(&self) -> Result<Vec<String>, ConnectorError> {
        let rows = sqlx::query("SELECT schema_name FROM information_schema.schemata")
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_connect_err)?;

        Ok(rows
            .into_iter()
            .map(|r| r.get::<String, _>("schema_name"))
            .filter(|name| !SYSTEM_SCHEMAS.contains(&name.as_str()))
            .collect())
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<TableRef>, ConnectorError> {
        let rows = sqlx::query(
            "SELECT table_name, table_type FROM information_schema.tables WHERE table_schema = $1",
        )
        .bind(schema)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_connect_err)?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let table_type: String = r.get("table_type");
                let kind =
                    if table_type == "VIEW" { TableKind::View } else { TableKind::Table };
                TableRef { name: r.get("table_name"), kind, schema: schema.to_string() }
            })
            .collect())
    }

    async fn fetch_columns(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnDef>, ConnectorError> {
        let rows = sqlx::query(
            "SELECT column_name, data_type, is_nullable, ordinal_position \
             FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 \
             ORDER BY ordinal_position",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_connect_err)?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let is_nullable: String = r.get("is_nullable");
                ColumnDef {
                    name: r.get("column_name"),
                    data_type: r.get("data_type"),
                    nullable: is_nullable == "YES",
                    ordinal: r.get::<i32, _>("ordinal_position"),
                }
            })
            .collect())
    }

    async fn fetch_last_update_time(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Option<DateTime<Utc>>, ConnectorError> {
        // Heuristic, per spec's open question on "last updated" source of
        // truth: prefer a recognized audit column if one exists, otherwise
        // fall back to the catalog's last-autovacuum/analyze signal.
        let audit_candidates = ["updated_at", "modified_at", "last_modified"];
        for column in audit_candidates {
            let exists: Option<(String,)> = sqlx::query_as(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 AND column_name = $3",
            )
            .bind(schema)
            .bind(table)
            .bind(column)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_connect_err)?;

            if exists.is_some() {
                let query = format!(
                    "SELECT MAX(\"{column}\") as last_update FROM \"{schema}\".\"{table}\""
                );
                let row = sqlx::query(&query)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(Self::map_connect_err)?;
                if let Some(row) = row {
                    let value: Option<DateTime<Utc>> = row.try_get("last_update").ok();
                    if value.is_some() {
                        return Ok(value);
                    }
                }
            }
        }

        let row = sqlx::query(
            "SELECT GREATEST(last_autovacuum, last_autoanalyze) as last_touched \
             FROM pg_stat_user_tables WHERE schemaname = $1 AND relname = $2",
        )
        .bind(schema)
        .bind(table)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::map_connect_err)?;

        Ok(row.and_then(|r| r.try_get::<Option<DateTime<Utc>>, _>("last_touched").ok().flatten()))
    }

    async fn extract_query_log(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<QueryLogEntry>, ConnectorError> {
        // Requires the pg_stat_statements extension; treated as Unsupported
        // when absent rather than failing the whole cycle.
        let rows = sqlx::query(
            "SELECT query, rolname as usename, calls, mean_exec_time \
             FROM pg_stat_statements s JOIN pg_roles r ON r.oid = s.userid \
             WHERE query ~* '^\\s*(INSERT|CREATE\\s+TABLE|MERGE)' \
             ORDER BY s.queryid DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.message().contains("pg_stat_statements") => {
                ConnectorError::Unsupported("pg_stat_statements extension not installed".into())
            },
            other => Self::map_connect_err_ref(other),
        })?;

        Ok(rows
            .into_iter()
            .map(|r| QueryLogEntry {
                sql: r.get("query"),
                user: r.get("usename"),
                executed_at: since,
                duration_ms: r.get::<f64, _>("mean_exec_time") as i64,
            })
            .collect())
    }

    async fn dispose(&self) {
        self.pool.close().await;
    }
}

impl PostgresConnector {
    fn map_connect_err_ref(e: &sqlx::Error) -> ConnectorError {
        ConnectorError::Connectivity(e.to_string())
    }
}
