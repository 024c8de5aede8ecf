//! WarehouseConnector adapter contract and dialect factory.
//!
//! Grounded in the cluster adapter abstraction: a polymorphic trait over a
//! fixed capability set, with a factory keyed on a dialect tag.

pub mod bigquery;
pub mod postgres;
pub mod snowflake;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Dialect;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("connectivity error: {0}")]
    Connectivity(String),
    #[error("permission error: {0}")]
    Permission(String),
    #[error("unsupported on this dialect: {0}")]
    Unsupported(String),
}

impl ConnectorError {
    /// All connector failures are recoverable; none is fatal to the scanner.
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TableKind {
    Table,
    View,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRef {
    pub name: String,
    pub kind: TableKind,
    pub schema: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub sql: String,
    pub user: String,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

pub use crate::models::ColumnDef;

/// Object-safe adapter over a single external warehouse connection.
///
/// Scoped acquisition of pooled resources is the connector's own
/// responsibility; the core calls `dispose` on every exit path on which it
/// created the connector.
#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Must filter catalog/system schemas for the dialect
    /// (`information_schema`, `pg_*`, `snowflake`, etc).
    async fn list_schemas(&self) -> Result<Vec<String>, ConnectorError>;

    async fn list_tables(&self, schema: &str) -> Result<Vec<TableRef>, ConnectorError>;

    /// Ordered by `ordinal`; ordering is required for hash stability.
    async fn fetch_columns(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnDef>, ConnectorError>;

    /// `None` means the best available signal (audit column MAX, catalog
    /// modification time) was inconclusive; the sentinel treats that as
    /// "freshness not evaluable", not as an error.
    async fn fetch_last_update_time(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Option<DateTime<Utc>>, ConnectorError>;

    /// Only queries with target-modifying semantics (INSERT / CREATE-AS / MERGE).
    async fn extract_query_log(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<QueryLogEntry>, ConnectorError>;

    async fn dispose(&self);
}

/// Factory: instantiate a connector for a decrypted connection URI, keyed on
/// dialect, mirroring the cluster-adapter `create_adapter` pattern.
pub fn create_connector(dialect: Dialect, uri: &str) -> Box<dyn WarehouseConnector> {
    match dialect {
        Dialect::Postgres => Box::new(postgres::PostgresConnector::new(uri)),
        Dialect::Snowflake => Box::new(snowflake::SnowflakeConnector::new(uri)),
        Dialect::BigQuery => Box::new(bigquery::BigQueryConnector::new(uri)),
    }
}
