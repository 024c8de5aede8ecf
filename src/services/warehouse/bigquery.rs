use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ColumnDef, ConnectorError, QueryLogEntry, TableRef, WarehouseConnector};
use crate::models::Dialect;

/// Stub demonstrating the `WarehouseConnector` seam for BigQuery. A full
/// implementation would wrap the BigQuery REST API (jobs.query, tables.list)
/// the same way `SnowflakeConnector` wraps the Snowflake SQL API; left
/// unimplemented here since the core doesn't depend on BigQuery specifics.
pub struct BigQueryConnector {
    #[allow(dead_code)]
    project_uri: String,
}

impl BigQueryConnector {
    pub fn new(uri: &str) -> Self {
        Self { project_uri: uri.to_string() }
    }
}

#[async_trait]
impl WarehouseConnector for BigQueryConnector {
    fn dialect(&self) -> Dialect {
        Dialect::BigQuery
    }

    async fn list_schemas(&self) -> Result<Vec<String>, ConnectorError> {
        Err(ConnectorError::Unsupported("bigquery connector is a stub".into()))
    }

    async fn list_tables(&self, _schema: &str) -> Result<Vec<TableRef>, ConnectorError> {
        Err(ConnectorError::Unsupported("bigquery connector is a stub".into()))
    }

    async fn fetch_columns(
        &self,
        _schema: &str,
        _table: &str,
    ) -> Result<Vec<ColumnDef>, ConnectorError> {
        Err(ConnectorError::Unsupported("bigquery connector is a stub".into()))
    }

    async fn fetch_last_update_time(
        &self,
        _schema: &str,
        _table: &str,
    ) -> Result<Option<DateTime<Utc>>, ConnectorError> {
        Ok(None)
    }

    async fn extract_query_log(
        &self,
        _since: DateTime<Utc>,
        _limit: u32,
    ) -> Result<Vec<QueryLogEntry>, ConnectorError> {
        Err(ConnectorError::Unsupported("bigquery connector is a stub".into()))
    }

    async fn dispose(&self) {}
}
