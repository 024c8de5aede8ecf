use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{ColumnDef, ConnectorError, QueryLogEntry, TableKind, TableRef, WarehouseConnector};
use crate::models::Dialect;

/// Talks to the Snowflake SQL API (`https://<account>.snowflakecomputing.com/api/v2/statements`)
/// over HTTPS, the REST-shaped counterpart to the Postgres connector's direct
/// wire protocol. `uri` is `https://<account>.snowflakecomputing.com?token=...&warehouse=...`.
pub struct SnowflakeConnector {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    #[serde(rename = "resultSetMetaData")]
    metadata: Option<ResultSetMetaData>,
    data: Option<Vec<Vec<serde_json::Value>>>,
}

#[derive(Debug, Deserialize)]
struct ResultSetMetaData {
    #[serde(rename = "rowType")]
    row_type: Vec<RowTypeEntry>,
}

#[derive(Debug, Deserialize)]
struct RowTypeEntry {
    name: String,
}

impl SnowflakeConnector {
    pub fn new(uri: &str) -> Self {
        let (base_url, token) = parse_uri(uri);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build snowflake http client");
        Self { http, base_url, token }
    }

    async fn run_statement(&self, sql: &str) -> Result<StatementResponse, ConnectorError> {
        let resp = self
            .http
            .post(format!("{}/api/v2/statements", self.base_url))
            .bearer_auth(&self.token)
            .json(&json!({ "statement": sql, "timeout": 30 }))
            .send()
            .await
            .map_err(|e| ConnectorError::Connectivity(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(ConnectorError::Permission("insufficient warehouse privileges".into()));
        }
        if !resp.status().is_success() {
            return Err(ConnectorError::Connectivity(format!(
                "snowflake sql api returned {}",
                resp.status()
            )));
        }

        resp.json::<StatementResponse>()
            .await
            .map_err(|e| ConnectorError::Connectivity(e.to_string()))
    }

    fn column_index(meta: &Option<ResultSetMetaData>, name: &str) -> Option<usize> {
        meta.as_ref()?.row_type.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

fn parse_uri(uri: &str) -> (String, String) {
    let url = reqwest::Url::parse(uri).unwrap_or_else(|_| {
        reqwest::Url::parse("https://invalid.snowflakecomputing.com").unwrap()
    });
    let base_url = format!(
        "{}://{}",
        url.scheme(),
        url.host_str().unwrap_or("invalid.snowflakecomputing.com")
    );
    let token = url
        .query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.to_string())
        .unwrap_or_default();
    (base_url, token)
}

#[async_trait]
impl WarehouseConnector for SnowflakeConnector {
    fn dialect(&self) -> Dialect {
        Dialect::Snowflake
    }

    async fn list_schemas(&self) -> Result<Vec<String>, ConnectorError> {
        let resp = self.run_statement("SHOW SCHEMAS").await?;
        let idx = Self::column_index(&resp.metadata, "name").unwrap_or(1);
        Ok(resp
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| row.get(idx).and_then(|v| v.as_str()).map(str::to_string))
            .filter(|name| !name.eq_ignore_ascii_case("information_schema"))
            .collect())
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<TableRef>, ConnectorError> {
        let resp = self.run_statement(&format!("SHOW TABLES IN SCHEMA {schema}")).await?;
        let idx = Self::column_index(&resp.metadata, "name").unwrap_or(1);
        Ok(resp
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| {
                row.get(idx)
                    .and_then(|v| v.as_str())
                    .map(|name| TableRef {
                        name: name.to_string(),
                        kind: TableKind::Table,
                        schema: schema.to_string(),
                    })
            })
            .collect())
    }

    async fn fetch_columns(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnDef>, ConnectorError> {
        let resp = self
            .run_statement(&format!(
                "SELECT column_name, data_type, is_nullable, ordinal_position \
                 FROM information_schema.columns \
                 WHERE table_schema = '{schema}' AND table_name = '{table}' \
                 ORDER BY ordinal_position"
            ))
            .await?;

        let rows = resp.data.unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(ColumnDef {
                    name: row.first()?.as_str()?.to_string(),
                    data_type: row.get(1)?.as_str()?.to_string(),
                    nullable: row.get(2)?.as_str()? == "YES",
                    ordinal: row.get(3)?.as_str()?.parse().ok()?,
                })
            })
            .collect())
    }

    async fn fetch_last_update_time(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Option<DateTime<Utc>>, ConnectorError> {
        let resp = self.run_statement(&format!("SHOW TABLES LIKE '{table}' IN SCHEMA {schema}")).await?;
        let idx = Self::column_index(&resp.metadata, "last_altered").or(Some(3));
        let Some(idx) = idx else { return Ok(None) };
        let value = resp
            .data
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|row| row.get(idx).and_then(|v| v.as_str()).map(str::to_string))
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Ok(value)
    }

    async fn extract_query_log(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<QueryLogEntry>, ConnectorError> {
        let resp = self
            .run_statement(&format!(
                "SELECT query_text, user_name, start_time, total_elapsed_time \
                 FROM table(information_schema.query_history()) \
                 WHERE start_time >= '{}' \
                 AND (query_text ILIKE 'INSERT%' OR query_text ILIKE 'CREATE TABLE%' OR query_text ILIKE 'MERGE%') \
                 ORDER BY start_time DESC LIMIT {limit}",
                since.to_rfc3339()
            ))
            .await?;

        Ok(resp
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| {
                Some(QueryLogEntry {
                    sql: row.first()?.as_str()?.to_string(),
                    user: row.get(1)?.as_str()?.to_string(),
                    executed_at: row
                        .get(2)
                        .and_then(|v| v.as_str())
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or(since),
                    duration_ms: row.get(3).and_then(|v| v.as_i64()).unwrap_or(0),
                })
            })
            .collect())
    }

    async fn dispose(&self) {}
}
