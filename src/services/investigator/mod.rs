//! Investigator: warehouse discovery and classification. Primary path is a
//! bounded tool-calling agent; fallback is pure name-pattern classification.
//! Neither path persists anything — output is always a transient report.

pub mod classify;
pub mod client;
pub mod tools;

pub use client::{AgentMessage, AgentStep, OpenAiAgentClient, ToolCall, ToolCallingLLMClient};
pub use tools::{ToolSet, tool_specs};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{Connection, DeltaAction, DiscoveryReport, TableDelta, TableProposal};
use crate::services::lineage::LineageEngine;
use crate::services::warehouse::WarehouseConnector;

#[derive(Debug, thiserror::Error)]
pub enum InvestigatorError {
    #[error("investigator api error: {0}")]
    Api(String),
    #[error("investigator response parse error: {0}")]
    Parse(String),
    #[error("investigator timeout after {0}s")]
    Timeout(u64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

const MAX_TOOL_CALLS: u32 = 25;
const MAX_WALL_CLOCK: Duration = Duration::from_secs(120);

const SYSTEM_PROMPT: &str = r#"You are a data platform engineer discovering and classifying tables in an \
analytical warehouse connection. Use the provided tools to list schemas, list tables per schema, inspect \
columns, check freshness, and look up already-known lineage. Favor a small number of well-chosen tool calls \
over exhaustively inspecting every table. Skip catalog/system tables. When you have enough information, \
respond with no tool calls and a single JSON object matching exactly this schema, no prose outside the object:
{
  "connection_id": 0,
  "connection_name": "",
  "schemas_found": array of schema name strings,
  "total_tables": integer,
  "proposals": [
    {
      "schema": string,
      "table": string,
      "fqn": string ("schema.table"),
      "role": "fact" | "dimension" | "staging" | "raw" | "snapshot" | "system" | "unknown",
      "columns": [{"name": string, "type": string, "nullable": bool, "ordinal": integer}],
      "recommended_checks": array of "schema" | "freshness",
      "suggested_sla_minutes": integer or null,
      "reasoning": string,
      "skip": bool
    }
  ],
  "concerns": array of strings (anything you could not determine or that looked suspicious),
  "generated_at": "1970-01-01T00:00:00Z"
}
`connection_id`, `connection_name`, and `generated_at` are placeholders; the caller overwrites them."#;

pub struct Investigator {
    pool: SqlitePool,
    client: Option<Arc<dyn ToolCallingLLMClient>>,
}

impl Investigator {
    pub fn new(pool: SqlitePool, client: Option<Arc<dyn ToolCallingLLMClient>>) -> Self {
        Self { pool, client }
    }

    /// Tries the agentic path when a client is configured; any failure
    /// (timeout, budget exhaustion, malformed output) falls back to the
    /// deterministic classifier rather than surfacing an error.
    pub async fn discover(
        &self,
        connector: &dyn WarehouseConnector,
        connection: &Connection,
        lineage: &LineageEngine,
    ) -> DiscoveryReport {
        if let Some(client) = self.client.clone() {
            match self.agent_discover(client.as_ref(), connector, connection, lineage).await {
                Ok(report) => return report,
                Err(e) => tracing::warn!(error = %e, "investigator agent path failed, falling back"),
            }
        }
        self.fallback_discover(connector, connection).await
    }

    async fn fallback_discover(&self, connector: &dyn WarehouseConnector, connection: &Connection) -> DiscoveryReport {
        let mut proposals = Vec::new();
        let mut concerns = Vec::new();

        let schemas = match connector.list_schemas().await {
            Ok(s) => s,
            Err(e) => {
                concerns.push(format!("failed to list schemas: {e}"));
                Vec::new()
            },
        };

        let mut total_tables = 0usize;
        for schema in &schemas {
            let tables = match connector.list_tables(schema).await {
                Ok(t) => t,
                Err(e) => {
                    concerns.push(format!("failed to list tables in {schema}: {e}"));
                    continue;
                },
            };
            for table_ref in tables {
                total_tables += 1;
                let columns = match connector.fetch_columns(schema, &table_ref.name).await {
                    Ok(c) => c,
                    Err(e) => {
                        concerns.push(format!("failed to inspect columns for {schema}.{}: {e}", table_ref.name));
                        Vec::new()
                    },
                };
                let classification = classify::classify(schema, &table_ref.name, &columns);
                proposals.push(TableProposal {
                    schema: schema.clone(),
                    table: table_ref.name.clone(),
                    fqn: format!("{schema}.{}", table_ref.name),
                    role: classification.role,
                    columns,
                    recommended_checks: classification.recommended_checks,
                    suggested_sla_minutes: classification.suggested_sla_minutes,
                    reasoning: classification.reasoning,
                    skip: classification.skip,
                });
            }
        }

        DiscoveryReport {
            connection_id: connection.id,
            connection_name: connection.name.clone(),
            schemas_found: schemas,
            total_tables,
            proposals,
            concerns,
            generated_at: Utc::now(),
        }
    }

    async fn agent_discover(
        &self,
        client: &dyn ToolCallingLLMClient,
        connector: &dyn WarehouseConnector,
        connection: &Connection,
        lineage: &LineageEngine,
    ) -> Result<DiscoveryReport, InvestigatorError> {
        let tools = tool_specs();
        let toolset = ToolSet { connector, lineage };
        let mut messages = vec![
            AgentMessage::System(SYSTEM_PROMPT.to_string()),
            AgentMessage::User(format!(
                "Investigate connection '{}' (dialect: {}). Discover every schema and table worth monitoring.",
                connection.name, connection.dialect
            )),
        ];

        let deadline = Instant::now() + MAX_WALL_CLOCK;
        let mut tool_calls_made = 0u32;

        loop {
            if Instant::now() >= deadline {
                return Err(InvestigatorError::Timeout(MAX_WALL_CLOCK.as_secs()));
            }
            if tool_calls_made >= MAX_TOOL_CALLS {
                return Err(InvestigatorError::Api("exceeded maximum tool-call budget".to_string()));
            }

            let step = client.step(&messages, &tools).await?;

            if step.tool_calls.is_empty() {
                let content = step.content.ok_or_else(|| {
                    InvestigatorError::Parse("agent returned neither content nor tool calls".to_string())
                })?;
                let mut report: DiscoveryReport =
                    serde_json::from_str(&content).map_err(|e| InvestigatorError::Parse(e.to_string()))?;
                report.connection_id = connection.id;
                report.connection_name = connection.name.clone();
                report.generated_at = Utc::now();
                return Ok(report);
            }

            tool_calls_made += step.tool_calls.len() as u32;
            messages.push(AgentMessage::Assistant { content: step.content.clone(), tool_calls: step.tool_calls.clone() });
            for call in &step.tool_calls {
                let result = toolset.dispatch(&call.name, &call.arguments).await;
                messages.push(AgentMessage::Tool { tool_call_id: call.id.clone(), content: result.to_string() });
            }
        }
    }

    /// Deterministic set-difference between the warehouse's current tables
    /// and the monitored set for `connection_id`, sorted by FQN.
    pub async fn rediscover(
        &self,
        connector: &dyn WarehouseConnector,
        connection_id: i64,
    ) -> Result<Vec<TableDelta>, InvestigatorError> {
        let mut warehouse = Vec::new();
        for schema in connector.list_schemas().await.map_err(|e| InvestigatorError::Api(e.to_string()))? {
            let tables = connector.list_tables(&schema).await.map_err(|e| InvestigatorError::Api(e.to_string()))?;
            for table_ref in tables {
                warehouse.push((schema.clone(), table_ref.name));
            }
        }

        let monitored: Vec<MonitoredRef> = sqlx::query_as(
            "SELECT schema_name, table_name FROM monitored_tables WHERE connection_id = ?",
        )
        .bind(connection_id)
        .fetch_all(&self.pool)
        .await?;

        let warehouse_fqns: HashSet<String> = warehouse.iter().map(|(s, t)| format!("{s}.{t}")).collect();
        let monitored_fqns: HashSet<String> =
            monitored.iter().map(|m| format!("{}.{}", m.schema_name, m.table_name)).collect();

        let mut deltas = Vec::new();
        for (schema, table) in &warehouse {
            let fqn = format!("{schema}.{table}");
            if !monitored_fqns.contains(&fqn) {
                deltas.push(TableDelta {
                    action: DeltaAction::New,
                    schema: schema.clone(),
                    table: table.clone(),
                    fqn,
                    proposal: None,
                });
            }
        }
        for m in &monitored {
            let fqn = format!("{}.{}", m.schema_name, m.table_name);
            if !warehouse_fqns.contains(&fqn) {
                deltas.push(TableDelta {
                    action: DeltaAction::Dropped,
                    schema: m.schema_name.clone(),
                    table: m.table_name.clone(),
                    fqn,
                    proposal: None,
                });
            }
        }

        deltas.sort_by(|a, b| a.fqn.cmp(&b.fqn));
        Ok(deltas)
    }
}

#[derive(sqlx::FromRow)]
struct MonitoredRef {
    schema_name: String,
    table_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_db;
    use crate::models::Dialect;
    use crate::services::warehouse::{ColumnDef as WColumnDef, ConnectorError, QueryLogEntry, TableKind, TableRef};
    use async_trait::async_trait;
    use chrono::DateTime;

    struct StubConnector {
        schemas: Vec<&'static str>,
        tables: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl WarehouseConnector for StubConnector {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        async fn list_schemas(&self) -> Result<Vec<String>, ConnectorError> {
            Ok(self.schemas.iter().map(|s| s.to_string()).collect())
        }

        async fn list_tables(&self, schema: &str) -> Result<Vec<TableRef>, ConnectorError> {
            Ok(self
                .tables
                .iter()
                .filter(|(s, _)| *s == schema)
                .map(|(_, t)| TableRef { name: t.to_string(), kind: TableKind::Table, schema: schema.to_string() })
                .collect())
        }

        async fn fetch_columns(&self, _schema: &str, _table: &str) -> Result<Vec<WColumnDef>, ConnectorError> {
            Ok(vec![])
        }

        async fn fetch_last_update_time(
            &self,
            _schema: &str,
            _table: &str,
        ) -> Result<Option<DateTime<Utc>>, ConnectorError> {
            Ok(None)
        }

        async fn extract_query_log(&self, _since: DateTime<Utc>, _limit: u32) -> Result<Vec<QueryLogEntry>, ConnectorError> {
            Ok(vec![])
        }

        async fn dispose(&self) {}
    }

    fn connection() -> Connection {
        Connection {
            id: 1,
            name: "warehouse".to_string(),
            dialect: "postgres".to_string(),
            uri_ciphertext: "ciphertext".to_string(),
            is_active: true,
            lineage_ingested_through: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn fallback_classifies_and_skips_system_tables() {
        let investigator = Investigator::new(create_test_db().await, None);
        let connector = StubConnector {
            schemas: vec!["analytics"],
            tables: vec![("analytics", "fct_orders"), ("analytics", "_backup_orders")],
        };

        let report = investigator.fallback_discover(&connector, &connection()).await;
        assert_eq!(report.total_tables, 2);
        assert_eq!(report.proposals.len(), 2);
        let backup = report.proposals.iter().find(|p| p.table == "_backup_orders").unwrap();
        assert!(backup.skip);
    }

    #[tokio::test]
    async fn rediscover_reports_new_table_not_yet_monitored() {
        let pool = create_test_db().await;
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO connections (name, dialect, uri_ciphertext, is_active, created_at, updated_at) \
             VALUES ('warehouse', 'postgres', 'ciphertext', 1, ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO monitored_tables \
             (connection_id, schema_name, table_name, fully_qualified_name, check_types, freshness_sla_minutes, created_at, updated_at) \
             VALUES (1, 'public', 'a', 'public.a', '[\"schema\"]', NULL, ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        let investigator = Investigator::new(pool, None);
        let connector = StubConnector { schemas: vec!["public"], tables: vec![("public", "a"), ("public", "b")] };

        let deltas = investigator.rediscover(&connector, 1).await.unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].fqn, "public.b");
        assert_eq!(deltas[0].action, DeltaAction::New);
    }

    #[tokio::test]
    async fn rediscover_is_empty_when_warehouse_matches_monitored_set() {
        let pool = create_test_db().await;
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO connections (name, dialect, uri_ciphertext, is_active, created_at, updated_at) \
             VALUES ('warehouse', 'postgres', 'ciphertext', 1, ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO monitored_tables \
             (connection_id, schema_name, table_name, fully_qualified_name, check_types, freshness_sla_minutes, created_at, updated_at) \
             VALUES (1, 'public', 'a', 'public.a', '[\"schema\"]', NULL, ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        let investigator = Investigator::new(pool, None);
        let connector = StubConnector { schemas: vec!["public"], tables: vec![("public", "a")] };

        let deltas = investigator.rediscover(&connector, 1).await.unwrap();
        assert!(deltas.is_empty());
    }
}
