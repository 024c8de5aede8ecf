//! The five tools the agentic discovery path is bound to. Each tool
//! closes over the connector and lineage engine for a single `discover`
//! invocation; nothing here is global state.

use serde_json::{Value, json};

use crate::services::lineage::LineageEngine;
use crate::services::warehouse::WarehouseConnector;

pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "list_warehouse_schemas",
            description: "List non-system schemas visible in the warehouse connection.",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        },
        ToolSpec {
            name: "list_schema_tables",
            description: "List tables and views within a given schema.",
            parameters: json!({
                "type": "object",
                "properties": {"schema": {"type": "string"}},
                "required": ["schema"],
            }),
        },
        ToolSpec {
            name: "inspect_table_columns",
            description: "Fetch the ordered column definitions of a table.",
            parameters: json!({
                "type": "object",
                "properties": {"schema": {"type": "string"}, "table": {"type": "string"}},
                "required": ["schema", "table"],
            }),
        },
        ToolSpec {
            name: "check_table_freshness",
            description: "Fetch the most recent observed update time of a table, if determinable.",
            parameters: json!({
                "type": "object",
                "properties": {"schema": {"type": "string"}, "table": {"type": "string"}},
                "required": ["schema", "table"],
            }),
        },
        ToolSpec {
            name: "get_known_lineage",
            description: "Fetch already-ingested upstream/downstream neighbors of a fully-qualified table name.",
            parameters: json!({
                "type": "object",
                "properties": {"fqn": {"type": "string"}},
                "required": ["fqn"],
            }),
        },
    ]
}

/// Binds a single `discover` call's connector and lineage engine to the
/// fixed tool set. Errors are returned as tool observations (a string the
/// agent can read), never as a hard failure of the agent loop.
pub struct ToolSet<'a> {
    pub connector: &'a dyn WarehouseConnector,
    pub lineage: &'a LineageEngine,
}

impl<'a> ToolSet<'a> {
    pub async fn dispatch(&self, name: &str, arguments: &str) -> Value {
        let args: Value = serde_json::from_str(arguments).unwrap_or(Value::Null);
        match name {
            "list_warehouse_schemas" => match self.connector.list_schemas().await {
                Ok(schemas) => json!({"schemas": schemas}),
                Err(e) => json!({"error": e.to_string()}),
            },
            "list_schema_tables" => {
                let Some(schema) = args.get("schema").and_then(Value::as_str) else {
                    return json!({"error": "missing schema argument"});
                };
                match self.connector.list_tables(schema).await {
                    Ok(tables) => json!({
                        "tables": tables.iter().map(|t| json!({"name": t.name, "kind": t.kind})).collect::<Vec<_>>(),
                    }),
                    Err(e) => json!({"error": e.to_string()}),
                }
            },
            "inspect_table_columns" => {
                let (Some(schema), Some(table)) =
                    (args.get("schema").and_then(Value::as_str), args.get("table").and_then(Value::as_str))
                else {
                    return json!({"error": "missing schema or table argument"});
                };
                match self.connector.fetch_columns(schema, table).await {
                    Ok(columns) => json!({"columns": columns}),
                    Err(e) => json!({"error": e.to_string()}),
                }
            },
            "check_table_freshness" => {
                let (Some(schema), Some(table)) =
                    (args.get("schema").and_then(Value::as_str), args.get("table").and_then(Value::as_str))
                else {
                    return json!({"error": "missing schema or table argument"});
                };
                match self.connector.fetch_last_update_time(schema, table).await {
                    Ok(last_update) => json!({"last_update": last_update}),
                    Err(e) => json!({"error": e.to_string()}),
                }
            },
            "get_known_lineage" => {
                let Some(fqn) = args.get("fqn").and_then(Value::as_str) else {
                    return json!({"error": "missing fqn argument"});
                };
                match (self.lineage.upstream(fqn, 1, 0.0).await, self.lineage.downstream(fqn, 1, 0.0).await) {
                    (Ok(up), Ok(down)) => json!({
                        "upstream": up.iter().map(|n| &n.table).collect::<Vec<_>>(),
                        "downstream": down.iter().map(|n| &n.table).collect::<Vec<_>>(),
                    }),
                    (Err(e), _) | (_, Err(e)) => json!({"error": e.to_string()}),
                }
            },
            other => json!({"error": format!("unknown tool: {other}")}),
        }
    }
}
