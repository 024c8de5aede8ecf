use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Direct,
    Derived,
    Aggregated,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Derived => "derived",
            Self::Aggregated => "aggregated",
        }
    }
}

/// Directed edge `(source, target)` keyed by fully-qualified table names.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LineageEdge {
    pub id: i64,
    pub source_fqn: String,
    pub target_fqn: String,
    pub relationship: String,
    pub confidence: f64,
    pub query_hash: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl LineageEdge {
    pub fn is_stale(&self, now: DateTime<Utc>, staleness_window: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_seen_at) > staleness_window
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LineageGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<LineageEdge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraversalNode {
    pub table: String,
    pub depth: u32,
    pub confidence_along_path: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlastRadius {
    pub affected_tables: Vec<String>,
    pub total: usize,
    pub max_depth: u32,
    pub has_terminal_consumers: bool,
    pub stale: bool,
}
