use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Postgres,
    Snowflake,
    BigQuery,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Snowflake => "snowflake",
            Self::BigQuery => "big_query",
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "snowflake" => Ok(Self::Snowflake),
            "big_query" | "bigquery" => Ok(Self::BigQuery),
            other => Err(format!("unknown dialect: {other}")),
        }
    }
}

/// Identity of an external warehouse. `uri_ciphertext` is opaque to the core;
/// it is decrypted only when a connector is instantiated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Connection {
    pub id: i64,
    pub name: String,
    pub dialect: String,
    pub uri_ciphertext: String,
    pub is_active: bool,
    /// High-water mark for lineage query-log ingestion; `None` until the
    /// first successful `refresh_lineage_once` against this connection.
    pub lineage_ingested_through: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    pub fn dialect(&self) -> Result<Dialect, String> {
        self.dialect.parse()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionResponse {
    pub id: i64,
    pub name: String,
    pub dialect: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Connection> for ConnectionResponse {
    fn from(c: Connection) -> Self {
        Self {
            id: c.id,
            name: c.name,
            dialect: c.dialect,
            is_active: c.is_active,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateConnectionRequest {
    pub name: String,
    pub dialect: Dialect,
    /// Plaintext URI; encrypted immediately on receipt via the encryption port.
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateConnectionRequest {
    pub name: Option<String>,
    pub uri: Option<String>,
    pub is_active: Option<bool>,
}
