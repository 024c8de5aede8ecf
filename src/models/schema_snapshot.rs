use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub ordinal: i32,
}

/// Canonical hash over a column list, stable under semantic equivalence: same
/// columns, same order (by ordinal), same attributes always hash identically.
pub fn snapshot_hash(columns: &[ColumnDef]) -> String {
    let mut ordered = columns.to_vec();
    ordered.sort_by_key(|c| c.ordinal);

    let mut hasher = Sha256::new();
    for col in &ordered {
        hasher.update(col.ordinal.to_le_bytes());
        hasher.update(col.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(col.data_type.as_bytes());
        hasher.update([0u8]);
        hasher.update([col.nullable as u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// An append-only record per `(table_id, captured_at)`; the most recent row
/// per table is the drift baseline.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SchemaSnapshot {
    pub id: i64,
    pub table_id: i64,
    /// JSON-encoded `Vec<ColumnDef>`, ordered by ordinal.
    pub columns_json: String,
    pub snapshot_hash: String,
    pub captured_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    pub fn columns(&self) -> Vec<ColumnDef> {
        serde_json::from_str(&self.columns_json).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, ty: &str, nullable: bool, ordinal: i32) -> ColumnDef {
        ColumnDef { name: name.to_string(), data_type: ty.to_string(), nullable, ordinal }
    }

    #[test]
    fn hash_is_stable_under_reordering_of_equivalent_input() {
        let a = vec![col("id", "INT", false, 1), col("price", "FLOAT", true, 2)];
        let b = vec![col("price", "FLOAT", true, 2), col("id", "INT", false, 1)];
        assert_eq!(snapshot_hash(&a), snapshot_hash(&b));
    }

    #[test]
    fn hash_changes_when_type_changes() {
        let a = vec![col("id", "INT", false, 1), col("price", "FLOAT", true, 2)];
        let b = vec![col("id", "INT", false, 1), col("price", "VARCHAR(255)", true, 2)];
        assert_ne!(snapshot_hash(&a), snapshot_hash(&b));
    }
}
