//! Lineage engine: ingest captured SQL into `(source -> target)` edges and
//! serve upstream/downstream/blast-radius/path queries over the non-stale
//! subgraph.

mod ingest;

pub use ingest::extract_lineage;

use chrono::{Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::{HashSet, VecDeque};

use crate::models::{BlastRadius, LineageEdge, LineageGraph, Relationship, TraversalNode};

/// Edges not re-observed within this window are excluded from query results
/// but kept in storage for auditability.
pub const STALENESS_WINDOW_DAYS: i64 = 30;

pub struct LineageEngine {
    pool: SqlitePool,
}

impl LineageEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn staleness_window() -> ChronoDuration {
        ChronoDuration::days(STALENESS_WINDOW_DAYS)
    }

    /// Parse one captured query and upsert any `(source, target)` edges found.
    /// Unparseable queries are skipped silently (logged at DEBUG).
    pub async fn ingest_query(&self, sql: &str) -> Result<(), sqlx::Error> {
        let Some((target, sources)) = extract_lineage(sql) else {
            tracing::debug!("unparseable query skipped during lineage ingest");
            return Ok(());
        };

        let query_hash = format!("{:x}", Sha256::digest(sql.as_bytes()));

        for (source, relationship, confidence) in sources {
            if source == target {
                continue;
            }
            self.upsert_edge(&source, &target, relationship, confidence, &query_hash).await?;
        }
        Ok(())
    }

    /// On conflict: update `last_seen_at` and take `max(confidence)`; never
    /// decrease confidence.
    async fn upsert_edge(
        &self,
        source: &str,
        target: &str,
        relationship: Relationship,
        confidence: f64,
        query_hash: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO lineage_edges (source_fqn, target_fqn, relationship, confidence, query_hash, first_seen_at, last_seen_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(source_fqn, target_fqn) DO UPDATE SET \
               last_seen_at = excluded.last_seen_at, \
               confidence = MAX(lineage_edges.confidence, excluded.confidence), \
               query_hash = excluded.query_hash",
        )
        .bind(source)
        .bind(target)
        .bind(relationship.as_str())
        .bind(confidence)
        .bind(query_hash)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn non_stale_edges(&self) -> Result<Vec<LineageEdge>, sqlx::Error> {
        let edges: Vec<LineageEdge> = sqlx::query_as("SELECT * FROM lineage_edges")
            .fetch_all(&self.pool)
            .await?;
        let now = Utc::now();
        let window = Self::staleness_window();
        Ok(edges.into_iter().filter(|e| !e.is_stale(now, window)).collect())
    }

    pub async fn graph(&self) -> Result<LineageGraph, sqlx::Error> {
        let edges = self.non_stale_edges().await?;
        let mut nodes: HashSet<String> = HashSet::new();
        for e in &edges {
            nodes.insert(e.source_fqn.clone());
            nodes.insert(e.target_fqn.clone());
        }
        let mut nodes: Vec<String> = nodes.into_iter().collect();
        nodes.sort();
        Ok(LineageGraph { nodes, edges })
    }

    /// Bounded BFS on non-stale edges filtered by `min_confidence`, walking
    /// `source -> target` edges forward from `table`.
    pub async fn downstream(
        &self,
        table: &str,
        depth: u32,
        min_confidence: f64,
    ) -> Result<Vec<TraversalNode>, sqlx::Error> {
        self.traverse(table, depth, min_confidence, Direction::Downstream).await
    }

    /// Same as `downstream` but walks `target -> source` edges backward.
    pub async fn upstream(
        &self,
        table: &str,
        depth: u32,
        min_confidence: f64,
    ) -> Result<Vec<TraversalNode>, sqlx::Error> {
        self.traverse(table, depth, min_confidence, Direction::Upstream).await
    }

    async fn traverse(
        &self,
        table: &str,
        max_depth: u32,
        min_confidence: f64,
        direction: Direction,
    ) -> Result<Vec<TraversalNode>, sqlx::Error> {
        let edges = self.non_stale_edges().await?;

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(table.to_string());
        let mut queue: VecDeque<(String, u32, f64)> = VecDeque::new();
        queue.push_back((table.to_string(), 0, 1.0));

        let mut results = Vec::new();

        while let Some((current, depth, confidence_so_far)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let mut neighbors: Vec<(&LineageEdge, String)> = edges
                .iter()
                .filter_map(|e| match direction {
                    Direction::Downstream if e.source_fqn == current => {
                        Some((e, e.target_fqn.clone()))
                    },
                    Direction::Upstream if e.target_fqn == current => {
                        Some((e, e.source_fqn.clone()))
                    },
                    _ => None,
                })
                .collect();
            // Deterministic tie-break by table name.
            neighbors.sort_by(|a, b| a.1.cmp(&b.1));

            for (edge, next_table) in neighbors {
                if edge.confidence < min_confidence {
                    continue;
                }
                if visited.contains(&next_table) {
                    continue;
                }
                visited.insert(next_table.clone());
                let path_confidence = confidence_so_far * edge.confidence;
                results.push(TraversalNode {
                    table: next_table.clone(),
                    depth: depth + 1,
                    confidence_along_path: path_confidence,
                });
                queue.push_back((next_table, depth + 1, path_confidence));
            }
        }

        results.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.table.cmp(&b.table)));
        Ok(results)
    }

    /// `downstream(table, max_depth)` aggregated; "terminal" = node with
    /// out-degree 0 in the non-stale subgraph.
    pub async fn blast_radius(
        &self,
        table: &str,
        max_depth: u32,
        min_confidence: f64,
    ) -> Result<BlastRadius, sqlx::Error> {
        let edges = self.non_stale_edges().await?;
        let downstream = self.traverse(table, max_depth, min_confidence, Direction::Downstream).await?;

        let has_terminal_consumers = downstream
            .iter()
            .any(|node| !edges.iter().any(|e| e.source_fqn == node.table));

        let affected_tables: Vec<String> = downstream.iter().map(|n| n.table.clone()).collect();
        let observed_max_depth = downstream.iter().map(|n| n.depth).max().unwrap_or(0);

        // An edge leaving `table` or any already-affected table that fell out of
        // `non_stale_edges` means the walk above is an undercount: report the
        // result as stale rather than silently pretending it's complete.
        let stale = self.has_excluded_stale_edge(table, &affected_tables).await?;

        Ok(BlastRadius {
            total: affected_tables.len(),
            affected_tables,
            max_depth: observed_max_depth,
            has_terminal_consumers,
            stale,
        })
    }

    async fn has_excluded_stale_edge(&self, table: &str, affected_tables: &[String]) -> Result<bool, sqlx::Error> {
        let all_edges: Vec<LineageEdge> = sqlx::query_as("SELECT * FROM lineage_edges").fetch_all(&self.pool).await?;
        let now = Utc::now();
        let window = Self::staleness_window();
        Ok(all_edges.iter().any(|e| {
            e.is_stale(now, window) && (e.source_fqn == table || affected_tables.iter().any(|t| t == &e.source_fqn))
        }))
    }

    /// Shortest path by hop count; ties broken by highest product confidence.
    pub async fn path(&self, source: &str, target: &str) -> Result<Option<Vec<String>>, sqlx::Error> {
        let edges = self.non_stale_edges().await?;

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(source.to_string());
        let mut queue: VecDeque<Vec<String>> = VecDeque::new();
        queue.push_back(vec![source.to_string()]);

        let mut best: Option<Vec<String>> = None;

        while let Some(path) = queue.pop_front() {
            let current = path.last().unwrap().clone();
            if current == target {
                best = Some(path);
                break;
            }
            if let Some(b) = &best {
                if path.len() >= b.len() {
                    continue;
                }
            }

            let mut neighbors: Vec<String> = edges
                .iter()
                .filter(|e| e.source_fqn == current)
                .map(|e| e.target_fqn.clone())
                .collect();
            neighbors.sort();

            for next in neighbors {
                if visited.contains(&next) {
                    continue;
                }
                visited.insert(next.clone());
                let mut next_path = path.clone();
                next_path.push(next);
                queue.push_back(next_path);
            }
        }

        Ok(best)
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Upstream,
    Downstream,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_db;

    #[tokio::test]
    async fn blast_radius_excludes_stale_edges() {
        let pool = create_test_db().await;
        let engine = LineageEngine::new(pool.clone());

        // raw.x -> stg.x is 31 days stale; stg.x -> mart.x is fresh.
        let stale_time = Utc::now() - ChronoDuration::days(31);
        sqlx::query(
            "INSERT INTO lineage_edges (source_fqn, target_fqn, relationship, confidence, query_hash, first_seen_at, last_seen_at) \
             VALUES ('raw.x', 'stg.x', 'direct', 1.0, 'h1', ?, ?)",
        )
        .bind(stale_time)
        .bind(stale_time)
        .execute(&pool)
        .await
        .unwrap();

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO lineage_edges (source_fqn, target_fqn, relationship, confidence, query_hash, first_seen_at, last_seen_at) \
             VALUES ('stg.x', 'mart.x', 'direct', 1.0, 'h2', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        let radius_raw = engine.blast_radius("raw.x", 5, 0.0).await.unwrap();
        assert_eq!(radius_raw.total, 0);

        let radius_stg = engine.blast_radius("stg.x", 5, 0.0).await.unwrap();
        assert_eq!(radius_stg.affected_tables, vec!["mart.x".to_string()]);
    }

    #[tokio::test]
    async fn blast_radius_flags_stale_when_an_edge_was_excluded() {
        let pool = create_test_db().await;
        let engine = LineageEngine::new(pool.clone());

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO lineage_edges (source_fqn, target_fqn, relationship, confidence, query_hash, first_seen_at, last_seen_at) \
             VALUES ('stg.x', 'mart.x', 'direct', 1.0, 'h1', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        let fresh = engine.blast_radius("stg.x", 5, 0.0).await.unwrap();
        assert!(!fresh.stale);

        let stale_time = Utc::now() - ChronoDuration::days(31);
        sqlx::query(
            "INSERT INTO lineage_edges (source_fqn, target_fqn, relationship, confidence, query_hash, first_seen_at, last_seen_at) \
             VALUES ('mart.x', 'report.x', 'direct', 1.0, 'h2', ?, ?)",
        )
        .bind(stale_time)
        .bind(stale_time)
        .execute(&pool)
        .await
        .unwrap();

        let degraded = engine.blast_radius("stg.x", 5, 0.0).await.unwrap();
        assert!(degraded.stale);
        assert_eq!(degraded.affected_tables, vec!["mart.x".to_string()]);
    }

    #[tokio::test]
    async fn upsert_never_decreases_confidence() {
        let pool = create_test_db().await;
        let engine = LineageEngine::new(pool.clone());

        engine.upsert_edge("a", "b", Relationship::Direct, 0.8, "h1").await.unwrap();
        engine.upsert_edge("a", "b", Relationship::Direct, 0.6, "h2").await.unwrap();

        let edges = engine.non_stale_edges().await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].confidence, 0.8);
    }
}
