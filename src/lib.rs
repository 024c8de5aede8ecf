//! Aegis library: the core data-quality monitoring engine for analytical
//! warehouses.

use sqlx::SqlitePool;
use std::sync::Arc;

pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::{Investigator, LineageEngine, Notifier, Orchestrator, Scanner};

/// Application shared state, handed to every handler via axum's extractor.
/// Services are wrapped in `Arc` for cheap cloning across requests; the pool
/// is already an internally-pooled handle.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub notifier: Arc<Notifier>,
    pub lineage: Arc<LineageEngine>,
    pub orchestrator: Arc<Orchestrator>,
    pub investigator: Arc<Investigator>,
    pub scanner: Arc<Scanner>,
}
