//! Sentinels inspect a single monitored table against its last known state
//! and emit `Anomaly` rows on drift/violation. Each sentinel is stateless
//! and owns no connection of its own; callers pass the pool and connector.

mod freshness_sentinel;
mod schema_sentinel;

pub use freshness_sentinel::FreshnessSentinel;
pub use schema_sentinel::SchemaSentinel;
