pub mod connections;
pub mod health;
pub mod incidents;
pub mod lineage;
pub mod scan;
pub mod stats;
pub mod tables;
pub mod ws;
