pub mod anomaly;
pub mod connection;
pub mod discovery;
pub mod incident;
pub mod lineage;
pub mod schema_snapshot;
pub mod table;

pub use anomaly::{Anomaly, AnomalyDetail, AnomalyType, ColumnChange, ColumnChangeKind, Severity};
pub use connection::{Connection, ConnectionResponse, CreateConnectionRequest, Dialect, UpdateConnectionRequest};
pub use discovery::{ConfirmDiscoveryRequest, DeltaAction, DiscoveryReport, TableDelta, TableProposal, TableRole, TableSelection};
pub use incident::{ApproveIncidentRequest, DismissIncidentRequest, Incident, IncidentStatus, ListIncidentsQuery};
pub use lineage::{BlastRadius, LineageEdge, LineageGraph, Relationship, TraversalNode};
pub use schema_snapshot::{ColumnDef, SchemaSnapshot, snapshot_hash};
pub use table::{CheckType, CreateMonitoredTableRequest, ListTablesQuery, MonitoredTable, UpdateMonitoredTableRequest, fully_qualified_name};
