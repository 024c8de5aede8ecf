pub mod architect;
pub mod executor;
pub mod incident_report;
pub mod investigator;
pub mod lineage;
pub mod notifier;
pub mod orchestrator;
pub mod scanner;
pub mod sentinels;
pub mod warehouse;

pub use architect::{
    Architect, ChatCompletion, Diagnosis, DiagnosisContext, LLMChatClient, LLMError,
    OpenAiCompatibleClient, Recommendation, RecommendedAction,
};
pub use executor::{Executor, Remediation, RemediationAction, RemediationStatus};
pub use incident_report::{IncidentReport, assemble as assemble_incident_report};
pub use investigator::{Investigator, InvestigatorError, OpenAiAgentClient, ToolCallingLLMClient};
pub use lineage::LineageEngine;
pub use notifier::{EventPayload, Notifier, NotifierEvent};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use scanner::{AesGcmUriDecryptor, Scanner, ScannerHandles, UriDecryptor, start_scanner};
pub use sentinels::{FreshnessSentinel, SchemaSentinel};
pub use warehouse::{ConnectorError, WarehouseConnector, create_connector};
