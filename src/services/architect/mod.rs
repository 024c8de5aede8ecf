//! Architect: LLM-driven root-cause diagnosis with a deterministic fallback
//! that must always succeed.

mod client;
mod context;
mod models;

pub use client::{ChatCompletion, LLMChatClient, OpenAiCompatibleClient};
pub use context::{AnomalySummary, DiagnosisContext, TableSummary, SYSTEM_PROMPT};
pub use models::{Diagnosis, Recommendation, RecommendedAction};

use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("llm api error: {0}")]
    Api(String),
    #[error("llm response parse error: {0}")]
    Parse(String),
    #[error("llm timeout after {0}s")]
    Timeout(u64),
    #[error("llm rate limited, retry after {0}s")]
    RateLimited(u64),
    #[error("llm request serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LLMError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RateLimited(_) | Self::Api(_))
    }
}

const BACKOFF_SECONDS: [u64; 3] = [2, 4, 8];

pub struct Architect {
    /// `None` means the deployment has no LLM configured; every diagnosis
    /// goes through the fallback.
    client: Option<Arc<dyn LLMChatClient>>,
}

impl Architect {
    pub fn new(client: Option<Arc<dyn LLMChatClient>>) -> Self {
        Self { client }
    }

    pub async fn diagnose(&self, context: &DiagnosisContext) -> Diagnosis {
        let Some(client) = &self.client else {
            tracing::debug!("no llm client configured, using deterministic fallback");
            return self.fallback(context);
        };

        match self.diagnose_with_llm(client.as_ref(), context).await {
            Ok(diagnosis) => diagnosis,
            Err(e) => {
                tracing::warn!(error = %e, "architect falling back to deterministic diagnosis");
                self.fallback(context)
            },
        }
    }

    fn fallback(&self, context: &DiagnosisContext) -> Diagnosis {
        Diagnosis::fallback(
            &context.table.fqn,
            context.downstream.iter().map(|n| n.table.clone()).collect(),
            context.anomaly.severity,
        )
    }

    async fn diagnose_with_llm(
        &self,
        client: &dyn LLMChatClient,
        context: &DiagnosisContext,
    ) -> Result<Diagnosis, LLMError> {
        let user_prompt = serde_json::to_string_pretty(context)?;

        let mut consecutive_parse_failures = 0u32;
        let mut last_err: Option<LLMError> = None;

        for attempt in 0..=BACKOFF_SECONDS.len() {
            let completion = match client.chat(SYSTEM_PROMPT, &user_prompt).await {
                Ok(c) => c,
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    let remaining_backoffs = &BACKOFF_SECONDS[attempt.min(BACKOFF_SECONDS.len())..];
                    let Some(&scheduled) = remaining_backoffs.first() else {
                        return Err(e);
                    };
                    let wait = if let LLMError::RateLimited(secs) = &e {
                        *secs
                    } else {
                        scheduled
                    };
                    tracing::debug!(attempt, wait, "transient llm error, retrying");
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                    continue;
                },
            };

            match serde_json::from_str::<Diagnosis>(&completion.content) {
                Ok(diagnosis) => return Ok(diagnosis),
                Err(e) => {
                    consecutive_parse_failures += 1;
                    tracing::warn!(error = %e, consecutive_parse_failures, "malformed structured output");
                    if consecutive_parse_failures >= 2 {
                        return Err(LLMError::Parse(e.to_string()));
                    }
                    // One strict re-prompt retry on malformed JSON, no backoff.
                    continue;
                },
            }
        }

        Err(last_err.unwrap_or_else(|| LLMError::Api("exhausted retries".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn context() -> DiagnosisContext {
        DiagnosisContext {
            anomaly: AnomalySummary {
                id: 1,
                anomaly_type: "schema_drift".to_string(),
                severity: Severity::Critical,
                detail: serde_json::Value::Null,
                detected_at: chrono::Utc::now(),
            },
            table: TableSummary {
                fqn: "analytics.orders".to_string(),
                columns: vec![],
                latest_snapshot_hash: None,
                freshness_sla_minutes: None,
            },
            upstream: vec![],
            downstream: vec![crate::models::TraversalNode {
                table: "mart.revenue".to_string(),
                depth: 1,
                confidence_along_path: 1.0,
            }],
            recent_anomaly_history: vec![],
        }
    }

    struct AlwaysMalformed;
    #[async_trait::async_trait]
    impl LLMChatClient for AlwaysMalformed {
        async fn chat(&self, _system: &str, _user: &str) -> Result<ChatCompletion, LLMError> {
            Ok(ChatCompletion { content: "not json".to_string() })
        }
    }

    struct AlwaysRateLimited {
        calls: AtomicU32,
    }
    #[async_trait::async_trait]
    impl LLMChatClient for AlwaysRateLimited {
        async fn chat(&self, _system: &str, _user: &str) -> Result<ChatCompletion, LLMError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LLMError::RateLimited(0))
        }
    }

    #[tokio::test]
    async fn no_client_goes_straight_to_fallback() {
        let architect = Architect::new(None);
        let diagnosis = architect.diagnose(&context()).await;
        assert_eq!(diagnosis.confidence, 0.0);
        assert_eq!(diagnosis.blast_radius, vec!["mart.revenue".to_string()]);
    }

    #[tokio::test]
    async fn two_consecutive_parse_failures_fall_back() {
        let architect = Architect::new(Some(Arc::new(AlwaysMalformed)));
        let diagnosis = architect.diagnose(&context()).await;
        assert_eq!(diagnosis.confidence, 0.0);
        assert_eq!(diagnosis.recommendations[0].action, RecommendedAction::Investigate);
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_after_all_attempts() {
        let client = Arc::new(AlwaysRateLimited { calls: AtomicU32::new(0) });
        let architect = Architect::new(Some(client.clone()));
        let diagnosis = architect.diagnose(&context()).await;
        assert_eq!(diagnosis.confidence, 0.0);
        // One initial attempt plus three backoff retries.
        assert_eq!(client.calls.load(Ordering::SeqCst), 4);
    }
}
