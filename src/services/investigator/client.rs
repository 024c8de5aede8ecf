//! Tool-calling variant of the OpenAI-compatible chat client. Separate from
//! `architect::client` because the wire shape carries a `tools` array and
//! the response carries `tool_calls` instead of a single JSON blob.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::InvestigatorError;
use super::tools::ToolSpec;

#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone)]
pub enum AgentMessage {
    System(String),
    User(String),
    Assistant { content: Option<String>, tool_calls: Vec<ToolCall> },
    Tool { tool_call_id: String, content: String },
}

#[derive(Debug, Clone, Default)]
pub struct AgentStep {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

#[async_trait]
pub trait ToolCallingLLMClient: Send + Sync {
    async fn step(
        &self,
        messages: &[AgentMessage],
        tools: &[ToolSpec],
    ) -> Result<AgentStep, InvestigatorError>;
}

pub struct OpenAiAgentClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    timeout_seconds: u64,
}

impl OpenAiAgentClient {
    pub fn new(api_base: String, api_key: String, model: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("failed to build llm http client"),
            api_base,
            api_key,
            model,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    r#type: String,
    function: WireFunctionSpec,
}

#[derive(Debug, Serialize)]
struct WireFunctionSpec {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    tools: Vec<WireTool>,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

fn to_wire(messages: &[AgentMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| match m {
            AgentMessage::System(c) => {
                WireMessage { role: "system".to_string(), content: Some(c.clone()), tool_calls: None, tool_call_id: None }
            },
            AgentMessage::User(c) => {
                WireMessage { role: "user".to_string(), content: Some(c.clone()), tool_calls: None, tool_call_id: None }
            },
            AgentMessage::Assistant { content, tool_calls } => WireMessage {
                role: "assistant".to_string(),
                content: content.clone(),
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        tool_calls
                            .iter()
                            .map(|t| WireToolCall {
                                id: t.id.clone(),
                                r#type: "function".to_string(),
                                function: WireFunctionCall { name: t.name.clone(), arguments: t.arguments.clone() },
                            })
                            .collect(),
                    )
                },
                tool_call_id: None,
            },
            AgentMessage::Tool { tool_call_id, content } => WireMessage {
                role: "tool".to_string(),
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: Some(tool_call_id.clone()),
            },
        })
        .collect()
}

#[async_trait]
impl ToolCallingLLMClient for OpenAiAgentClient {
    async fn step(&self, messages: &[AgentMessage], tools: &[ToolSpec]) -> Result<AgentStep, InvestigatorError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: to_wire(messages),
            tools: tools
                .iter()
                .map(|t| WireTool {
                    r#type: "function".to_string(),
                    function: WireFunctionSpec {
                        name: t.name.to_string(),
                        description: t.description.to_string(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
            temperature: 0.1,
        };

        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(self.timeout_seconds))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InvestigatorError::Timeout(self.timeout_seconds)
                } else {
                    InvestigatorError::Api(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(InvestigatorError::Api(format!("api returned {status}: {text}")));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| InvestigatorError::Parse(e.to_string()))?;
        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| InvestigatorError::Parse("empty response from llm".to_string()))?;

        Ok(AgentStep {
            content: message.content,
            tool_calls: message
                .tool_calls
                .into_iter()
                .map(|t| ToolCall { id: t.id, name: t.function.name, arguments: t.function.arguments })
                .collect(),
        })
    }
}
