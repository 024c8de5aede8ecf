//! HTTP client for OpenAI-compatible chat-completion APIs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::LLMError;

#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
}

/// Minimal chat-completion seam: system+user messages in, raw JSON text out.
/// The caller owns structured-output parsing and retry policy.
#[async_trait]
pub trait LLMChatClient: Send + Sync {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<ChatCompletion, LLMError>;
}

pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    timeout_seconds: u64,
}

impl OpenAiCompatibleClient {
    pub fn new(api_base: String, api_key: String, model: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("failed to build llm http client"),
            api_base,
            api_key,
            model,
            max_tokens: 2048,
            temperature: 0.2,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl LLMChatClient for OpenAiCompatibleClient {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<ChatCompletion, LLMError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system_prompt.to_string() },
                ChatMessage { role: "user".to_string(), content: user_prompt.to_string() },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: ResponseFormat { r#type: "json_object".to_string() },
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
                    LLMError::Timeout(self.timeout_seconds)
                } else {
                    LLMError::Api(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LLMError::RateLimited(retry_after));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LLMError::Api(format!("api returned {status}: {text}")));
        }

        let parsed: ChatCompletionResponse =
            response.json().await.map_err(|e| LLMError::Parse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LLMError::Parse("empty response from llm".to_string()))?;

        Ok(ChatCompletion { content })
    }
}
