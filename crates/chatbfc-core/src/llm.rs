//! Text-completion service used for grading and end-of-session summaries.
//!
//! `OpenRouterCompletion` talks to the OpenAI-compatible chat completions endpoint.
//! `CannedCompletion` replays fixed replies and is what tests and offline runs use.

use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";

/// A system + user prompt pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionPrompt {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Return the assistant text for the prompt.
    async fn complete(&self, prompt: &CompletionPrompt) -> CoreResult<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    id: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// OpenRouter chat completions client.
pub struct OpenRouterCompletion {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenRouterCompletion {
    pub fn new(api_key: impl Into<String>) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| CoreError::Config(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            api_key: api_key.into().trim().to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENROUTER_API_BASE.to_string(),
            client,
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Point at another OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl CompletionService for OpenRouterCompletion {
    async fn complete(&self, prompt: &CompletionPrompt) -> CoreResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: prompt.temperature,
            max_tokens: prompt.max_tokens,
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "ChatBFC")
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Completion {
                status: None,
                message: format!("request failed: {}", e),
                request_id: None,
            })?;

        let request_id = res
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(CoreError::Completion {
                status: Some(status.as_u16()),
                message: body,
                request_id,
            });
        }

        let parsed: ChatResponse = res.json().await.map_err(|e| CoreError::Completion {
            status: None,
            message: format!("response parse failed: {}", e),
            request_id: request_id.clone(),
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::Completion {
                status: None,
                message: "empty completion".to_string(),
                request_id: request_id.clone().or(parsed.id.clone()),
            })?;
        debug!(model = %self.model, chars = text.len(), "Completion received");
        Ok(text)
    }
}

/// Replays queued replies in order; errors once the queue is empty.
#[derive(Debug, Default)]
pub struct CannedCompletion {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<CompletionPrompt>>,
}

impl CannedCompletion {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<CompletionPrompt> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for CannedCompletion {
    async fn complete(&self, prompt: &CompletionPrompt) -> CoreResult<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.clone());
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        next.ok_or_else(|| CoreError::Completion {
            status: Some(503),
            message: "no canned reply left".to_string(),
            request_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> CompletionPrompt {
        CompletionPrompt {
            system: "sys".into(),
            user: "usr".into(),
            temperature: 0.2,
            max_tokens: 64,
        }
    }

    #[tokio::test]
    async fn canned_replays_in_order_then_errors() {
        let svc = CannedCompletion::new(["one", "two"]);
        assert_eq!(svc.complete(&prompt()).await.unwrap(), "one");
        assert_eq!(svc.complete(&prompt()).await.unwrap(), "two");
        let err = svc.complete(&prompt()).await.unwrap_err();
        assert!(err.to_string().contains("503"));
        assert_eq!(svc.prompts().len(), 3);
    }
}
