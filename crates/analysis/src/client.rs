use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::LlmError;
use crate::provider::{LlmType, Sampling};
use crate::retry::RetryPolicy;

pub const DEFAULT_MAX_TOKENS: u32 = 100;

/// A chat model that answers one system + user prompt pair.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn kind(&self) -> LlmType;

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError>;
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub token: String,
    /// Overrides the provider's default base URL
    pub endpoint: Option<String>,
    /// Overrides the provider's default model
    pub model: Option<String>,
    pub max_concurrency: usize,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl LlmConfig {
    pub fn new(llm_type: LlmType, token: impl Into<String>) -> Self {
        Self {
            llm_type,
            token: token.into(),
            endpoint: None,
            model: None,
            max_concurrency: 3,
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct ChatClient {
    llm_type: LlmType,
    endpoint: String,
    model: String,
    token: String,
    sampling: Sampling,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build LLM HTTP client")?;

        let endpoint = config
            .endpoint
            .unwrap_or_else(|| config.llm_type.default_endpoint().to_string())
            .trim_end_matches('/')
            .to_string();
        let model = config
            .model
            .unwrap_or_else(|| config.llm_type.default_model().to_string());

        Ok(Self {
            llm_type: config.llm_type,
            endpoint,
            model,
            token: config.token,
            sampling: config.llm_type.sampling(),
            retry: config.retry,
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_once(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            max_tokens,
            temperature: self.sampling.temperature,
            top_p: self.sampling.top_p,
            frequency_penalty: self.sampling.frequency_penalty,
            presence_penalty: self.sampling.presence_penalty,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RateLimited(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| LlmError::Parse("response contained no message content".to_string()))
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    fn kind(&self) -> LlmType {
        self.llm_type
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LlmError::Connection("client is shutting down".to_string()))?;

        debug!(
            llm = %self.llm_type,
            model = %self.model,
            prompt_chars = user_prompt.len(),
            max_tokens,
            "sending chat completion"
        );

        self.retry
            .retry("chat_completion", || {
                self.send_once(system_prompt, user_prompt, max_tokens)
            })
            .await
    }
}
