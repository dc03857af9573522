//! Completion client: black-box text generation over a chat-completions API
//!
//! The engine only relies on `CompletionBackend::complete` returning the raw
//! assistant text; parsing that text is the caller's job (see `crate::parse`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::embeddings::OpenAiErrorResponse;
use crate::models::{Role, TurnEntry};

/// A role-tagged chat message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }
}

impl From<&TurnEntry> for ChatMessage {
    fn from(entry: &TurnEntry) -> Self {
        Self {
            role: entry.role,
            content: entry.content.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("No choices in completion response")]
    MissingChoice,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

/// Abstraction over completion providers.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send the messages and return the raw assistant text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct CompletionClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
}

impl CompletionClientConfig {
    /// Build from the `[completion]` section; the key falls back to `OPENAI_API_KEY`.
    pub fn from_config(api_key: Option<String>, config: &crate::config::CompletionConfig) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
            timeout_seconds: config.timeout_seconds,
        }
    }
}

// ============================================================================
// OpenAI API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}

fn api_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::Human => "user",
        Role::Assistant => "assistant",
    }
}

// ============================================================================
// OpenAiCompletionClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAiCompletionClient {
    client: Client,
    config: CompletionClientConfig,
}

impl OpenAiCompletionClient {
    pub fn new(config: CompletionClientConfig) -> Result<Self, CompletionError> {
        if config.api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
        }

        // Generation is slow compared to embedding; the timeout is configurable.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a client against a custom base URL (for testing / proxies)
    pub fn with_base_url(
        mut config: CompletionClientConfig,
        base_url: String,
    ) -> Result<Self, CompletionError> {
        config.base_url = base_url.trim_end_matches('/').to_string();
        Self::new(config)
    }

    async fn complete_once(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let body = OpenAiChatRequest {
            model: &self.config.model,
            messages: request
                .messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: api_role(m.role),
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            tracing::error!(code = status.as_u16(), message = %message, "Completion API error");

            return Err(CompletionError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let api_response: OpenAiChatResponse = response.json().await?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(CompletionError::MissingChoice)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = Retry::spawn(retry_strategy, || self.complete_once(&request)).await;

        match result {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All completion retry attempts failed"
                );
                Err(CompletionError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// TESTS
// ============================================================================
