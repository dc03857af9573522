//! Embeddings module: turns story paragraphs and chosen actions into vectors
//!
//! Provides an `EmbeddingBackend` trait with one production implementation:
//! - **OpenAI**: cloud embeddings via the `/embeddings` endpoint (1536-dim by default)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

/// Default dimensions of `text-embedding-3-small`
pub const OPENAI_DIMENSIONS: usize = 1536;

// ============================================================================
// EmbeddingBackend trait
// ============================================================================

/// Abstraction over embedding providers.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Returns the embedding dimension.
    fn dimensions(&self) -> usize;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

/// Embedding generation errors
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid response: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Missing embedding in response")]
    MissingEmbedding,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

// ============================================================================
// Config types
// ============================================================================

/// OpenAI embedding client configuration
#[derive(Debug, Clone)]
pub struct EmbeddingClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl EmbeddingClientConfig {
    /// Build from the `[embedding]` section; the key falls back to `OPENAI_API_KEY`.
    pub fn from_config(api_key: Option<String>, config: &crate::config::EmbeddingConfig) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimensions: config.dimensions as usize,
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
        }
    }
}

// ============================================================================
// OpenAI API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiErrorResponse {
    pub(crate) error: Option<OpenAiErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiErrorDetail {
    pub(crate) message: String,
}

// ============================================================================
// OpenAiEmbeddingClient
// ============================================================================

/// OpenAI embedding client over the Embeddings API.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingClient {
    client: Client,
    config: EmbeddingClientConfig,
}

impl OpenAiEmbeddingClient {
    pub fn new(config: EmbeddingClientConfig) -> Result<Self, EmbeddingError> {
        if config.api_key.is_empty() {
            return Err(EmbeddingError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a client against a custom base URL (for testing / proxies)
    pub fn with_base_url(
        mut config: EmbeddingClientConfig,
        base_url: String,
    ) -> Result<Self, EmbeddingError> {
        config.base_url = base_url.trim_end_matches('/').to_string();
        Self::new(config)
    }

    /// Generate an embedding, retrying with exponential backoff.
    pub async fn embed_raw(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = Retry::spawn(retry_strategy, || self.embed_once(text)).await;

        match result {
            Ok(vec) => Ok(vec),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All embedding retry attempts failed"
                );
                Err(EmbeddingError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/embeddings", self.config.base_url);

        let request = OpenAiEmbeddingRequest {
            input: vec![text],
            model: &self.config.model,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
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

            tracing::error!(code = status.as_u16(), message = %message, "Embeddings API error");

            return Err(EmbeddingError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let body: OpenAiEmbeddingResponse = response.json().await?;

        let values = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(EmbeddingError::MissingEmbedding)?;

        if values.len() != self.config.dimensions {
            return Err(EmbeddingError::InvalidDimensions {
                expected: self.config.dimensions,
                actual: values.len(),
            });
        }

        Ok(values)
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_raw(text).await
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// TESTS
// ============================================================================
