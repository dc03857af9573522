use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct WeaverConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub story: StoryConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub narrative: NarrativeConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub fragment_table: String,
    pub memory_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Postgres,
            fragment_table: "story_embeddings".to_string(),
            memory_table: "turn_memory".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoryConfig {
    /// Filesystem path or http(s) URL of the story text.
    pub source: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini-2024-07-18".to_string(),
            temperature: 0.1,
            max_tokens: 500,
            max_retries: 3,
            retry_delay_ms: 1000,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub dimensions: u32,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NarrativeConfig {
    pub max_steps: u32,
    pub extraction_attempts: usize,
    pub exact_match_k: usize,
    pub similar_k: usize,
    pub max_actions: usize,
    /// Most recent history entries replayed per call. `None` replays everything.
    #[serde(default)]
    pub replay_window: Option<usize>,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            extraction_attempts: 5,
            exact_match_k: 3,
            similar_k: 5,
            max_actions: 5,
            replay_window: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8770,
        }
    }
}

impl WeaverConfig {
    /// Load from a TOML file, then apply `WEAVER__SECTION__KEY` overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("WEAVER").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}
