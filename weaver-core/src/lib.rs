pub mod completion;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod ipc;
pub mod models;
pub mod parse;
pub mod prompts;
pub mod retry;

pub use completion::{
    ChatMessage, CompletionBackend, CompletionClientConfig, CompletionError, CompletionRequest,
    OpenAiCompletionClient,
};
pub use config::WeaverConfig;
pub use embeddings::{
    EmbeddingBackend, EmbeddingClientConfig, EmbeddingError, OpenAiEmbeddingClient,
    OPENAI_DIMENSIONS,
};
pub use error::WeaverError;
pub use parse::ResponseError;
pub use retry::{bounded_attempts, Attempts};
