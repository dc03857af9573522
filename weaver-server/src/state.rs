use std::sync::Arc;

use sqlx::PgPool;
use weaver_core::completion::CompletionBackend;
use weaver_core::config::{StoreBackend, WeaverConfig};
use weaver_core::embeddings::EmbeddingBackend;
use weaver_core::{
    CompletionClientConfig, EmbeddingClientConfig, OpenAiCompletionClient, OpenAiEmbeddingClient,
};
use weaver_ingest::Story;

use crate::subsystems::engine::TurnEngine;
use crate::subsystems::fragments::{FragmentStore, InMemoryFragmentStore, PgFragmentStore};
use crate::subsystems::memory::{InMemoryTurnMemory, PgTurnMemory, TurnMemory};
use crate::subsystems::sessions::SessionRegistry;

/// Everything a request handler needs; shared by the IPC and HTTP servers.
pub struct AppState {
    pub engine: TurnEngine,
    pub sessions: SessionRegistry,
    /// Present only with the Postgres store backend.
    pub pool: Option<PgPool>,
    pub socket_path: String,
}

impl AppState {
    pub fn new(engine: TurnEngine, pool: Option<PgPool>, socket_path: impl Into<String>) -> Self {
        Self {
            engine,
            sessions: SessionRegistry::new(),
            pool,
            socket_path: socket_path.into(),
        }
    }

    /// Wire the configured backends around an already loaded story.
    pub async fn from_config(config: &WeaverConfig, story: Story) -> anyhow::Result<Self> {
        let completion: Arc<dyn CompletionBackend> = Arc::new(OpenAiCompletionClient::new(
            CompletionClientConfig::from_config(None, &config.completion),
        )?);
        let embeddings: Arc<dyn EmbeddingBackend> = Arc::new(OpenAiEmbeddingClient::new(
            EmbeddingClientConfig::from_config(None, &config.embedding),
        )?);

        let (fragments, memory, pool): (
            Arc<dyn FragmentStore>,
            Arc<dyn TurnMemory>,
            Option<PgPool>,
        ) = match config.store.backend {
            StoreBackend::Postgres => {
                let pool = weaver_core::db::create_pool(&config.database).await?;
                let memory = PgTurnMemory::new(pool.clone(), &config.store.memory_table)?;
                memory.ensure_table().await?;
                let fragments =
                    PgFragmentStore::new(pool.clone(), &config.store.fragment_table)?;
                (Arc::new(fragments), Arc::new(memory), Some(pool))
            }
            StoreBackend::Memory => (
                Arc::new(InMemoryFragmentStore::new()),
                Arc::new(InMemoryTurnMemory::new()),
                None,
            ),
        };

        tracing::info!(
            store = fragments.name(),
            memory = memory.name(),
            completion = completion.name(),
            embeddings = embeddings.name(),
            "Backends configured"
        );

        let engine = TurnEngine::new(story, fragments, memory, completion, embeddings)
            .with_narrative(config.narrative.clone())
            .with_sampling(config.completion.temperature, config.completion.max_tokens);

        Ok(Self::new(engine, pool, config.service.socket_path.clone()))
    }
}
