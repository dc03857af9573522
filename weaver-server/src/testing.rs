//! Testing utilities.
//!
//! Deterministic stand-ins for the hosted model so the engine, router and
//! HTTP layer can be exercised without network access:
//! - `ScriptedCompletion` replays canned responses in order and records requests
//! - `KeywordEmbedder` embeds text as keyword counts over a small vocabulary
//! - `testing_state` wires both into an in-memory `AppState`

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use weaver_core::completion::{CompletionBackend, CompletionError, CompletionRequest};
use weaver_core::config::NarrativeConfig;
use weaver_core::embeddings::{EmbeddingBackend, EmbeddingError};
use weaver_ingest::Story;

use crate::state::AppState;
use crate::subsystems::engine::TurnEngine;
use crate::subsystems::fragments::InMemoryFragmentStore;
use crate::subsystems::memory::InMemoryTurnMemory;

/// A short story whose paragraphs hit the `KeywordEmbedder` vocabulary.
pub const SAMPLE_STORY: &str = "Alice crossed the old bridge over the river at dawn.\n\
    \n\
    Bob guarded the gate of the dark tower with a rusted sword.\n\
    Alice found a key under the lantern by the door.\n\
    A dragon circled the forest while the fire burned low.\n\
    Bob and Alice shared bread on the deck of the ship.\n";

const VOCABULARY: [&str; 16] = [
    "alice", "bob", "bridge", "river", "lantern", "sword", "fire", "gate", "dark", "bread",
    "door", "key", "tower", "forest", "dragon", "ship",
];

/// Embeds text as per-keyword occurrence counts.
#[derive(Debug, Default, Clone)]
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        VOCABULARY
            .iter()
            .map(|word| lower.matches(word).count() as f32)
            .collect()
    }
}

#[async_trait]
impl EmbeddingBackend for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(Self::vector(text))
    }

    fn dimensions(&self) -> usize {
        VOCABULARY.len()
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// One canned reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Unavailable,
    /// Never answers; the caller has to give up on the request.
    Stall,
}

/// Completion backend that replays scripted replies in order.
///
/// Running out of replies is reported as an unavailable backend.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let script = Self::new();
        for text in texts {
            script.push_text(text);
        }
        script
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push(ScriptedReply::Text(text.into()));
    }

    pub fn push(&self, reply: ScriptedReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        match next {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Stall) => std::future::pending().await,
            Some(ScriptedReply::Unavailable) | None => Err(CompletionError::Api {
                code: 503,
                message: "scripted completion unavailable".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A scene response in the shape the model is asked for.
pub fn scene_json(description: &str, actions: &[&str]) -> String {
    serde_json::json!({ "description": description, "actions": actions }).to_string()
}

/// A character list in the shape the model is asked for.
pub fn characters_json(characters: &[(&str, &str, &str)]) -> String {
    let list: Vec<serde_json::Value> = characters
        .iter()
        .map(|(name, abilities, weaknesses)| {
            serde_json::json!({
                "character_name": name,
                "character_abilities": abilities,
                "character_weaknesses": weaknesses,
            })
        })
        .collect();
    serde_json::Value::Array(list).to_string()
}

/// In-memory stores, the keyword embedder and the given completion script,
/// playing `SAMPLE_STORY` with a budget of `max_steps`.
pub fn testing_state(completion: Arc<ScriptedCompletion>, max_steps: u32) -> AppState {
    let story = match Story::new(SAMPLE_STORY) {
        Ok(story) => story,
        Err(e) => unreachable!("sample story is not empty: {}", e),
    };
    let engine = TurnEngine::new(
        story,
        Arc::new(InMemoryFragmentStore::new()),
        Arc::new(InMemoryTurnMemory::new()),
        completion,
        Arc::new(KeywordEmbedder),
    )
    .with_narrative(NarrativeConfig {
        max_steps,
        ..NarrativeConfig::default()
    });
    AppState::new(engine, None, "/tmp/weaver-test.sock")
}
