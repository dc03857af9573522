//! Narrative turn engine
//!
//! Drives one playthrough:
//!
//! ```text
//! AWAITING_CHARACTER_SELECTION -> PRESENTING_SCENE -> AWAITING_ACTION
//!     AWAITING_ACTION -> ADVANCING -> AWAITING_ACTION | TERMINAL
//! ```
//!
//! A turn either commits completely (history exchange appended, step counter
//! decremented, current scene replaced) or leaves the session as it was.
//! `PRESENTING_SCENE` and `ADVANCING` are never written to the session: it is
//! only touched after the completion call returns, so a turn whose future is
//! dropped mid-flight leaves the previous state in place.
//! The caller owns the `Session` and must serialise inputs to it.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::OnceCell;
use uuid::Uuid;
use weaver_core::completion::{ChatMessage, CompletionBackend, CompletionError, CompletionRequest};
use weaver_core::config::{CompletionConfig, NarrativeConfig};
use weaver_core::embeddings::{EmbeddingBackend, EmbeddingError};
use weaver_core::models::{Character, TurnEntry, TurnResult};
use weaver_core::{parse, prompts, ResponseError};
use weaver_ingest::Story;

use super::extractor::CharacterExtractor;
use super::fragments::{FragmentStore, SchemaStatus, StoreError};
use super::memory::{replay_window, MemoryError, TurnMemory};

/// Shown for any input once the story is over.
pub const END_MESSAGE: &str = "THE END";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    AwaitingCharacterSelection,
    PresentingScene,
    AwaitingAction,
    Advancing,
    Terminal,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::AwaitingCharacterSelection => "AWAITING_CHARACTER_SELECTION",
            EngineState::PresentingScene => "PRESENTING_SCENE",
            EngineState::AwaitingAction => "AWAITING_ACTION",
            EngineState::Advancing => "ADVANCING",
            EngineState::Terminal => "TERMINAL",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Character extraction failed after {attempts} attempts")]
    ExtractionExhausted { attempts: usize },

    #[error("No character named '{name}'")]
    CharacterNotFound { name: String },

    #[error("Malformed completion response: {0}")]
    MalformedCompletionResponse(#[from] ResponseError),

    #[error("Invalid action '{input}': choose a number from 1 to {available}")]
    InvalidActionIndex { input: String, available: usize },

    #[error("Fragment store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Turn memory unavailable: {0}")]
    MemoryUnavailable(#[from] MemoryError),

    #[error("Completion backend unavailable: {0}")]
    CompletionUnavailable(#[from] CompletionError),

    #[error("Embedding backend unavailable: {0}")]
    EmbeddingUnavailable(#[from] EmbeddingError),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Input not accepted in state {state}")]
    UnexpectedInput { state: EngineState },
}

impl EngineError {
    /// Stable machine-readable kind, forwarded on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::ExtractionExhausted { .. } => "extraction_exhausted",
            EngineError::CharacterNotFound { .. } => "character_not_found",
            EngineError::MalformedCompletionResponse(_) => "malformed_response",
            EngineError::InvalidActionIndex { .. } => "invalid_action_index",
            EngineError::StoreUnavailable(_) => "store_unavailable",
            EngineError::MemoryUnavailable(_) => "memory_unavailable",
            EngineError::CompletionUnavailable(_) => "completion_unavailable",
            EngineError::EmbeddingUnavailable(_) => "embedding_unavailable",
            EngineError::SessionNotFound(_) => "session_not_found",
            EngineError::UnexpectedInput { .. } => "unexpected_input",
        }
    }

    /// True when the player can simply be re-prompted.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::CharacterNotFound { .. }
                | EngineError::InvalidActionIndex { .. }
                | EngineError::UnexpectedInput { .. }
        )
    }
}

/// One playthrough.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub characters: Vec<Character>,
    pub character: Option<Character>,
    pub remaining_steps: u32,
    pub state: EngineState,
    pub current: Option<TurnResult>,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(characters: Vec<Character>, max_steps: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            characters,
            character: None,
            remaining_steps: max_steps,
            state: EngineState::AwaitingCharacterSelection,
            current: None,
            started_at: Utc::now(),
        }
    }

    fn outcome(&self, scene: TurnResult) -> TurnOutcome {
        TurnOutcome {
            session_id: self.id,
            state: self.state,
            remaining_steps: self.remaining_steps,
            character: self.character.as_ref().map(|c| c.name.clone()),
            scene,
        }
    }
}

/// What a single input produced, as shown to the player.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub session_id: Uuid,
    pub state: EngineState,
    pub remaining_steps: u32,
    pub character: Option<String>,
    pub scene: TurnResult,
}

/// A 1-based action number; anything else is rejected.
fn parse_choice(choice: &str) -> Option<usize> {
    choice.trim().parse::<usize>().ok().filter(|&i| i >= 1)
}

pub struct TurnEngine {
    story: Story,
    fragments: Arc<dyn FragmentStore>,
    memory: Arc<dyn TurnMemory>,
    completion: Arc<dyn CompletionBackend>,
    embeddings: Arc<dyn EmbeddingBackend>,
    narrative: NarrativeConfig,
    temperature: f32,
    max_tokens: u32,
    schema: OnceCell<SchemaStatus>,
}

impl TurnEngine {
    pub fn new(
        story: Story,
        fragments: Arc<dyn FragmentStore>,
        memory: Arc<dyn TurnMemory>,
        completion: Arc<dyn CompletionBackend>,
        embeddings: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        let sampling = CompletionConfig::default();
        Self {
            story,
            fragments,
            memory,
            completion,
            embeddings,
            narrative: NarrativeConfig::default(),
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
            schema: OnceCell::new(),
        }
    }

    pub fn with_narrative(mut self, narrative: NarrativeConfig) -> Self {
        self.narrative = narrative;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn narrative(&self) -> &NarrativeConfig {
        &self.narrative
    }

    pub fn backends(&self) -> serde_json::Value {
        serde_json::json!({
            "fragments": self.fragments.name(),
            "memory": self.memory.name(),
            "completion": self.completion.name(),
            "embeddings": self.embeddings.name(),
        })
    }

    /// Populate the fragment store from the story, once per engine.
    pub async fn prepare(&self) -> Result<SchemaStatus, EngineError> {
        let status = self
            .schema
            .get_or_try_init(|| async {
                let paragraphs = self.story.paragraphs();
                let status = self
                    .fragments
                    .ensure_schema(&paragraphs, self.embeddings.as_ref())
                    .await?;
                tracing::info!(
                    ?status,
                    store = self.fragments.name(),
                    paragraphs = paragraphs.len(),
                    "Fragment store ready"
                );
                Ok::<_, StoreError>(status)
            })
            .await?;
        Ok(*status)
    }

    /// Extract the cast and open a session awaiting character selection.
    pub async fn start_session(&self) -> Result<Session, EngineError> {
        let extractor = CharacterExtractor {
            completion: self.completion.as_ref(),
            max_attempts: self.narrative.extraction_attempts,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let outcome = extractor.extract_attempts(self.story.text()).await?;
        let attempts = outcome.attempts();
        let characters = outcome
            .accepted()
            .filter(|c| !c.is_empty())
            .ok_or(EngineError::ExtractionExhausted { attempts })?;

        let session = Session::new(characters, self.narrative.max_steps);
        tracing::info!(
            session_id = %session.id,
            characters = session.characters.len(),
            "Session started"
        );
        Ok(session)
    }

    pub async fn select_character(
        &self,
        session: &mut Session,
        name: &str,
    ) -> Result<TurnOutcome, EngineError> {
        if session.state != EngineState::AwaitingCharacterSelection {
            return Err(EngineError::UnexpectedInput {
                state: session.state,
            });
        }
        let character = Character::find(&session.characters, name)
            .cloned()
            .ok_or_else(|| EngineError::CharacterNotFound {
                name: name.trim().to_string(),
            })?;

        tracing::debug!(
            session_id = %session.id,
            state = %EngineState::PresentingScene,
            character = %character.name,
            "Presenting opening scene"
        );
        let scene = self.present(session.id, &character).await?;

        session.character = Some(character);
        session.current = Some(scene.clone());
        session.state = EngineState::AwaitingAction;
        tracing::info!(
            session_id = %session.id,
            remaining_steps = session.remaining_steps,
            state = %session.state,
            "Character selected"
        );
        Ok(session.outcome(scene))
    }

    pub async fn choose_action(
        &self,
        session: &mut Session,
        choice: &str,
    ) -> Result<TurnOutcome, EngineError> {
        match session.state {
            EngineState::AwaitingAction => {}
            EngineState::Terminal => {
                return Ok(session.outcome(TurnResult::terminal(END_MESSAGE)));
            }
            state => return Err(EngineError::UnexpectedInput { state }),
        }

        let available = session.current.as_ref().map_or(0, |t| t.actions.len());
        let action = session
            .current
            .as_ref()
            .zip(parse_choice(choice))
            .and_then(|(turn, index)| turn.action(index))
            .map(str::to_string)
            .ok_or_else(|| EngineError::InvalidActionIndex {
                input: choice.to_string(),
                available,
            })?;
        let character = session.character.clone().ok_or(EngineError::UnexpectedInput {
            state: session.state,
        })?;

        let remaining = session.remaining_steps.saturating_sub(1);
        tracing::debug!(
            session_id = %session.id,
            state = %EngineState::Advancing,
            action = %action,
            "Advancing"
        );
        let scene = self.advance(session.id, &character, &action, remaining).await?;

        session.remaining_steps = remaining;
        session.state = if remaining == 0 {
            EngineState::Terminal
        } else {
            EngineState::AwaitingAction
        };
        session.current = Some(scene.clone());
        tracing::info!(
            session_id = %session.id,
            remaining_steps = remaining,
            state = %session.state,
            "Turn advanced"
        );
        Ok(session.outcome(scene))
    }

    pub async fn history(&self, session_id: Uuid) -> Result<Vec<TurnEntry>, EngineError> {
        Ok(self.memory.history(session_id).await?)
    }

    async fn present(
        &self,
        session_id: Uuid,
        character: &Character,
    ) -> Result<TurnResult, EngineError> {
        self.prepare().await?;
        let fragments = self
            .fragments
            .exact_match(&character.name, self.narrative.exact_match_k)
            .await?;

        let system = prompts::starting_system_prompt(&fragments, self.narrative.max_actions);
        let raw = self
            .complete(session_id, system, prompts::character_question(character))
            .await?;
        let scene = parse::parse_scene(&raw, self.narrative.max_actions).map_err(|e| {
            tracing::warn!(session_id = %session_id, error = %e, "Opening scene did not parse");
            e
        })?;

        self.memory
            .append_exchange(
                TurnEntry::human(session_id, character.name.as_str()),
                TurnEntry::assistant(session_id, raw),
            )
            .await?;
        Ok(scene)
    }

    async fn advance(
        &self,
        session_id: Uuid,
        character: &Character,
        action: &str,
        remaining: u32,
    ) -> Result<TurnResult, EngineError> {
        let mut fragments = self
            .fragments
            .exact_match(&character.name, self.narrative.exact_match_k)
            .await?;
        let query = self.embeddings.embed(action).await?;
        fragments.extend(self.fragments.similar(&query, self.narrative.similar_k).await?);

        let system =
            prompts::advancement_system_prompt(&fragments, remaining, self.narrative.max_actions);
        let raw = self
            .complete(session_id, system, prompts::action_question(character, action))
            .await?;
        let parsed = if remaining > 0 {
            parse::parse_scene(&raw, self.narrative.max_actions)
        } else {
            parse::parse_ending(&raw)
        };
        let scene = parsed.map_err(|e| {
            tracing::warn!(session_id = %session_id, error = %e, "Scene did not parse");
            e
        })?;

        self.memory
            .append_exchange(
                TurnEntry::human(session_id, action),
                TurnEntry::assistant(session_id, raw),
            )
            .await?;
        Ok(scene)
    }

    /// System prompt, then replayed history, then the new human turn.
    async fn complete(
        &self,
        session_id: Uuid,
        system: ChatMessage,
        question: String,
    ) -> Result<String, EngineError> {
        let history = replay_window(
            self.memory.history(session_id).await?,
            self.narrative.replay_window,
        );

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(system);
        messages.extend(history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::human(question));

        let raw = self
            .completion
            .complete(CompletionRequest {
                messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            })
            .await
            .map_err(|e| {
                tracing::error!(
                    session_id = %session_id,
                    backend = self.completion.name(),
                    error = %e,
                    "Completion call failed"
                );
                e
            })?;
        Ok(raw)
    }
}
