//! Strict parsing of model output.
//!
//! Model text is deserialized into typed structures and validated; anything
//! that does not fit comes back as a `ResponseError` instead of a panic.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::{Character, TurnResult};

#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("Response is not valid JSON for the expected shape: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Response has an empty description")]
    EmptyDescription,

    #[error("Response has no actions")]
    MissingActions,

    #[error("Response has {count} actions, at most {max} allowed")]
    TooManyActions { count: usize, max: usize },

    #[error("Response contains an empty action")]
    EmptyAction,
}

fn fence_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n?(.*?)\s*```$").ok())
        .as_ref()
}

/// Trim the text and drop one surrounding markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    fence_pattern()
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed)
}

#[derive(Debug, Deserialize)]
struct RawCharacter {
    character_name: Option<String>,
    #[serde(alias = "character_abilites")]
    character_abilities: Option<String>,
    character_weaknesses: Option<String>,
}

/// Parse an extraction response.
///
/// Returns `None` when the text is not a list of character objects or when
/// any member lacks a name, abilities or weaknesses.
pub fn parse_characters(raw: &str) -> Option<Vec<Character>> {
    let parsed: Vec<RawCharacter> = match serde_json::from_str(strip_code_fence(raw)) {
        Ok(list) => list,
        Err(e) => {
            tracing::debug!(error = %e, "Character list did not parse");
            return None;
        }
    };

    parsed
        .into_iter()
        .map(|c| {
            Some(Character {
                name: c
                    .character_name
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())?,
                abilities: c.character_abilities?,
                weaknesses: c.character_weaknesses?,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct RawScene {
    description: String,
    #[serde(default)]
    actions: Option<Vec<String>>,
}

/// Parse a scene that must offer between 1 and `max_actions` actions.
pub fn parse_scene(raw: &str, max_actions: usize) -> Result<TurnResult, ResponseError> {
    let scene: RawScene = serde_json::from_str(strip_code_fence(raw))?;

    if scene.description.trim().is_empty() {
        return Err(ResponseError::EmptyDescription);
    }

    let actions = scene.actions.unwrap_or_default();
    if actions.is_empty() {
        return Err(ResponseError::MissingActions);
    }
    if actions.len() > max_actions {
        return Err(ResponseError::TooManyActions {
            count: actions.len(),
            max: max_actions,
        });
    }
    if actions.iter().any(|a| a.trim().is_empty()) {
        return Err(ResponseError::EmptyAction);
    }

    Ok(TurnResult {
        description: scene.description,
        actions,
    })
}

/// Parse the closing scene; only the description is required and any actions are dropped.
pub fn parse_ending(raw: &str) -> Result<TurnResult, ResponseError> {
    let scene: RawScene = serde_json::from_str(strip_code_fence(raw))?;

    if scene.description.trim().is_empty() {
        return Err(ResponseError::EmptyDescription);
    }

    Ok(TurnResult::terminal(scene.description))
}
