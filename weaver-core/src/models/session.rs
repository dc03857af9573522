use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    Human,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Human => "human",
            Role::Assistant => "assistant",
        }
    }

    /// Unknown stored roles are read back as human turns.
    pub fn parse(s: &str) -> Self {
        match s {
            "system" => Role::System,
            "assistant" | "ai" => Role::Assistant,
            _ => Role::Human,
        }
    }
}

/// One persisted entry of a session's turn history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEntry {
    pub session_id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl TurnEntry {
    pub fn new(session_id: Uuid, role: Role, content: impl Into<String>) -> Self {
        Self {
            session_id,
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn human(session_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::Human, content)
    }

    pub fn assistant(session_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::Assistant, content)
    }
}
