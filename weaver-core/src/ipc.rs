use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StoryRequest {
    Ping,
    Health,
    StartSession,
    SelectCharacter {
        session_id: uuid::Uuid,
        name: String,
    },
    ChooseAction {
        session_id: uuid::Uuid,
        /// 1-based action number as typed by the player.
        choice: String,
    },
    GetSession {
        session_id: uuid::Uuid,
    },
    History {
        session_id: uuid::Uuid,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoryResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Machine-readable error kind, e.g. `invalid_action_index`.
    #[serde(default)]
    pub code: Option<String>,
    pub version: String,
}

impl StoryResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            code: None,
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            code: None,
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn err_with_code(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::err(msg)
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
