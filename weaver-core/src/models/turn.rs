use serde::{Deserialize, Serialize};

/// A generated scene: a description plus the numbered actions on offer.
/// Terminal scenes carry no actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResult {
    pub description: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

impl TurnResult {
    pub fn terminal(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            actions: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.actions.is_empty()
    }

    /// Resolve a 1-based action index.
    pub fn action(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.actions.get(i))
            .map(String::as_str)
    }
}
