//! Live sessions by id.
//!
//! Each session sits behind its own mutex; a turn holds it for its whole
//! duration, so one session's inputs are applied one at a time while other
//! sessions proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::engine::{EngineError, Session};

pub type SessionHandle = Arc<Mutex<Session>>;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Session) -> SessionHandle {
        let id = session.id;
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, handle.clone());
        handle
    }

    pub async fn get(&self, id: Uuid) -> Result<SessionHandle, EngineError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(EngineError::SessionNotFound(id))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
