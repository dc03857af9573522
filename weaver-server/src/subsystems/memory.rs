//! Turn memory: the append-only, per-session conversation log
//!
//! Every completion call replays a session's history so the model keeps the
//! narrative consistent. Entries are only ever appended, in order; a human
//! input and the model's reply are written together as one exchange.
//! Writers to the same session must be serialised by the caller.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;
use weaver_core::models::{Role, TurnEntry};
use weaver_core::WeaverError;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait TurnMemory: Send + Sync {
    async fn append(&self, entry: TurnEntry) -> Result<(), MemoryError>;

    /// Append a human input and the assistant reply as one exchange.
    async fn append_exchange(&self, human: TurnEntry, assistant: TurnEntry) -> Result<(), MemoryError> {
        self.append(human).await?;
        self.append(assistant).await
    }

    /// Full history of a session, oldest first.
    async fn history(&self, session_id: Uuid) -> Result<Vec<TurnEntry>, MemoryError>;

    async fn len(&self, session_id: Uuid) -> Result<usize, MemoryError> {
        Ok(self.history(session_id).await?.len())
    }

    fn name(&self) -> &str;
}

/// The most recent `window` entries, or everything when no window is set.
pub fn replay_window(history: Vec<TurnEntry>, window: Option<usize>) -> Vec<TurnEntry> {
    match window {
        Some(w) if history.len() > w => {
            let skip = history.len() - w;
            history.into_iter().skip(skip).collect()
        }
        _ => history,
    }
}

// ============================================================================
// Postgres
// ============================================================================

pub struct PgTurnMemory {
    pool: PgPool,
    table: String,
}

impl PgTurnMemory {
    pub fn new(pool: PgPool, table: &str) -> Result<Self, WeaverError> {
        if !weaver_core::db::is_valid_table_name(table) {
            return Err(WeaverError::InvalidTableName(table.to_string()));
        }
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    pub async fn ensure_table(&self) -> Result<(), MemoryError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                session_id UUID NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {table}_session_idx ON {table} (session_id, id)",
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (session_id, role, content, created_at) VALUES ($1, $2, $3, $4)",
            self.table
        )
    }
}

#[async_trait]
impl TurnMemory for PgTurnMemory {
    async fn append(&self, entry: TurnEntry) -> Result<(), MemoryError> {
        sqlx::query(&self.insert_sql())
            .bind(entry.session_id)
            .bind(entry.role.as_str())
            .bind(&entry.content)
            .bind(entry.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_exchange(&self, human: TurnEntry, assistant: TurnEntry) -> Result<(), MemoryError> {
        let sql = self.insert_sql();
        let mut tx = self.pool.begin().await?;
        for entry in [&human, &assistant] {
            sqlx::query(&sql)
                .bind(entry.session_id)
                .bind(entry.role.as_str())
                .bind(&entry.content)
                .bind(entry.created_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn history(&self, session_id: Uuid) -> Result<Vec<TurnEntry>, MemoryError> {
        let rows: Vec<(String, String, DateTime<Utc>)> = sqlx::query_as(&format!(
            "SELECT role, content, created_at FROM {} WHERE session_id = $1 ORDER BY id ASC",
            self.table
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(role, content, created_at)| TurnEntry {
                session_id,
                role: Role::parse(&role),
                content,
                created_at,
            })
            .collect())
    }

    async fn len(&self, session_id: Uuid) -> Result<usize, MemoryError> {
        let row: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {} WHERE session_id = $1",
            self.table
        ))
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as usize)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct InMemoryTurnMemory {
    sessions: RwLock<HashMap<Uuid, Vec<TurnEntry>>>,
}

impl InMemoryTurnMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TurnMemory for InMemoryTurnMemory {
    async fn append(&self, entry: TurnEntry) -> Result<(), MemoryError> {
        self.sessions
            .write()
            .await
            .entry(entry.session_id)
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn append_exchange(&self, human: TurnEntry, assistant: TurnEntry) -> Result<(), MemoryError> {
        let mut sessions = self.sessions.write().await;
        let log = sessions.entry(human.session_id).or_default();
        log.push(human);
        log.push(assistant);
        Ok(())
    }

    async fn history(&self, session_id: Uuid) -> Result<Vec<TurnEntry>, MemoryError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
