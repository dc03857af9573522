//! Fragment store: story paragraphs with their embeddings
//!
//! Two lookups feed the turn engine:
//! - `exact_match`: case-insensitive substring search, ranked by how often the
//!   phrase occurs in each paragraph (ties keep store order)
//! - `similar`: nearest neighbours by cosine distance
//!
//! Population is guarded by an existence check, not a uniqueness constraint.
//! Two processes initialising the same empty table at once can both insert,
//! and a failure part-way leaves the table partially populated.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use weaver_core::embeddings::{EmbeddingBackend, EmbeddingError};
use weaver_core::models::Fragment;
use weaver_core::WeaverError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Embedding failed while populating fragments: {0}")]
    Embedding(#[from] EmbeddingError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    /// The table was already there; nothing was written.
    Existing,
    /// The table was created and loaded with this many paragraphs.
    Created { rows: usize },
}

#[async_trait]
pub trait FragmentStore: Send + Sync {
    /// Create and populate the fragment table unless it already exists.
    async fn ensure_schema(
        &self,
        paragraphs: &[&str],
        embedder: &dyn EmbeddingBackend,
    ) -> Result<SchemaStatus, StoreError>;

    /// Up to `k` fragments containing `phrase`, most occurrences first.
    async fn exact_match(&self, phrase: &str, k: usize) -> Result<Vec<String>, StoreError>;

    /// Up to `k` fragments nearest to `vector`, nearest first.
    async fn similar(&self, vector: &[f32], k: usize) -> Result<Vec<String>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    fn name(&self) -> &str;
}

/// Non-overlapping, case-insensitive occurrences of `phrase` in `text`.
pub fn count_occurrences(phrase: &str, text: &str) -> usize {
    let phrase = phrase.to_lowercase();
    if phrase.is_empty() {
        return 0;
    }
    text.to_lowercase().matches(phrase.as_str()).count()
}

/// Rank candidate texts by occurrence count (descending, stable) and keep `k`.
pub fn rank_by_occurrences(phrase: &str, candidates: Vec<String>, k: usize) -> Vec<String> {
    let mut scored: Vec<(String, usize)> = candidates
        .into_iter()
        .map(|text| {
            let n = count_occurrences(phrase, &text);
            (text, n)
        })
        .filter(|(_, n)| *n > 0)
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().take(k).map(|(text, _)| text).collect()
}

/// Cosine distance in `[0, 2]`; zero vectors sit at distance 1.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn escape_like(phrase: &str) -> String {
    let mut out = String::with_capacity(phrase.len() + 2);
    for c in phrase.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ============================================================================
// Postgres + pgvector
// ============================================================================

pub struct PgFragmentStore {
    pool: PgPool,
    table: String,
}

impl PgFragmentStore {
    pub fn new(pool: PgPool, table: &str) -> Result<Self, WeaverError> {
        if !weaver_core::db::is_valid_table_name(table) {
            return Err(WeaverError::InvalidTableName(table.to_string()));
        }
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }
}

#[async_trait]
impl FragmentStore for PgFragmentStore {
    async fn ensure_schema(
        &self,
        paragraphs: &[&str],
        embedder: &dyn EmbeddingBackend,
    ) -> Result<SchemaStatus, StoreError> {
        weaver_core::db::enable_pgvector(&self.pool).await?;

        if weaver_core::db::table_exists(&self.pool, &self.table).await? {
            tracing::debug!(table = %self.table, "Fragment table already exists");
            return Ok(SchemaStatus::Existing);
        }

        tracing::info!(table = %self.table, "Fragment table does not exist, creating it");
        sqlx::query(&format!(
            "CREATE TABLE {} (story_text TEXT, story_embeddings VECTOR)",
            self.table
        ))
        .execute(&self.pool)
        .await?;

        let insert = format!(
            "INSERT INTO {} (story_text, story_embeddings) VALUES ($1, $2)",
            self.table
        );
        for paragraph in paragraphs {
            let embedding = Vector::from(embedder.embed(paragraph).await?);
            sqlx::query(&insert)
                .bind(*paragraph)
                .bind(&embedding)
                .execute(&self.pool)
                .await?;
        }

        tracing::info!(
            table = %self.table,
            rows = paragraphs.len(),
            backend = embedder.name(),
            "Fragment table created and populated"
        );
        Ok(SchemaStatus::Created {
            rows: paragraphs.len(),
        })
    }

    async fn exact_match(&self, phrase: &str, k: usize) -> Result<Vec<String>, StoreError> {
        if phrase.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT story_text FROM {} WHERE story_text ILIKE $1",
            self.table
        ))
        .bind(format!("%{}%", escape_like(phrase)))
        .fetch_all(&self.pool)
        .await?;

        let candidates = rows.into_iter().map(|r| r.0).collect();
        Ok(rank_by_occurrences(phrase, candidates, k))
    }

    async fn similar(&self, vector: &[f32], k: usize) -> Result<Vec<String>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = Vector::from(vector.to_vec());
        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT story_text FROM {} ORDER BY story_embeddings <=> $1::vector LIMIT $2",
            self.table
        ))
        .bind(&query)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", self.table))
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

/// Process-local store; `None` plays the part of a missing table.
#[derive(Default)]
pub struct InMemoryFragmentStore {
    fragments: RwLock<Option<Vec<Fragment>>>,
}

impl InMemoryFragmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FragmentStore for InMemoryFragmentStore {
    async fn ensure_schema(
        &self,
        paragraphs: &[&str],
        embedder: &dyn EmbeddingBackend,
    ) -> Result<SchemaStatus, StoreError> {
        let mut guard = self.fragments.write().await;
        if guard.is_some() {
            return Ok(SchemaStatus::Existing);
        }

        let table = guard.insert(Vec::with_capacity(paragraphs.len()));
        for paragraph in paragraphs {
            let embedding = embedder.embed(paragraph).await?;
            table.push(Fragment {
                text: paragraph.to_string(),
                embedding: Vector::from(embedding),
            });
        }

        tracing::info!(rows = table.len(), "In-memory fragment table populated");
        Ok(SchemaStatus::Created {
            rows: paragraphs.len(),
        })
    }

    async fn exact_match(&self, phrase: &str, k: usize) -> Result<Vec<String>, StoreError> {
        if phrase.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let guard = self.fragments.read().await;
        let candidates = guard
            .iter()
            .flatten()
            .map(|f| f.text.clone())
            .collect();
        Ok(rank_by_occurrences(phrase, candidates, k))
    }

    async fn similar(&self, vector: &[f32], k: usize) -> Result<Vec<String>, StoreError> {
        let guard = self.fragments.read().await;
        let mut scored: Vec<(f32, &Fragment)> = guard
            .iter()
            .flatten()
            .map(|f| (cosine_distance(vector, f.embedding.as_slice()), f))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, f)| f.text.clone())
            .collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.fragments.read().await.as_ref().map_or(0, Vec::len))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// TESTS
// ============================================================================
