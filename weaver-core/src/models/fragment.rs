use pgvector::Vector;
use serde::{Deserialize, Serialize};

/// One story paragraph with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Fragment {
    #[sqlx(rename = "story_text")]
    pub text: String,
    #[sqlx(rename = "story_embeddings")]
    pub embedding: Vector,
}
