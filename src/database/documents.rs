//! Vector store access: document upsert and k-nearest-neighbor retrieval

use pgvector::Vector;
use uuid::Uuid;

use super::Database;
use crate::models::DocumentHit;
use crate::RagChatError;
use crate::Result;

/// Derive a short document title from its content (first 100 chars)
#[must_use]
pub fn title_from_content(content: &str) -> String {
    content.chars().take(100).collect()
}

impl Database {
    /// Insert or replace a document chunk, keyed by id
    pub async fn upsert_document(
        &self,
        id: Uuid,
        title: &str,
        content: &str,
        metadata: &serde_json::Value,
        embedding: &[f32],
    ) -> Result<()> {
        if embedding.is_empty() {
            return Err(RagChatError::EmptyEmbedding);
        }

        sqlx::query(
            r"
            INSERT INTO documents (id, title, content, metadata, embedding)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                content = EXCLUDED.content,
                metadata = EXCLUDED.metadata,
                embedding = EXCLUDED.embedding
            ",
        )
        .bind(id)
        .bind(title)
        .bind(content)
        .bind(metadata)
        .bind(Vector::from(embedding.to_vec()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve the k chunks nearest to the query embedding, nearest first
    pub async fn query_nearest(&self, embedding: &[f32], k: i64) -> Result<Vec<DocumentHit>> {
        if embedding.is_empty() {
            return Err(RagChatError::EmptyEmbedding);
        }

        let query_vector = Vector::from(embedding.to_vec());

        let hits = sqlx::query_as(
            r"
            SELECT id, title, content, metadata, (embedding <-> $1)::float8 AS distance
            FROM documents
            ORDER BY embedding <-> $1
            LIMIT $2
            ",
        )
        .bind(&query_vector)
        .bind(k)
        .fetch_all(&self.pool)
        .await?;

        Ok(hits)
    }
}
