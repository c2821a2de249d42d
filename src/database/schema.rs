//! Idempotent schema bootstrap
//!
//! The documents table carries a pgvector column whose dimension comes from
//! configuration, so the DDL is applied at startup rather than through
//! static migration files.

use super::Database;
use crate::Result;

impl Database {
    /// Create the pgvector extension and all tables if they do not exist
    pub async fn ensure_schema(&self, embedding_dimension: usize) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                model TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Messages cascade-delete with their owning conversation
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id BIGSERIAL PRIMARY KEY,
                conversation_id TEXT NOT NULL
                    REFERENCES conversations(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_conversation_id
            ON messages(conversation_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r"
            CREATE TABLE IF NOT EXISTS documents (
                id UUID PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}',
                embedding vector({embedding_dimension}) NOT NULL
            )
            ",
        ))
        .execute(&self.pool)
        .await?;

        tracing::info!(
            "Schema ensured (embedding dimension: {})",
            embedding_dimension
        );

        Ok(())
    }
}
