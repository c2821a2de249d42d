//! Conversation and message persistence

use uuid::Uuid;

use super::Database;
use crate::models::Conversation;
use crate::models::Message;
use crate::Result;

impl Database {
    /// Create and persist a new conversation with a fresh opaque identifier
    pub async fn create_conversation(&self, model: Option<&str>) -> Result<Conversation> {
        let id = Uuid::new_v4().to_string();

        let conversation = sqlx::query_as(
            r"
            INSERT INTO conversations (id, model)
            VALUES ($1, $2)
            RETURNING id, model, created_at, updated_at
            ",
        )
        .bind(&id)
        .bind(model)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Created conversation {}", id);
        Ok(conversation)
    }

    /// Load a conversation with its ordered message history
    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let conversation: Option<Conversation> = sqlx::query_as(
            "SELECT id, model, created_at, updated_at FROM conversations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match conversation {
            Some(mut conversation) => {
                conversation.messages = self.get_messages(&conversation.id).await?;
                Ok(Some(conversation))
            }
            None => Ok(None),
        }
    }

    /// Resolve a conversation to operate on.
    ///
    /// A missing or unknown identifier silently falls back to creating a new
    /// conversation. A model override on an existing conversation is applied
    /// in memory only; it is persisted by the next `save_conversation`.
    pub async fn get_or_create_conversation(
        &self,
        id: Option<&str>,
        model: Option<&str>,
    ) -> Result<Conversation> {
        if let Some(id) = id {
            if let Some(mut conversation) = self.get_conversation(id).await? {
                if let Some(model) = model {
                    conversation.model = Some(model.to_string());
                }
                return Ok(conversation);
            }
        }
        self.create_conversation(model).await
    }

    /// List all stored conversations with their messages
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> = sqlx::query_as(
            "SELECT id, model, created_at, updated_at FROM conversations ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        for conversation in &mut conversations {
            conversation.messages = self.get_messages(&conversation.id).await?;
        }

        Ok(conversations)
    }

    /// Load the ordered message history of a conversation
    pub async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let messages = sqlx::query_as(
            r"
            SELECT id, role, content, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY id
            ",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    /// Append a message to a conversation and bump its update timestamp
    pub async fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Result<Message> {
        let message = sqlx::query_as(
            r"
            INSERT INTO messages (conversation_id, role, content)
            VALUES ($1, $2, $3)
            RETURNING id, role, content, created_at
            ",
        )
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query("UPDATE conversations SET updated_at = now() WHERE id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        Ok(message)
    }

    /// Persist the mutable attributes of a conversation (model override)
    pub async fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        sqlx::query("UPDATE conversations SET model = $2, updated_at = now() WHERE id = $1")
            .bind(&conversation.id)
            .bind(&conversation.model)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
