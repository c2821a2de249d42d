use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Message roles used by the chat pipeline.
///
/// Roles are stored as open strings; these are the values the pipeline
/// itself writes.
pub mod role {
    pub const SYSTEM: &str = "system";
    pub const USER: &str = "user";
    pub const ASSISTANT: &str = "assistant";
}

/// A stored conversation and its ordered message history.
///
/// Ownership is one-directional: the conversation holds its messages and a
/// message carries no back-reference. Message order is insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// A single turn within a conversation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One nearest-neighbor hit from the vector store
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DocumentHit {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub metadata: serde_json::Value,
    pub distance: f64,
}
