//! RAG answer generation, whole-answer and streaming

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use tracing::info;
use uuid::Uuid;

use crate::database::Database;
use crate::embeddings::EmbeddingClient;
use crate::errors::Result;
use crate::llm::CompletionClient;
use crate::llm::StreamingResponse;
use crate::models::role;
use crate::models::Conversation;
use crate::models::DocumentHit;

/// Title under which each user prompt is stored as a retrievable chunk
pub const PROMPT_CHUNK_TITLE: &str = "Last User Prompt";

/// Composes the embedding provider, vector store, conversation store and
/// completion provider into a single answer-generation operation.
pub struct RagService {
    database: Arc<Database>,
    embeddings: Arc<EmbeddingClient>,
    completions: Arc<CompletionClient>,
}

impl RagService {
    /// Create from existing services
    #[must_use]
    pub fn from_services(
        database: Arc<Database>,
        embeddings: Arc<EmbeddingClient>,
        completions: Arc<CompletionClient>,
    ) -> Self {
        Self {
            database,
            embeddings,
            completions,
        }
    }

    /// Generate a whole answer with RAG.
    ///
    /// Embeds the prompt, retrieves the k nearest chunks, stores the prompt
    /// itself as a new chunk, persists the assembled system message and the
    /// user message to the conversation, then delegates to the completion
    /// provider. Any step failing aborts the operation; there is no retry
    /// and no rollback of already-stored rows.
    pub async fn answer(
        &self,
        conversation_id: &str,
        prompt: &str,
        k: i64,
        model: Option<&str>,
    ) -> Result<String> {
        info!("RAG answer for conversation {conversation_id} (k={k})");
        let conversation = self.prepare(conversation_id, prompt, k, true).await?;
        self.completions
            .complete_once(&conversation.messages, prompt, model)
            .await
    }

    /// Streaming variant of [`RagService::answer`].
    ///
    /// Shares the same preparation phase except that the prompt is not
    /// stored as a chunk on this path.
    pub async fn answer_stream(
        &self,
        conversation_id: &str,
        prompt: &str,
        k: i64,
        model: Option<&str>,
    ) -> Result<StreamingResponse> {
        info!("RAG stream for conversation {conversation_id} (k={k})");
        let conversation = self.prepare(conversation_id, prompt, k, false).await?;
        self.completions
            .complete_stream(&conversation.messages, prompt, model)
            .await
    }

    /// Shared preparation phase: embed, retrieve, optionally store the
    /// prompt chunk, and persist the system + user turns.
    async fn prepare(
        &self,
        conversation_id: &str,
        prompt: &str,
        k: i64,
        store_prompt: bool,
    ) -> Result<Conversation> {
        let embedding = self.embeddings.generate(prompt).await?;
        debug!("Embedded prompt ({} dimensions)", embedding.len());

        let hits = self.database.query_nearest(&embedding, k).await?;
        debug!("Retrieved {} chunks", hits.len());

        if store_prompt {
            // Fresh id per call: prior user turns stay retrievable,
            // repeated prompts are not deduplicated.
            let metadata = serde_json::json!({
                "conversationId": conversation_id,
                "createdAt": Utc::now(),
            });
            self.database
                .upsert_document(
                    Uuid::new_v4(),
                    PROMPT_CHUNK_TITLE,
                    prompt,
                    &metadata,
                    &embedding,
                )
                .await?;
        }

        let system_prompt = build_system_prompt(&hits);

        let mut conversation = self
            .database
            .get_or_create_conversation(Some(conversation_id), None)
            .await?;

        // The system prompt becomes part of permanent conversation history
        let system = self
            .database
            .append_message(&conversation.id, role::SYSTEM, &system_prompt)
            .await?;
        let user = self
            .database
            .append_message(&conversation.id, role::USER, prompt)
            .await?;
        conversation.messages.push(system);
        conversation.messages.push(user);

        Ok(conversation)
    }
}

/// Assemble the system instruction from retrieved chunks, nearest first
fn build_system_prompt(hits: &[DocumentHit]) -> String {
    let mut context = String::new();
    for hit in hits {
        context.push_str(&format!("Source: {}\n{}\n\n", hit.title, hit.content));
    }

    format!(
        "You are a helpful assistant. Use the following context to answer the user. \
         Indicate the source for factual claims from the context.\n\n{context}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(title: &str, content: &str) -> DocumentHit {
        DocumentHit {
            id: Uuid::new_v4(),
            title: title.to_string(),
            content: content.to_string(),
            metadata: serde_json::json!({}),
            distance: 0.0,
        }
    }

    #[test]
    fn test_system_prompt_embeds_chunks_in_order() {
        let prompt = build_system_prompt(&[hit("doc1", "fact"), hit("doc2", "more")]);
        assert!(prompt.starts_with("You are a helpful assistant."));
        assert!(prompt.contains("Source: doc1\nfact\n\n"));
        assert!(prompt.contains("Source: doc2\nmore\n\n"));
        assert!(prompt.find("doc1").unwrap() < prompt.find("doc2").unwrap());
    }

    #[test]
    fn test_system_prompt_without_hits() {
        let prompt = build_system_prompt(&[]);
        assert!(prompt.contains("Indicate the source for factual claims"));
    }
}
