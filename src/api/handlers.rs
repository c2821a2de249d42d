//! API request handlers

use std::sync::Arc;

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::Event;
use axum::response::sse::Sse;
use axum::Json;
use chrono::Utc;
use futures::Stream;
use futures::StreamExt;
use tracing::error;
use tracing::info;
use uuid::Uuid;

use crate::api::types::ChatEnvelope;
use crate::api::types::ChatRequest;
use crate::api::types::HealthResponse;
use crate::api::types::IngestRequest;
use crate::api::types::IngestResponse;
use crate::api::types::StreamParams;
use crate::database::title_from_content;
use crate::database::Database;
use crate::embeddings::EmbeddingClient;
use crate::llm::CompletionClient;
use crate::models::role;
use crate::models::Conversation;
use crate::rag::RagService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub database: Arc<Database>,
    pub embeddings: Arc<EmbeddingClient>,
    pub completions: Arc<CompletionClient>,
    pub rag: Arc<RagService>,
    /// Retrieval count used when a request does not name its own `k`
    pub default_k: i64,
}

fn error_envelope(
    conversation_id: &str,
    message: impl std::fmt::Display,
) -> (StatusCode, Json<ChatEnvelope>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ChatEnvelope {
            conversation_id: conversation_id.to_string(),
            message: message.to_string(),
        }),
    )
}

/// Health check handler
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Chat endpoint (POST /api/v1/chat).
///
/// Resolves or creates the conversation, generates an answer (RAG or
/// direct completion), persists the assistant reply and responds with the
/// uniform `{conversationId, message}` envelope. Every failure collapses
/// into the same envelope with a 500 status.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ChatEnvelope>) {
    let k = req.k.unwrap_or(state.default_k);
    info!("POST /api/v1/chat (useRag={}, k={k})", req.use_rag);

    let conversation = match state
        .database
        .get_or_create_conversation(req.conversation_id.as_deref(), req.model.as_deref())
        .await
    {
        Ok(conversation) => conversation,
        Err(e) => {
            error!("Failed to resolve conversation: {e}");
            return error_envelope("", e);
        }
    };

    let answer = if req.use_rag {
        state
            .rag
            .answer(&conversation.id, &req.message, k, req.model.as_deref())
            .await
    } else {
        state
            .completions
            .complete_once(&conversation.messages, &req.message, req.model.as_deref())
            .await
    };

    let answer = match answer {
        Ok(answer) => answer,
        Err(e) => {
            error!("Answer generation failed: {e}");
            return error_envelope(&conversation.id, e);
        }
    };

    if answer.trim().is_empty() {
        return error_envelope(&conversation.id, "Empty answer");
    }

    if let Err(e) = persist_answer(&state, &conversation, &answer).await {
        error!("Failed to persist answer: {e}");
        return error_envelope(&conversation.id, e);
    }

    (
        StatusCode::OK,
        Json(ChatEnvelope {
            conversation_id: conversation.id,
            message: answer,
        }),
    )
}

/// Append the assistant reply and persist the conversation attributes
/// (the model override becomes durable here).
async fn persist_answer(
    state: &AppState,
    conversation: &Conversation,
    answer: &str,
) -> crate::Result<()> {
    state
        .database
        .append_message(&conversation.id, role::ASSISTANT, answer)
        .await?;
    state.database.save_conversation(conversation).await?;
    Ok(())
}

/// Streaming chat endpoint (GET /api/v1/stream/:conversation_id).
///
/// Forwards each provider fragment as one SSE event. The streamed answer
/// is not persisted and there is no error envelope; a mid-stream failure
/// terminates the transport.
pub async fn stream(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, StatusCode> {
    info!(
        "GET /api/v1/stream/{conversation_id} (useRag={})",
        params.use_rag
    );

    let conversation = state
        .database
        .get_or_create_conversation(Some(&conversation_id), params.model.as_deref())
        .await
        .map_err(|e| {
            error!("Failed to resolve conversation: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let streaming = if params.use_rag {
        state
            .rag
            .answer_stream(
                &conversation.id,
                &params.message,
                state.default_k,
                params.model.as_deref(),
            )
            .await
    } else {
        state
            .completions
            .complete_stream(
                &conversation.messages,
                &params.message,
                params.model.as_deref(),
            )
            .await
    }
    .map_err(|e| {
        error!("Failed to open completion stream: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let events = streaming.into_stream().map(|fragment| match fragment {
        Ok(delta) => Ok(Event::default()
            .event("message")
            .id(Utc::now().timestamp_millis().to_string())
            .data(delta)),
        // Propagating the error closes the SSE connection
        Err(e) => Err(axum::Error::new(e)),
    });

    Ok(Sse::new(events))
}

/// List all conversations (GET /api/v1/conversations)
pub async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Conversation>>, StatusCode> {
    state.database.list_conversations().await.map(Json).map_err(|e| {
        error!("Failed to list conversations: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Get a conversation by id (GET /api/v1/conversations/:id)
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, StatusCode> {
    match state.database.get_conversation(&id).await {
        Ok(Some(conversation)) => Ok(Json(conversation)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("Failed to load conversation {id}: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Ingest a document into the vector store (POST /api/v1/documents/ingest)
pub async fn ingest_document(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, StatusCode> {
    info!("POST /api/v1/documents/ingest");

    let embedding = state.embeddings.generate(&req.content).await.map_err(|e| {
        error!("Failed to embed document: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let id = Uuid::new_v4();
    let title = req
        .title
        .unwrap_or_else(|| title_from_content(&req.content));
    let metadata = req.metadata.unwrap_or_else(|| serde_json::json!({}));

    state
        .database
        .upsert_document(id, &title, &req.content, &metadata, &embedding)
        .await
        .map_err(|e| {
            error!("Failed to upsert document: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(IngestResponse { id }))
}
