//! HTTP server implementation

use std::sync::Arc;

use axum::Router;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::AppState;
use crate::api::routes;
use crate::config::AppConfig;
use crate::database::Database;
use crate::embeddings::EmbeddingClient;
use crate::llm::CompletionClient;
use crate::rag::RagService;
use crate::Result;

/// Build the full application router from shared state
pub fn build_router(state: AppState, enable_cors: bool) -> Router {
    let mut app = Router::new()
        .nest("/api/v1", routes::api_routes(state))
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        info!("CORS enabled");
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Initialize services from configuration
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let database = Arc::new(Database::from_config(config).await?);
    database.ensure_schema(config.embedding_dimension()).await?;

    let embeddings = Arc::new(EmbeddingClient::from_config(config)?);
    let completions = Arc::new(CompletionClient::from_config(config)?);
    let rag = Arc::new(RagService::from_services(
        database.clone(),
        embeddings.clone(),
        completions.clone(),
    ));

    Ok(AppState {
        database,
        embeddings,
        completions,
        rag,
        default_k: config.default_k(),
    })
}

/// Start the API server
pub async fn serve_api(
    config: &AppConfig,
    host: String,
    port: u16,
    enable_cors: bool,
) -> Result<()> {
    info!("Starting ragchat API server...");

    let state = build_state(config).await?;
    let app = build_router(state, enable_cors);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("API server listening on http://{addr}");
    info!("Available endpoints:");
    info!("  GET  /api/v1/health                    - Health check");
    info!("  POST /api/v1/chat                      - Chat (RAG or direct)");
    info!("  GET  /api/v1/stream/:conversation_id   - SSE streaming chat");
    info!("  GET  /api/v1/conversations             - List conversations");
    info!("  GET  /api/v1/conversations/:id         - Get conversation");
    info!("  POST /api/v1/documents/ingest          - Ingest a document");

    axum::serve(listener, app).await?;

    Ok(())
}
