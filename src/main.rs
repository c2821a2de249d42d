use clap::Parser;
use clap::Subcommand;
use ragchat::config::AppConfig;
use ragchat::database::Database;
use ragchat::embeddings::EmbeddingClient;
use ragchat::Result;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "ragchat")]
#[command(about = "Conversational AI backend with RAG over Postgres/pgvector")]
#[command(version)]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to bind to
        #[arg(long, default_value = "8080")]
        port: u16,
        /// Disable CORS headers
        #[arg(long)]
        no_cors: bool,
    },
    /// Create the database schema (pgvector extension and tables)
    InitSchema,
    /// Ingest a text file into the vector store
    Ingest {
        /// Path to the text file to ingest
        #[arg(long)]
        file: String,
        /// Document title (defaults to a content prefix)
        #[arg(long)]
        title: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    ragchat::logging::init_logging_with_config(Some(&config))?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            no_cors,
        } => {
            ragchat::api::serve_api(&config, host, port, !no_cors).await?;
        }
        Commands::InitSchema => {
            let database = Database::from_config(&config).await?;
            database
                .ensure_schema(config.embedding_dimension())
                .await?;
            info!("Schema initialized");
        }
        Commands::Ingest { file, title } => {
            let content = std::fs::read_to_string(&file)?;
            let database = Database::from_config(&config).await?;
            database
                .ensure_schema(config.embedding_dimension())
                .await?;
            let embeddings = EmbeddingClient::from_config(&config)?;

            let embedding = embeddings.generate(&content).await?;
            let id = Uuid::new_v4();
            let title =
                title.unwrap_or_else(|| ragchat::database::title_from_content(&content));
            let metadata = serde_json::json!({ "source": file });

            database
                .upsert_document(id, &title, &content, &metadata, &embedding)
                .await?;
            info!("Ingested {file} as document {id}");
        }
    }

    Ok(())
}
