//! RAG pipeline: embed -> retrieve -> prompt assembly -> generate

mod service;

pub use service::RagService;
pub use service::PROMPT_CHUNK_TITLE;
