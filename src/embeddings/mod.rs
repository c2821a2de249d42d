//! Embedding generation via external provider APIs

mod client;

pub use client::EmbeddingClient;
