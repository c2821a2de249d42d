//! Completion provider clients and streaming support

mod client;
pub mod streaming;

pub use client::CompletionClient;
pub use streaming::DeltaDecoder;
pub use streaming::StreamFraming;
pub use streaming::StreamingResponse;
