//! API request and response types

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Chat request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub use_rag: bool,
    /// Retrieval count; falls back to the configured default when omitted
    #[serde(default)]
    pub k: Option<i64>,
}

/// Uniform chat envelope, used for both success and error responses
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEnvelope {
    pub conversation_id: String,
    pub message: String,
}

/// Query parameters of the streaming endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamParams {
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub use_rag: bool,
}

/// Document ingestion request
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Document ingestion response
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub id: Uuid,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_defaults() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"Hi"}"#).unwrap();
        assert_eq!(req.conversation_id, None);
        assert_eq!(req.model, None);
        assert!(!req.use_rag);
        assert_eq!(req.k, None);
    }

    #[test]
    fn test_chat_request_camel_case() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"conversationId":"c1","message":"Hi","useRag":true,"k":5}"#,
        )
        .unwrap();
        assert_eq!(req.conversation_id.as_deref(), Some("c1"));
        assert!(req.use_rag);
        assert_eq!(req.k, Some(5));
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = ChatEnvelope {
            conversation_id: "c1".to_string(),
            message: "Hello!".to_string(),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"conversationId": "c1", "message": "Hello!"})
        );
    }
}
