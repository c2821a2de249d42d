//! Chat completion client for Ollama-style and OpenAI-style providers

use std::collections::VecDeque;

use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::config::AppConfig;
use crate::config::ProviderKind;
use crate::errors::RagChatError;
use crate::errors::Result;
use crate::llm::streaming::DeltaDecoder;
use crate::llm::streaming::StreamFraming;
use crate::llm::streaming::StreamingResponse;
use crate::models::Message;

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

/// Client for generating chat completions.
///
/// One struct covers both provider dialects; the variant is fixed by
/// configuration at construction time.
pub struct CompletionClient {
    provider: ProviderKind,
    default_model: String,
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl CompletionClient {
    /// Create a new completion client
    ///
    /// # Errors
    /// - HTTP client build errors (invalid configuration)
    pub fn new(
        provider: ProviderKind,
        default_model: String,
        endpoint: String,
        api_key: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| RagChatError::Http(e.to_string()))?;

        Ok(Self {
            provider,
            default_model,
            endpoint,
            api_key,
            client,
        })
    }

    /// Create a completion client from application configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.provider.kind,
            config.provider.chat_model.clone(),
            config.provider.endpoint.clone(),
            config.provider.api_key.clone(),
        )
    }

    fn chat_url(&self) -> String {
        match self.provider {
            ProviderKind::Ollama => format!("{}/api/chat", self.endpoint),
            ProviderKind::OpenAI => format!("{}/chat/completions", self.endpoint),
        }
    }

    fn framing(&self) -> StreamFraming {
        match self.provider {
            ProviderKind::Ollama => StreamFraming::Ndjson,
            ProviderKind::OpenAI => StreamFraming::Sse,
        }
    }

    async fn send_completion(
        &self,
        history: &[Message],
        user_message: &str,
        model: Option<&str>,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let mut messages: Vec<WireMessage<'_>> = history
            .iter()
            .map(|m| WireMessage {
                role: &m.role,
                content: &m.content,
            })
            .collect();
        messages.push(WireMessage {
            role: crate::models::role::USER,
            content: user_message,
        });

        let body = CompletionRequest {
            model: model.unwrap_or(&self.default_model),
            messages,
            stream,
        };

        let url = self.chat_url();
        debug!(
            "Calling completion API: {} ({} history messages, stream={})",
            url,
            history.len(),
            stream
        );

        let mut request = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RagChatError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagChatError::Provider { status, body });
        }

        Ok(response)
    }

    /// Send the full history plus a new user turn as one non-streaming
    /// request and return the extracted reply text.
    ///
    /// # Errors
    /// - Network failures and non-2xx provider responses (fatal, no retry)
    pub async fn complete_once(
        &self,
        history: &[Message],
        user_message: &str,
        model: Option<&str>,
    ) -> Result<String> {
        let response = self
            .send_completion(history, user_message, model, false)
            .await?;

        let raw = response
            .text()
            .await
            .map_err(|e| RagChatError::Http(e.to_string()))?;

        Ok(extract_content(&raw))
    }

    /// Open a streaming request and return the incremental text deltas.
    ///
    /// The returned stream is finite and not restartable; each call opens a
    /// new upstream connection.
    ///
    /// # Errors
    /// - Network failures and non-2xx provider responses (fatal, no retry)
    pub async fn complete_stream(
        &self,
        history: &[Message],
        user_message: &str,
        model: Option<&str>,
    ) -> Result<StreamingResponse> {
        let response = self
            .send_completion(history, user_message, model, true)
            .await?;

        let bytes = Box::pin(response.bytes_stream());
        let decoder = DeltaDecoder::new(self.framing());
        let pending: VecDeque<String> = VecDeque::new();

        let stream = futures::stream::unfold(
            (bytes, decoder, pending, false),
            |(mut bytes, mut decoder, mut pending, mut finished)| async move {
                loop {
                    if let Some(delta) = pending.pop_front() {
                        return Some((Ok(delta), (bytes, decoder, pending, finished)));
                    }
                    if finished || decoder.is_done() {
                        return None;
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => pending.extend(decoder.feed(&chunk)),
                        Some(Err(e)) => {
                            finished = true;
                            return Some((
                                Err(RagChatError::Http(e.to_string())),
                                (bytes, decoder, pending, finished),
                            ));
                        }
                        None => {
                            pending.extend(decoder.finish());
                            finished = true;
                        }
                    }
                }
            },
        );

        Ok(StreamingResponse::new(Box::pin(stream)))
    }
}

/// Extract the reply text from a raw completion response body.
///
/// Fallback chain: `choices[0].message.content`, then `message.content`,
/// then `text`, then the raw body verbatim. Degrades gracefully instead of
/// failing on unknown response shapes.
fn extract_content(raw: &str) -> String {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(raw) else {
        return raw.to_string();
    };

    if let Some(content) = json
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
    {
        if !content.trim().is_empty() {
            return content.to_string();
        }
    }

    if let Some(content) = json.pointer("/message/content").and_then(|v| v.as_str()) {
        return content.to_string();
    }

    if let Some(text) = json.get("text").and_then(|v| v.as_str()) {
        return text.to_string();
    }

    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::body_partial_json;
    use wiremock::matchers::method;
    use wiremock::matchers::path;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;

    fn ollama_client(uri: &str) -> CompletionClient {
        CompletionClient::new(
            ProviderKind::Ollama,
            "llama3.2".to_string(),
            uri.to_string(),
            None,
        )
        .unwrap()
    }

    fn openai_client(uri: &str) -> CompletionClient {
        CompletionClient::new(
            ProviderKind::OpenAI,
            "gpt-4o-mini".to_string(),
            uri.to_string(),
            Some("sk-test".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_extract_openai_shape() {
        let raw = r#"{"choices":[{"message":{"content":"Hello!"}}]}"#;
        assert_eq!(extract_content(raw), "Hello!");
    }

    #[test]
    fn test_extract_ollama_shape() {
        let raw = r#"{"message":{"content":"Hi there"}}"#;
        assert_eq!(extract_content(raw), "Hi there");
    }

    #[test]
    fn test_extract_text_field() {
        let raw = r#"{"text":"plain"}"#;
        assert_eq!(extract_content(raw), "plain");
    }

    #[test]
    fn test_extract_unknown_shape_returns_raw() {
        let raw = r#"{"something":"else"}"#;
        assert_eq!(extract_content(raw), raw);
        assert_eq!(extract_content("not json"), "not json");
    }

    #[tokio::test]
    async fn test_complete_once_ollama() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(
                serde_json::json!({"model": "llama3.2", "stream": false}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"message": {"role": "assistant", "content": "Hello!"}}),
            ))
            .mount(&server)
            .await;

        let client = ollama_client(&server.uri());
        let answer = client.complete_once(&[], "Hi", None).await.unwrap();
        assert_eq!(answer, "Hello!");
    }

    #[tokio::test]
    async fn test_complete_once_model_override() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({"model": "m1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"message": {"role": "assistant", "content": "ok"}}),
            ))
            .mount(&server)
            .await;

        let client = ollama_client(&server.uri());
        let answer = client.complete_once(&[], "Hi", Some("m1")).await.unwrap();
        assert_eq!(answer, "ok");
    }

    #[tokio::test]
    async fn test_complete_once_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = ollama_client(&server.uri());
        let err = client.complete_once(&[], "Hi", None).await.unwrap_err();
        match err {
            RagChatError::Provider { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_complete_stream_sse() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
                    data: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let client = openai_client(&server.uri());
        let answer = client
            .complete_stream(&[], "Hi", None)
            .await
            .unwrap()
            .collect_all()
            .await
            .unwrap();
        assert_eq!(answer, "Hello");
    }

    #[tokio::test]
    async fn test_complete_stream_ndjson() {
        let server = MockServer::start().await;
        let body = "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n\
                    {\"message\":{\"content\":\"lo\"},\"done\":false}\n\
                    {\"message\":{\"content\":\"\"},\"done\":true}\n";
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"),
            )
            .mount(&server)
            .await;

        let client = ollama_client(&server.uri());
        let chunks: Vec<String> = client
            .complete_stream(&[], "Hi", None)
            .await
            .unwrap()
            .into_stream()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[tokio::test]
    async fn test_complete_stream_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = openai_client(&server.uri());
        let err = match client.complete_stream(&[], "Hi", None).await {
            Ok(_) => panic!("expected a provider error"),
            Err(err) => err,
        };
        assert!(matches!(err, RagChatError::Provider { status: 401, .. }));
    }
}
