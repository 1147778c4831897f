//! Streaming chat-completion transport.
//!
//! The endpoint is a streaming messages API: the request carries the chat
//! history plus sampling parameters, the response is a server-sent-event
//! stream of `content_block_delta` events whose text deltas are concatenated
//! into the completion.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::LlmError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// One completion request; sampling defaults come from the gateway.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_tokens: u32,
}

/// Transport seam for the chat endpoint; injected so tests script responses.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// Render a chat history (and optionally the completion) as a readable
/// transcript for the prompt audit log.
pub fn transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role.as_str() {
                "user" => "Human",
                "assistant" => "Assistant",
                other => other,
            };
            format!("{role}: {}\n\n", m.content)
        })
        .collect()
}

/// reqwest-based implementation of [`LlmTransport`].
pub struct HttpLlm {
    http: reqwest::Client,
    endpoint: String,
    embeddings_endpoint: String,
    model: String,
    embeddings_model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

impl HttpLlm {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            embeddings_endpoint: config.embeddings_endpoint.clone(),
            model: config.model.clone(),
            embeddings_model: config.embeddings_model.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
        })
    }

    fn classify_status(status: u16, body: String) -> LlmError {
        let upper = body.to_uppercase();
        if status == 429 || upper.contains("THROTTLING") {
            LlmError::Throttled(body)
        } else if status == 503 || upper.contains("SERVICE UNAVAILABLE") {
            LlmError::ServiceUnavailable(body)
        } else if upper.contains("INPUT IS TOO LONG") {
            LlmError::InputTooLong(body)
        } else {
            LlmError::Endpoint { status, body }
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }
}

#[async_trait]
impl LlmTransport for HttpLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "top_k": request.top_k,
            "stream": true,
        });

        let response = self
            .authorized(self.http.post(&self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status.as_u16(), body));
        }

        let mut output = String::new();
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Transport(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            // SSE frames are newline-delimited; keep the trailing partial line.
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() || data == "[DONE]" {
                    continue;
                }
                if let Ok(event) = serde_json::from_str::<StreamEvent>(data) {
                    if event.kind == "content_block_delta" {
                        if let Some(text) = event.delta.and_then(|d| d.text) {
                            output.push_str(&text);
                        }
                    }
                }
            }
        }
        Ok(output)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = json!({
            "model": self.embeddings_model,
            "input": text,
        });
        let response = self
            .authorized(self.http.post(&self.embeddings_endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status.as_u16(), body));
        }
        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedOutput(e.to_string()))?;
        Ok(parsed.embedding)
    }
}
