//! OpenAI-compatible chat-completions provider.
//!
//! Calls `POST {base}/chat/completions`. Covers OpenAI itself plus any
//! endpoint speaking the same wire format (Ollama's `/v1`, vLLM, llama.cpp
//! server). The bearer token is optional for local backends.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatMessage, LlmClient, LlmRequest, LlmResponse};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    completion_tokens: u32,
}

/// Client for OpenAI-compatible chat-completion endpoints.
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    label: String,
}

impl OpenAiCompatClient {
    /// `base_url` should include the version prefix, e.g.
    /// `https://api.openai.com/v1` or `http://localhost:11434/v1`.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_label(base_url, api_key, "openai-compatible")
    }

    pub fn with_label(
        base_url: impl Into<String>,
        api_key: Option<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            label: label.into(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        // System prompt travels as the first message in this wire format.
        let mut wire: Vec<WireMessage<'_>> = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system.as_deref() {
            wire.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        wire.extend(request.messages.iter().map(|m: &ChatMessage| WireMessage {
            role: &m.role,
            content: &m.content,
        }));

        let body = ChatRequest {
            model: &request.model,
            messages: wire,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };

        debug!(
            event = "llm.request",
            provider = %self.label,
            model = %request.model,
            messages = request.messages.len(),
        );

        let mut http = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} API error ({status}): {body}", self.label);
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();
        let tokens_generated = parsed
            .usage
            .map(|u| u.completion_tokens)
            .unwrap_or_else(|| super::estimate_tokens(&text));

        Ok(LlmResponse {
            text,
            tokens_generated,
        })
    }

    fn description(&self) -> String {
        format!("{} ({})", self.label, self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "42"}}],
            "usage": {"prompt_tokens": 7, "completion_tokens": 1}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "42");
        assert_eq!(parsed.usage.unwrap().completion_tokens, 1);
    }

    #[test]
    fn test_response_parsing_no_usage() {
        let json = r#"{"choices": [{"message": {"content": "hello there"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.usage.is_none());
    }

    #[test]
    fn test_request_serialization_has_stream_false() {
        let body = ChatRequest {
            model: "llama3.2",
            messages: vec![WireMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: 64,
            temperature: 0.7,
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_description_includes_base() {
        let client = OpenAiCompatClient::new("http://localhost:11434/v1/", None);
        assert_eq!(
            client.description(),
            "openai-compatible (http://localhost:11434/v1)"
        );
    }
}
