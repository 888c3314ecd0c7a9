//! LLM collaborator — abstraction over completion backends.
//!
//! The agent runtime only needs one call: a prompt-plus-history completion
//! returning text and a generated-token count. Providers (Anthropic,
//! OpenAI-compatible endpoints) implement [`LlmClient`]; a caller-supplied
//! function can stand in via [`FnLlmClient`], which is how remote
//! compute-node routing and test stubs plug in. The runtime treats all of
//! them uniformly.

pub mod anthropic;
pub mod openai;
pub mod router;

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiCompatClient;
pub use router::ProviderRouter;

/// One message of a conversation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// A completion request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A normalized completion response.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub tokens_generated: u32,
}

/// Abstraction over LLM backends.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a conversation to the backend and return the completion.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Human-readable description of the provider and model.
    fn description(&self) -> String;
}

type CompleteFn = dyn Fn(LlmRequest) -> Pin<Box<dyn Future<Output = Result<LlmResponse>> + Send>>
    + Send
    + Sync;

/// Adapter wrapping a caller-supplied async function as an [`LlmClient`].
///
/// Used for remote-node delegation and for deterministic test stubs.
pub struct FnLlmClient {
    func: Box<CompleteFn>,
    label: String,
}

impl FnLlmClient {
    pub fn new<F, Fut>(label: impl Into<String>, func: F) -> Self
    where
        F: Fn(LlmRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<LlmResponse>> + Send + 'static,
    {
        Self {
            func: Box::new(move |req| Box::pin(func(req))),
            label: label.into(),
        }
    }
}

#[async_trait]
impl LlmClient for FnLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        (self.func)(request.clone()).await
    }

    fn description(&self) -> String {
        format!("fn ({})", self.label)
    }
}

/// Rough token estimate used when a backend omits usage counts.
pub(crate) fn estimate_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time verification that `LlmClient` is object-safe.
    #[test]
    fn test_llm_client_is_object_safe() {
        fn _assert_object_safe(_: &dyn LlmClient) {}
    }

    #[tokio::test]
    async fn test_fn_client_passthrough() {
        let client = FnLlmClient::new("stub", |req: LlmRequest| async move {
            Ok(LlmResponse {
                text: format!("echo: {}", req.messages.last().map(|m| m.content.as_str()).unwrap_or("")),
                tokens_generated: 2,
            })
        });

        let response = client
            .complete(&LlmRequest {
                model: "stub".into(),
                system: None,
                messages: vec![ChatMessage::user("hi")],
                max_tokens: 16,
                temperature: 0.0,
            })
            .await
            .unwrap();

        assert_eq!(response.text, "echo: hi");
        assert_eq!(response.tokens_generated, 2);
        assert_eq!(client.description(), "fn (stub)");
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one two three"), 3);
    }
}
