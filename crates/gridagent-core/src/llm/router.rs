//! Multi-provider selection by explicit choice or model-name heuristics.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::{LlmClient, LlmRequest, LlmResponse};

/// Routes each request to one of the configured providers.
///
/// Selection order: the explicit provider (when the caller names one),
/// otherwise a model-name heuristic (`claude*` → "anthropic"), otherwise
/// the configured default provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn LlmClient>>,
    default_provider: String,
    explicit: Option<String>,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
            explicit: None,
        }
    }

    /// Register a provider under a name (builder pattern).
    pub fn with_provider(mut self, name: impl Into<String>, client: Arc<dyn LlmClient>) -> Self {
        self.providers.insert(name.into().to_lowercase(), client);
        self
    }

    /// Force all requests to one provider, bypassing heuristics.
    pub fn with_explicit(mut self, name: Option<String>) -> Self {
        self.explicit = name.map(|n| n.to_lowercase());
        self
    }

    /// Look up a configured provider by name.
    pub fn provider(&self, name: &str) -> Option<Arc<dyn LlmClient>> {
        self.providers.get(&name.to_lowercase()).cloned()
    }

    fn provider_for(&self, model: &str) -> &str {
        if let Some(name) = &self.explicit {
            return name;
        }
        let model = model.to_lowercase();
        if model.starts_with("claude") {
            "anthropic"
        } else {
            &self.default_provider
        }
    }

    fn resolve(&self, model: &str) -> Result<&Arc<dyn LlmClient>> {
        let name = self.provider_for(model);
        self.providers.get(name).ok_or_else(|| {
            anyhow::anyhow!(
                "no provider configured for '{name}' (configured: {})",
                self.providers
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
    }
}

#[async_trait]
impl LlmClient for ProviderRouter {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.resolve(&request.model)?.complete(request).await
    }

    fn description(&self) -> String {
        format!(
            "router (default: {}, providers: {})",
            self.default_provider,
            self.providers.len()
        )
    }
}
