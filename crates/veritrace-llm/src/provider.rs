/// Generator adapter seam.
///
/// The pipeline treats generation as an opaque call: one trait method, one
/// registry keyed by provider id. Unknown ids fail fast instead of being
/// guessed at.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("unknown llm provider: {0}")]
    UnknownProvider(String),
    #[error("llm endpoint returned status {status}: {detail}")]
    Endpoint { status: u16, detail: String },
    #[error("llm response carried no choices")]
    MalformedResponse,
    #[error("llm request failed: {0}")]
    Transport(String),
}

/// One completed generation call.
#[derive(Debug, Clone)]
pub struct GenerationReply {
    pub content: String,
    /// The model the backend actually routed to.
    pub model: String,
    pub latency: Duration,
}

/// Uniform call shape over heterogeneous providers. `provider` is the
/// registry key the call was dispatched under, so multi-tenant backends
/// (e.g. an aggregator) can route on it.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(
        &self,
        provider: &str,
        model: &str,
        prompt: &str,
        parameters: &Map<String, Value>,
    ) -> Result<GenerationReply, LlmError>;
}

/// Provider-id → backend dispatch table. Built once at startup, read-only
/// afterwards.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider_id: impl Into<String>, backend: Arc<dyn LlmProvider>) {
        self.providers.insert(provider_id.into(), backend);
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort();
        ids
    }

    pub async fn generate(
        &self,
        provider: &str,
        model: &str,
        prompt: &str,
        parameters: &Map<String, Value>,
    ) -> Result<GenerationReply, LlmError> {
        let backend = self
            .providers
            .get(provider)
            .ok_or_else(|| LlmError::UnknownProvider(provider.to_string()))?;
        backend.generate(provider, model, prompt, parameters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl LlmProvider for Echo {
        async fn generate(
            &self,
            provider: &str,
            model: &str,
            prompt: &str,
            _parameters: &Map<String, Value>,
        ) -> Result<GenerationReply, LlmError> {
            Ok(GenerationReply {
                content: format!("{provider}:{model}:{prompt}"),
                model: model.to_string(),
                latency: Duration::from_millis(1),
            })
        }
    }

    #[tokio::test]
    async fn dispatches_by_provider_id() {
        let mut registry = ProviderRegistry::new();
        registry.register("echo", Arc::new(Echo));

        let reply = registry
            .generate("echo", "m", "hi", &Map::new())
            .await
            .unwrap();
        assert_eq!(reply.content, "echo:m:hi");
    }

    #[tokio::test]
    async fn unknown_provider_fails_fast() {
        let registry = ProviderRegistry::new();
        let err = registry
            .generate("nope", "m", "hi", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::UnknownProvider(p) if p == "nope"));
    }
}
