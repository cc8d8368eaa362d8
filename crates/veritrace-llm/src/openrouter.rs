/// OpenRouter-compatible chat-completions backend.
///
/// One HTTP client serves every registered provider id; the id is mapped
/// to an OpenRouter model route, falling through to the caller's model
/// string for routes that are not pre-mapped.

use crate::provider::{GenerationReply, LlmError, LlmProvider, ProviderRegistry};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_TEMPERATURE: f64 = 0.2;
const DEFAULT_MAX_TOKENS: u64 = 200;

/// Provider-id → OpenRouter model route for the low-cost deployment set.
pub const MODEL_ROUTES: &[(&str, &str)] = &[
    ("openai", "openai/gpt-5-mini"),
    ("grok", "meta-llama/llama-3.3-70b-instruct:free"),
    ("claude", "anthropic/claude-3.7-sonnet"),
    ("gemini", "google/gemini-2.5-flash-lite"),
    ("deepseek", "deepseek/deepseek-chat-v3.1:free"),
];

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Default)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    /// Some routed models put their reply here and leave `content` empty.
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    routes: HashMap<String, String>,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        Self::with_base_url(api_key, OPENROUTER_BASE_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
            routes: MODEL_ROUTES
                .iter()
                .map(|(provider, route)| (provider.to_string(), route.to_string()))
                .collect(),
        })
    }
}

/// Registry with the canonical provider set, every id backed by one shared
/// OpenRouter client.
pub fn default_registry(api_key: &str) -> Result<ProviderRegistry, LlmError> {
    let client: Arc<dyn LlmProvider> = Arc::new(OpenRouterClient::new(api_key)?);
    let mut registry = ProviderRegistry::new();
    for (provider, _route) in MODEL_ROUTES {
        registry.register(*provider, Arc::clone(&client));
    }
    Ok(registry)
}

impl OpenRouterClient {
    fn route_for(&self, provider: &str, model: &str) -> String {
        match self.routes.get(provider) {
            Some(route) => route.clone(),
            None => {
                warn!("no openrouter route for provider {provider}, using model id verbatim");
                model.to_string()
            }
        }
    }
}

/// Pull the reply text out of a chat response, tolerating the
/// content/reasoning split.
fn extract_content(response: ChatResponse) -> Result<String, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(LlmError::MalformedResponse)?;
    let message = choice.message;
    match message.content {
        Some(content) if !content.is_empty() => Ok(content),
        _ => Ok(message.reasoning.unwrap_or_default()),
    }
}

fn sampling_parameters(parameters: &Map<String, Value>) -> (f64, u64) {
    let temperature = parameters
        .get("temperature")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_TEMPERATURE);
    let max_tokens = parameters
        .get("max_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_MAX_TOKENS);
    (temperature, max_tokens)
}

#[async_trait]
impl LlmProvider for OpenRouterClient {
    async fn generate(
        &self,
        provider: &str,
        model: &str,
        prompt: &str,
        parameters: &Map<String, Value>,
    ) -> Result<GenerationReply, LlmError> {
        let route = self.route_for(provider, model);
        let (temperature, max_tokens) = sampling_parameters(parameters);
        let body = ChatRequest {
            model: &route,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            max_tokens,
        };

        debug!("openrouter call provider={provider} route={route}");
        let started = Instant::now();
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", "https://veritrace.dev")
            .header("X-Title", "Veritrace Gateway")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or(text);
            return Err(LlmError::Endpoint {
                status: status.as_u16(),
                detail,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        let content = extract_content(parsed)?;

        Ok(GenerationReply {
            content,
            model: route,
            latency: started.elapsed(),
        })
    }
}
