//! Provider adapters.
//!
//! Every provider is reached over HTTP speaking an OpenAI-compatible chat
//! dialect; vendor quirks are expressed as thin wrappers over the common
//! adapter rather than separate wire implementations. An adapter returns a
//! stream of normalized [`ChatEvent`]s; the orchestrator consumes them one
//! at a time and owns termination.

pub(crate) mod gemini;
pub(crate) mod image;
pub(crate) mod openai;

use std::{pin::Pin, sync::Arc};

use async_trait::async_trait;
use catalog::ModelDescriptor;
use config::CredentialConfig;
use futures::Stream;
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::{LlmError, LlmResult},
    messages::Message,
    request::RequestContext,
};

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of the answer.
    Stop,
    /// The model wants tools executed.
    ToolCalls,
    /// The completion token budget ran out.
    Length,
}

/// Normalized streaming events every adapter emits.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Upstream response metadata, emitted once before any content.
    /// Headers are the transparency subset (rate limit state, request id).
    ResponseMeta {
        /// Upstream HTTP status.
        status: u16,
        /// Surfaced upstream headers, name/value.
        headers: Vec<(String, String)>,
    },
    /// A text fragment.
    Delta(String),
    /// A tool call fragment. Fragments with the same index belong to the
    /// same call and concatenate in arrival order.
    ToolCallDelta {
        /// Position of the call in the assistant turn.
        index: usize,
        /// Id fragment, usually complete in the first fragment.
        id: Option<String>,
        /// Name fragment, usually complete in the first fragment.
        name: Option<String>,
        /// Raw JSON fragment of the arguments object.
        arguments: String,
    },
    /// Final token accounting.
    Usage {
        /// Prompt tokens billed.
        prompt_tokens: u32,
        /// Completion tokens billed.
        completion_tokens: u32,
    },
    /// Terminal event of a successful response.
    Finish(FinishReason),
}

/// Stream of normalized events from one provider call.
pub type ChatEventStream = Pin<Box<dyn Stream<Item = LlmResult<ChatEvent>> + Send>>;

/// Tool definition offered to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    /// Registered tool name.
    pub name: String,
    /// Model-facing description.
    pub description: String,
    /// JSON Schema of the arguments.
    pub parameters: Value,
}

/// How the model may use the offered tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    /// Model decides.
    Auto,
    /// Model must call at least one tool.
    Required,
    /// Tools are visible but must not be called.
    None,
}

/// Vendor-neutral chat request an adapter translates to its dialect.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Model id as the provider knows it.
    pub model: String,
    /// Conversation to complete.
    pub messages: Vec<Message>,
    /// Tools offered for this call. Empty means no tools.
    pub tools: Vec<ToolDefinition>,
    /// Tool usage policy, when tools are offered.
    pub tool_choice: Option<ToolChoice>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Completion token budget.
    pub max_tokens: u32,
    /// Request a JSON object response.
    pub json_response: bool,
    /// Stream from the provider.
    pub stream: bool,
}

/// One upstream chat provider.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name for logs and events.
    fn name(&self) -> &str;

    /// Issue a chat call and return the normalized event stream.
    async fn chat(&self, request: ProviderRequest, context: &RequestContext) -> LlmResult<ChatEventStream>;
}

/// Creates adapters for (model, credential) pairs.
///
/// The orchestrator only ever sees this trait, so tests substitute a
/// scripted factory and drive the whole loop without any network.
pub trait ProviderFactory: Send + Sync {
    /// Build the adapter that serves this model with this credential.
    fn create(&self, model: &ModelDescriptor, credential: &CredentialConfig) -> LlmResult<Arc<dyn Provider>>;
}

/// Default factory: OpenAI-compatible HTTP adapters with per-vendor
/// wrappers where a dialect needs adjusting.
pub struct HttpProviderFactory {
    http: reqwest::Client,
}

impl HttpProviderFactory {
    /// Build the factory over a shared HTTP client.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

/// Known OpenAI-compatible endpoints by provider type.
pub(crate) fn default_base_url(provider_type: &str) -> Option<&'static str> {
    match provider_type {
        "openai" => Some("https://api.openai.com/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "gemini" => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
        "mistral" => Some("https://api.mistral.ai/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "together" => Some("https://api.together.xyz/v1"),
        "deepseek" => Some("https://api.deepseek.com/v1"),
        _ => None,
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn create(&self, model: &ModelDescriptor, credential: &CredentialConfig) -> LlmResult<Arc<dyn Provider>> {
        let base_url = credential
            .base_url
            .clone()
            .or_else(|| default_base_url(&model.provider_type).map(String::from))
            .ok_or_else(|| {
                LlmError::InvalidRequest(format!(
                    "Provider '{}' has no known endpoint and the credential sets no base_url",
                    model.provider_type
                ))
            })?;

        let inner = openai::OpenAiCompatProvider::new(
            model.provider_type.clone(),
            base_url,
            credential.api_key.clone(),
            self.http.clone(),
        );

        if model.provider_type == "gemini" {
            return Ok(Arc::new(gemini::GeminiProvider::new(inner)));
        }

        Ok(Arc::new(inner))
    }
}
