//! Conversation model and the inbound chat request schema.
//!
//! The conversation follows the OpenAI-compatible message shape: a flat
//! list of role-tagged turns where assistant turns may carry tool calls
//! and tool turns answer exactly one of them by id. The orchestrator owns
//! the list append-only; events refer to messages by index, never by
//! shared pointers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Message sender role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the conversation.
    System,
    /// End-user input.
    User,
    /// Model output, possibly carrying tool calls.
    Assistant,
    /// A tool's reply to one assistant tool call.
    Tool,
}

/// One turn in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this turn.
    pub role: Role,
    /// Text content. Empty for pure tool-call assistant turns.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    /// Tool calls requested by an assistant turn, in call order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For tool turns: the id of the assistant tool call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool turns: the tool's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// An assistant message, with or without tool calls.
    pub fn assistant(content: impl Into<String>, tool_calls: Option<Vec<ToolCall>>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: tool_calls.filter(|calls| !calls.is_empty()),
            tool_call_id: None,
            name: None,
        }
    }

    /// A tool reply answering one assistant tool call.
    pub fn tool_reply(call_id: impl Into<String>, tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            name: Some(tool_name.into()),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// One tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique id within the request, echoed by the tool reply.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// Arguments object. Validated against the tool's input schema before
    /// dispatch.
    #[serde(default)]
    pub arguments: Value,
}

/// Optimization objective for model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Optimization {
    /// Lowest blended price wins.
    Cheap,
    /// Highest capability class wins, price ignored.
    Quality,
    /// Zero-priced models first, then cheap.
    Free,
    /// Capability weighed against price.
    #[default]
    Balanced,
}

/// Geographic context injected into the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Location {
    /// Latitude in degrees.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Longitude in degrees.
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Free-form address or place name.
    #[serde(default)]
    pub address: Option<String>,
}

/// Request-scoped provider credential override.
///
/// Forms a union with the environment pool; request-supplied entries rank
/// first in selector ordering for this request only.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestProvider {
    /// Provider type, matching a catalog provider key.
    #[serde(rename = "type")]
    pub provider_type: String,
    /// API key for this request.
    pub api_key: String,
    /// Optional base URL override.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Optional model restriction.
    #[serde(default)]
    pub allowed_models: Option<Vec<String>>,
}

/// The `/chat` (and `/planning`) request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChatRequest {
    /// Conversation so far. The last user turn is the one being answered.
    pub messages: Vec<Message>,
    /// Request-scoped provider credentials.
    #[serde(default)]
    pub providers: Vec<RequestProvider>,
    /// Selection objective.
    #[serde(default)]
    pub optimization: Optimization,
    /// Sampling temperature forwarded to the provider.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Completion token budget forwarded to the provider.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Whether to stream from the provider. The client-facing response is
    /// SSE either way.
    #[serde(default)]
    pub stream: Option<bool>,
    /// ISO 639-1 language the reply should be written in.
    #[serde(default)]
    pub language: Option<String>,
    /// Ask for dual `voiceResponse`/`fullResponse` JSON output.
    #[serde(default)]
    pub voice_mode: bool,
    /// Geographic context.
    #[serde(default)]
    pub location: Option<Location>,
    /// The conversation continues an earlier exchange.
    #[serde(default)]
    pub is_continuation: bool,
    /// Restrict the tool set to these registered tool names. `None` means
    /// every registered tool; an empty list disables tools.
    #[serde(default)]
    pub tools: Option<Vec<String>>,
}
