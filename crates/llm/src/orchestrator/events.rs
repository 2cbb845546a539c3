//! Wire payloads for the client-facing SSE events.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::{error::ErrorKind, extract::ExtractedContent, provider::FinishReason};

/// Which kind of provider call a log record or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// A turn of the main agentic loop.
    ChatIteration,
    /// The comprehensiveness judgement call.
    SelfEvaluation,
    /// Input moderation.
    GuardrailInput,
    /// Output moderation.
    GuardrailOutput,
    /// The forced non-tool closing call.
    FinalSynthesis,
    /// Provider calls made on behalf of a tool.
    ToolAuxiliary,
}

/// One provider call as recorded in `providerCallsLog` and surfaced in
/// `message_complete.llmApiCalls`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCallRecord {
    /// What the call was for.
    pub phase: Phase,
    /// Provider type.
    pub provider: String,
    /// Model id.
    pub model: String,
    /// Iteration the call belonged to.
    pub iteration: u32,
    /// Prompt tokens billed, when the provider reported usage.
    pub prompt_tokens: u32,
    /// Completion tokens billed, when the provider reported usage.
    pub completion_tokens: u32,
    /// Wall-clock duration of the call.
    pub duration_ms: u64,
    /// Upstream HTTP status, when a response arrived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Error classification, when the call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

/// Sanitized request summary on `llm_request` events. Never includes
/// message bodies or credentials.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedRequest {
    /// Model id the call targets.
    pub model: String,
    /// How many conversation messages the call carries.
    pub message_count: usize,
    /// Names of the tools offered.
    pub tools: Vec<String>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Completion token budget.
    pub max_tokens: u32,
    /// Whether the upstream call streams.
    pub stream: bool,
}

/// `llm_request` payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequestEvent {
    /// Call classification.
    pub phase: Phase,
    /// Provider type.
    pub provider: String,
    /// Model id.
    pub model: String,
    /// Current iteration.
    pub iteration: u32,
    /// Sanitized request body.
    pub request: SanitizedRequest,
}

/// `llm_response` payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmResponseEvent {
    /// Call classification.
    pub phase: Phase,
    /// Provider type.
    pub provider: String,
    /// Model id.
    pub model: String,
    /// Current iteration.
    pub iteration: u32,
    /// Why generation stopped, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Upstream HTTP status, when a response arrived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Surfaced upstream headers (rate limit state, request id).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Wall-clock duration of the call.
    pub duration_ms: u64,
    /// Token usage, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageEvent>,
    /// Error classification, when the call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

/// Token usage on `llm_response`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    /// Prompt tokens billed.
    pub prompt_tokens: u32,
    /// Completion tokens billed.
    pub completion_tokens: u32,
}

/// `delta` payload.
#[derive(Debug, Serialize)]
pub struct DeltaEvent<'a> {
    /// The text fragment.
    pub text: &'a str,
}

/// `tool_call` payload.
#[derive(Debug, Serialize)]
pub struct ToolCallEvent<'a> {
    /// Call id.
    pub id: &'a str,
    /// Tool name.
    pub name: &'a str,
    /// Arguments object.
    pub arguments: &'a Value,
}

/// `tool_result` payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultEvent<'a> {
    /// Call id this result answers.
    pub id: &'a str,
    /// Tool name.
    pub name: &'a str,
    /// The reply fed to the model, possibly truncated.
    pub content_for_model: &'a str,
    /// Whether the result came from the cache.
    pub cached: bool,
    /// Classification when the result is synthetic or degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// `message_complete` payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCompleteEvent {
    /// The final answer.
    pub content: String,
    /// Every provider call made on behalf of this request.
    pub llm_api_calls: Vec<ProviderCallRecord>,
    /// Client-only artifact index distilled from tool outputs.
    pub extracted_content: ExtractedContent,
}

/// `error` payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    /// Error classification.
    pub kind: ErrorKind,
    /// HTTP-style status code for the failure class.
    pub code: u16,
    /// User-safe message.
    pub message: String,
    /// Correlation id for support and log lookup.
    pub correlation_id: String,
}

/// Map a tool-level failure class onto the wire taxonomy.
pub(crate) fn tool_error_kind(kind: tools::ToolErrorKind) -> ErrorKind {
    match kind {
        tools::ToolErrorKind::UnknownTool => ErrorKind::UnknownTool,
        tools::ToolErrorKind::InvalidArguments => ErrorKind::InvalidArguments,
        tools::ToolErrorKind::Timeout => ErrorKind::ToolTimeout,
        tools::ToolErrorKind::OutputTruncated => ErrorKind::ToolOutputTooLarge,
        tools::ToolErrorKind::Failed => ErrorKind::Internal,
    }
}
