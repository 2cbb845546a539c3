//! Tool registry and executor.
//!
//! Tools are schema-validated, budgeted side effects the model can invoke
//! during the agentic loop. The executor owns the full dispatch pipeline:
//! lookup, argument validation, cache consult, deadline enforcement,
//! output truncation and concurrent fan-out. Every failure mode in here is
//! recovered locally into a synthetic tool reply — a misbehaving tool can
//! never fail the enclosing request.

mod artifacts;
mod descriptor;
mod executor;
mod html;
mod registry;

pub mod builtin;

use serde_json::Value;

pub use artifacts::{Artifacts, Source};
pub use descriptor::{OutputKind, ToolDescriptor};
pub use executor::{ToolExecutor, ToolResult};
pub use registry::ToolRegistry;

/// Outcome classification attached to a synthetic tool reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    /// The model asked for a tool that is not registered.
    UnknownTool,
    /// The arguments did not validate against the tool's input schema.
    InvalidArguments,
    /// The wall-clock budget ran out.
    Timeout,
    /// The output exceeded the byte budget and was truncated.
    OutputTruncated,
    /// The tool itself reported a failure.
    Failed,
}

/// What a tool implementation returns on success.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Text fed back to the model as the tool reply.
    pub content: String,
    /// Extracted artifacts surfaced to the client, never to the model.
    pub artifacts: Option<Artifacts>,
}

impl ToolOutput {
    /// A plain text output with no artifacts.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            artifacts: None,
        }
    }
}

/// A failure a tool reports about its own execution. The message is shown
/// to the model verbatim so it can react.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ToolError {
    /// Model-visible description of what went wrong.
    pub message: String,
}

impl ToolError {
    /// Build a failure from anything displayable.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Shared context passed to every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    /// Pooled HTTP client for outbound tool calls.
    pub http: reqwest::Client,
    /// Cancelled when the client disconnects or the request deadline
    /// passes. Tools doing multi-step work should check it between steps.
    pub cancel: tokio_util::sync::CancellationToken,
}

impl ToolContext {
    /// Context with a fresh client and an unarmed cancellation token.
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            cancel: tokio_util::sync::CancellationToken::new(),
        }
    }
}

/// One callable tool.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Static description: name, schema, budgets, cacheability.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Run the tool. Arguments have already been validated against the
    /// descriptor's input schema.
    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError>;
}
