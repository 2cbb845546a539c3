use serde::Deserialize;

/// Settings for the agentic chat loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    /// Hard cap on tool iterations per request. Overridden by
    /// `MAX_TOOL_ITERATIONS`.
    pub max_tool_iterations: u32,
    /// Iteration at which pending tool calls are stripped and a final
    /// synthesis is forced. Overridden by `SAFETY_ITERATION`.
    pub safety_iteration: u32,
    /// Wall-clock deadline for a whole request. Overridden by
    /// `REQUEST_DEADLINE_SECONDS`.
    pub request_deadline_seconds: u64,
    /// Maximum concurrent tool executions within one iteration. Overridden
    /// by `TOOL_FANOUT`.
    pub tool_fanout: usize,
    /// Minimum character count for assistant text to count as a real
    /// answer rather than plumbing.
    pub substantive_length: usize,
    /// Whether to judge candidate final answers with a cheap follow-up
    /// call before finishing.
    pub self_evaluation: bool,
    /// How many extra iterations self-evaluation may grant.
    pub self_evaluation_retries: u32,
    /// Default completion token budget when the request does not set one.
    pub max_tokens: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: 10,
            safety_iteration: 8,
            request_deadline_seconds: 600,
            tool_fanout: 4,
            substantive_length: 200,
            self_evaluation: false,
            self_evaluation_retries: 1,
            max_tokens: 4096,
        }
    }
}
