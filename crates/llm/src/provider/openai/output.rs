use serde::Deserialize;

use crate::provider::{ChatEvent, FinishReason};

/// Non-streaming chat completions response.
#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiResponse {
    #[serde(default)]
    pub(crate) choices: Vec<OpenAiChoice>,
    #[serde(default)]
    pub(crate) usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiChoice {
    pub(crate) message: OpenAiResponseMessage,
    #[serde(default)]
    pub(crate) finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OpenAiResponseMessage {
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) tool_calls: Option<Vec<OpenAiResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiResponseToolCall {
    #[serde(default)]
    pub(crate) id: Option<String>,
    pub(crate) function: OpenAiResponseFunction,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiResponseFunction {
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiUsage {
    #[serde(default)]
    pub(crate) prompt_tokens: u32,
    #[serde(default)]
    pub(crate) completion_tokens: u32,
}

/// Streaming chunk.
#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OpenAiFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

pub(crate) fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "length" => FinishReason::Length,
        "stop" | "content_filter" => FinishReason::Stop,
        other => {
            log::warn!("Unknown finish_reason '{other}', treating as stop");
            FinishReason::Stop
        }
    }
}

impl OpenAiStreamChunk {
    /// Normalize one chunk into zero or more events.
    pub(crate) fn into_events(self) -> Vec<ChatEvent> {
        let mut events = Vec::new();

        for choice in self.choices {
            if let Some(content) = choice.delta.content
                && !content.is_empty()
            {
                events.push(ChatEvent::Delta(content));
            }

            for call in choice.delta.tool_calls.unwrap_or_default() {
                let function = call.function.unwrap_or_default();

                events.push(ChatEvent::ToolCallDelta {
                    index: call.index,
                    id: call.id,
                    name: function.name,
                    arguments: function.arguments.unwrap_or_default(),
                });
            }

            if let Some(reason) = choice.finish_reason.as_deref() {
                events.push(ChatEvent::Finish(map_finish_reason(reason)));
            }
        }

        if let Some(usage) = self.usage {
            events.push(ChatEvent::Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            });
        }

        events
    }
}

impl OpenAiResponse {
    /// Normalize a non-streaming response into the same event shape the
    /// streaming path produces: content, tool calls, usage, finish.
    pub(crate) fn into_events(self) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        let mut finish = FinishReason::Stop;

        for choice in self.choices {
            if let Some(content) = choice.message.content
                && !content.is_empty()
            {
                events.push(ChatEvent::Delta(content));
            }

            for (index, call) in choice.message.tool_calls.unwrap_or_default().into_iter().enumerate() {
                events.push(ChatEvent::ToolCallDelta {
                    index,
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments.unwrap_or_default(),
                });
            }

            if let Some(reason) = choice.finish_reason.as_deref() {
                finish = map_finish_reason(reason);
            }
        }

        if let Some(usage) = self.usage {
            events.push(ChatEvent::Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            });
        }

        events.push(ChatEvent::Finish(finish));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_with_tool_call_fragments() {
        let chunk: OpenAiStreamChunk = serde_json::from_str(
            r#"{
                "choices": [{
                    "delta": {
                        "tool_calls": [{
                            "index": 0,
                            "id": "call_abc",
                            "function": { "name": "get_time", "arguments": "{\"timez" }
                        }]
                    },
                    "finish_reason": null
                }]
            }"#,
        )
        .unwrap();

        let events = chunk.into_events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            ChatEvent::ToolCallDelta {
                index: 0,
                id: Some("call_abc".to_string()),
                name: Some("get_time".to_string()),
                arguments: "{\"timez".to_string(),
            }
        );
    }

    #[test]
    fn final_chunk_with_usage() {
        let chunk: OpenAiStreamChunk = serde_json::from_str(
            r#"{
                "choices": [{ "delta": {}, "finish_reason": "stop" }],
                "usage": { "prompt_tokens": 12, "completion_tokens": 34 }
            }"#,
        )
        .unwrap();

        let events = chunk.into_events();
        assert_eq!(
            events,
            vec![
                ChatEvent::Finish(FinishReason::Stop),
                ChatEvent::Usage {
                    prompt_tokens: 12,
                    completion_tokens: 34
                },
            ]
        );
    }

    #[test]
    fn non_streaming_response_normalizes_to_events() {
        let response: OpenAiResponse = serde_json::from_str(
            r#"{
                "choices": [{
                    "message": { "content": "It is 09:00 in Tokyo." },
                    "finish_reason": "stop"
                }],
                "usage": { "prompt_tokens": 20, "completion_tokens": 8 }
            }"#,
        )
        .unwrap();

        let events = response.into_events();
        assert_eq!(
            events,
            vec![
                ChatEvent::Delta("It is 09:00 in Tokyo.".to_string()),
                ChatEvent::Usage {
                    prompt_tokens: 20,
                    completion_tokens: 8
                },
                ChatEvent::Finish(FinishReason::Stop),
            ]
        );
    }
}
