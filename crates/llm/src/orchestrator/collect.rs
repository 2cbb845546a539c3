//! Consume one provider event stream into a completed assistant turn.

use std::collections::BTreeMap;

use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{LlmError, LlmResult},
    messages::ToolCall,
    orchestrator::events::DeltaEvent,
    provider::{ChatEvent, ChatEventStream, FinishReason},
    sse::EventSender,
};

/// One fully assembled provider response.
#[derive(Debug)]
pub(crate) struct StreamedCompletion {
    /// Accumulated text content.
    pub content: String,
    /// Assembled tool calls, in index order.
    pub tool_calls: Vec<ToolCall>,
    /// Why generation stopped.
    pub finish: FinishReason,
    /// (prompt, completion) tokens when the provider reported usage.
    pub usage: Option<(u32, u32)>,
    /// Upstream HTTP status.
    pub status: Option<u16>,
    /// Surfaced upstream headers.
    pub headers: BTreeMap<String, String>,
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Drain the stream, forwarding text deltas to the client as they arrive.
///
/// `forward_deltas` is `None` for auxiliary calls (guardrails,
/// self-evaluation) whose text must not reach the client stream.
pub(crate) async fn collect_stream(
    mut stream: ChatEventStream,
    forward_deltas: Option<&EventSender>,
    cancel: &CancellationToken,
) -> LlmResult<StreamedCompletion> {
    let mut content = String::new();
    let mut partial_calls: BTreeMap<usize, PartialToolCall> = BTreeMap::new();
    let mut finish: Option<FinishReason> = None;
    let mut usage = None;
    let mut status = None;
    let mut headers = BTreeMap::new();

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => return Err(LlmError::ClientCanceled),
            item = stream.next() => item,
        };

        let Some(item) = item else { break };

        match item? {
            ChatEvent::ResponseMeta {
                status: meta_status,
                headers: meta_headers,
            } => {
                status = Some(meta_status);
                headers.extend(meta_headers);
            }
            ChatEvent::Delta(text) => {
                if let Some(events) = forward_deltas
                    && events.send("delta", &DeltaEvent { text: &text }).await.is_err()
                {
                    return Err(LlmError::ClientCanceled);
                }

                content.push_str(&text);
            }
            ChatEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => {
                let partial = partial_calls.entry(index).or_default();

                if let Some(id) = id {
                    partial.id.push_str(&id);
                }
                if let Some(name) = name {
                    partial.name.push_str(&name);
                }
                partial.arguments.push_str(&arguments);
            }
            ChatEvent::Usage {
                prompt_tokens,
                completion_tokens,
            } => {
                usage = Some((prompt_tokens, completion_tokens));
            }
            ChatEvent::Finish(reason) => {
                finish = Some(reason);
            }
        }
    }

    let tool_calls: Vec<ToolCall> = partial_calls
        .into_iter()
        .map(|(index, partial)| {
            let arguments = parse_arguments(&partial.arguments);

            ToolCall {
                id: if partial.id.is_empty() {
                    format!("call_{index}")
                } else {
                    partial.id
                },
                name: partial.name,
                arguments,
            }
        })
        .collect();

    let finish = match finish {
        Some(reason) => reason,
        // A stream that just stops is tolerable when it produced an
        // answer; silence with nothing in hand is a protocol violation.
        None if !content.is_empty() => {
            log::warn!("Provider stream ended without a finish reason, assuming stop");
            FinishReason::Stop
        }
        None if !tool_calls.is_empty() => FinishReason::ToolCalls,
        None => return Err(LlmError::Protocol("stream ended without content or finish".to_string())),
    };

    Ok(StreamedCompletion {
        content,
        tool_calls,
        finish,
        usage,
        status,
        headers,
    })
}

/// Parse the assembled arguments fragment. An empty fragment is an empty
/// object; garbage stays unparsed and fails schema validation later with
/// a message the model can react to.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }

    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Tool call arguments are not valid JSON: {e}");
            Value::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    fn ok_stream(events: Vec<ChatEvent>) -> ChatEventStream {
        Box::pin(stream::iter(events.into_iter().map(Ok)))
    }

    #[tokio::test]
    async fn assembles_fragmented_tool_calls_in_index_order() {
        let events = ok_stream(vec![
            ChatEvent::ResponseMeta {
                status: 200,
                headers: vec![("x-request-id".to_string(), "req-9".to_string())],
            },
            ChatEvent::ToolCallDelta {
                index: 1,
                id: Some("s2".to_string()),
                name: Some("search".to_string()),
                arguments: "{\"q\":".to_string(),
            },
            ChatEvent::ToolCallDelta {
                index: 0,
                id: Some("s1".to_string()),
                name: Some("search".to_string()),
                arguments: "{\"q\":\"A\"}".to_string(),
            },
            ChatEvent::ToolCallDelta {
                index: 1,
                id: None,
                name: None,
                arguments: "\"B\"}".to_string(),
            },
            ChatEvent::Finish(FinishReason::ToolCalls),
        ]);

        let cancel = CancellationToken::new();
        let completion = collect_stream(events, None, &cancel).await.unwrap();

        assert_eq!(completion.finish, FinishReason::ToolCalls);
        assert_eq!(completion.tool_calls.len(), 2);
        assert_eq!(completion.tool_calls[0].id, "s1");
        assert_eq!(completion.tool_calls[1].id, "s2");
        assert_eq!(completion.tool_calls[1].arguments["q"], "B");
        assert_eq!(completion.status, Some(200));
        assert_eq!(completion.headers.get("x-request-id").map(String::as_str), Some("req-9"));
    }

    #[tokio::test]
    async fn concatenates_deltas() {
        let events = ok_stream(vec![
            ChatEvent::Delta("It is ".to_string()),
            ChatEvent::Delta("09:00 in Tokyo.".to_string()),
            ChatEvent::Usage {
                prompt_tokens: 10,
                completion_tokens: 6,
            },
            ChatEvent::Finish(FinishReason::Stop),
        ]);

        let cancel = CancellationToken::new();
        let completion = collect_stream(events, None, &cancel).await.unwrap();

        assert_eq!(completion.content, "It is 09:00 in Tokyo.");
        assert_eq!(completion.usage, Some((10, 6)));
    }

    #[tokio::test]
    async fn mid_stream_error_propagates() {
        let events: ChatEventStream = Box::pin(stream::iter(vec![
            Ok(ChatEvent::Delta("partial".to_string())),
            Err(LlmError::Upstream5xx {
                status: 502,
                message: "upstream died".to_string(),
            }),
        ]));

        let cancel = CancellationToken::new();
        let error = collect_stream(events, None, &cancel).await.unwrap_err();

        assert!(matches!(error, LlmError::Upstream5xx { .. }));
    }

    #[tokio::test]
    async fn empty_stream_is_a_protocol_error() {
        let cancel = CancellationToken::new();
        let error = collect_stream(ok_stream(vec![]), None, &cancel).await.unwrap_err();

        assert!(matches!(error, LlmError::Protocol(_)));
    }

    #[tokio::test]
    async fn missing_finish_with_content_is_stop() {
        let events = ok_stream(vec![ChatEvent::Delta("hello".to_string())]);
        let cancel = CancellationToken::new();

        let completion = collect_stream(events, None, &cancel).await.unwrap();
        assert_eq!(completion.finish, FinishReason::Stop);
    }

    #[tokio::test]
    async fn broken_argument_json_becomes_null() {
        let events = ok_stream(vec![
            ChatEvent::ToolCallDelta {
                index: 0,
                id: Some("t1".to_string()),
                name: Some("search".to_string()),
                arguments: "{broken".to_string(),
            },
            ChatEvent::Finish(FinishReason::ToolCalls),
        ]);

        let cancel = CancellationToken::new();
        let completion = collect_stream(events, None, &cancel).await.unwrap();

        assert_eq!(completion.tool_calls[0].arguments, Value::Null);
    }
}
