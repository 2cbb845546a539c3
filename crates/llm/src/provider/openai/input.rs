use serde::Serialize;
use serde_json::Value;

use crate::{
    messages::{Message, Role},
    provider::{ProviderRequest, ToolChoice},
};

/// OpenAI chat completions request body.
#[derive(Debug, Serialize)]
pub(crate) struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    // Tool and user turns always carry content; assistant turns may be
    // pure tool calls with no text.
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAiToolCall {
    id: String,
    r#type: &'static str,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAiFunctionCall {
    name: String,
    /// OpenAI encodes tool arguments as a JSON string, not an object.
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    r#type: &'static str,
    function: OpenAiFunctionDef,
}

#[derive(Debug, Serialize)]
struct OpenAiFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

impl From<ProviderRequest> for OpenAiRequest {
    fn from(request: ProviderRequest) -> Self {
        let tools: Vec<OpenAiTool> = request
            .tools
            .into_iter()
            .map(|tool| OpenAiTool {
                r#type: "function",
                function: OpenAiFunctionDef {
                    name: tool.name,
                    description: tool.description,
                    parameters: tool.parameters,
                },
            })
            .collect();

        let tool_choice = if tools.is_empty() {
            None
        } else {
            request.tool_choice.map(|choice| match choice {
                ToolChoice::Auto => "auto",
                ToolChoice::Required => "required",
                ToolChoice::None => "none",
            })
        };

        Self {
            model: request.model,
            messages: request.messages.into_iter().map(OpenAiMessage::from).collect(),
            tools: (!tools.is_empty()).then_some(tools),
            tool_choice,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_response.then_some(ResponseFormat { r#type: "json_object" }),
            stream: request.stream,
            stream_options: request.stream.then_some(StreamOptions { include_usage: true }),
        }
    }
}

impl From<Message> for OpenAiMessage {
    fn from(message: Message) -> Self {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let tool_calls = message.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|call| OpenAiToolCall {
                    id: call.id,
                    r#type: "function",
                    function: OpenAiFunctionCall {
                        arguments: serde_json::to_string(&call.arguments).unwrap_or_else(|_| "{}".to_string()),
                        name: call.name,
                    },
                })
                .collect()
        });

        let content = if message.content.is_empty() && tool_calls.is_some() {
            None
        } else {
            Some(message.content)
        };

        Self {
            role,
            content,
            tool_calls,
            tool_call_id: message.tool_call_id,
            name: message.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{messages::ToolCall, provider::ToolDefinition};

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![
                Message::system("be brief"),
                Message::user("time in Tokyo?"),
                Message::assistant(
                    "",
                    Some(vec![ToolCall {
                        id: "t1".to_string(),
                        name: "get_time".to_string(),
                        arguments: json!({ "timezone": "Asia/Tokyo" }),
                    }]),
                ),
                Message::tool_reply("t1", "get_time", "2025-11-04T09:00:00+09:00"),
            ],
            tools: vec![ToolDefinition {
                name: "get_time".to_string(),
                description: "current time".to_string(),
                parameters: json!({ "type": "object" }),
            }],
            tool_choice: Some(ToolChoice::Auto),
            temperature: Some(0.2),
            max_tokens: 1024,
            json_response: false,
            stream: true,
        }
    }

    #[test]
    fn encodes_tool_calls_as_json_strings() {
        let wire = OpenAiRequest::from(request());
        let json = serde_json::to_value(&wire).unwrap();

        assert_eq!(json["messages"][2]["tool_calls"][0]["function"]["name"], "get_time");
        assert_eq!(
            json["messages"][2]["tool_calls"][0]["function"]["arguments"],
            r#"{"timezone":"Asia/Tokyo"}"#
        );
        // Pure tool-call turns drop the empty content field.
        assert!(json["messages"][2].get("content").is_none());
        assert_eq!(json["messages"][3]["role"], "tool");
        assert_eq!(json["messages"][3]["tool_call_id"], "t1");
    }

    #[test]
    fn streaming_requests_ask_for_usage() {
        let wire = OpenAiRequest::from(request());
        let json = serde_json::to_value(&wire).unwrap();

        assert_eq!(json["stream"], true);
        assert_eq!(json["stream_options"]["include_usage"], true);
        assert_eq!(json["tool_choice"], "auto");
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn json_mode_sets_response_format() {
        let mut neutral = request();
        neutral.json_response = true;
        neutral.tools.clear();
        neutral.tool_choice = None;

        let json = serde_json::to_value(OpenAiRequest::from(neutral)).unwrap();

        assert_eq!(json["response_format"]["type"], "json_object");
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
    }
}
