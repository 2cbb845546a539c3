//! End-to-end loop tests against scripted providers and tools.
//!
//! The factory hands out providers that replay a prepared sequence of
//! turns, so every path through the loop — tool rounds, fallback, safety
//! cutoff, guardrails — runs without any network.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use catalog::{Catalog, CatalogDocument, ModelDescriptor};
use config::{AllowedModels, Capability, ChatConfig, CredentialConfig, GuardrailMode};
use futures::StreamExt;
use rate_limit::{BreakerState, CircuitBreaker, RateTracker};
use secrecy::SecretString;
use serde_json::{Value, json};
use tools::{
    OutputKind, Tool, ToolContext, ToolDescriptor, ToolError, ToolExecutor, ToolOutput, ToolRegistry,
};

use super::{Orchestrator, prompts::RunMode};
use crate::{
    error::{LlmError, LlmResult},
    messages::{ChatRequest, Message, Role},
    provider::{ChatEvent, ChatEventStream, FinishReason, Provider, ProviderFactory, ProviderRequest},
    request::RequestContext,
    sse::{self, SseFrame},
};

const CATALOG: &str = r#"{
  "chat": {
    "providers": {
      "alpha": {
        "models": {
          "alpha-chat": {
            "category": "medium",
            "contextWindow": 128000,
            "supportsTools": true,
            "supportsJsonMode": true,
            "pricing": { "inputPer1M": 0.1, "outputPer1M": 0.4 }
          }
        }
      },
      "beta": {
        "models": {
          "beta-chat": {
            "category": "medium",
            "contextWindow": 128000,
            "supportsTools": true,
            "supportsJsonMode": true,
            "pricing": { "inputPer1M": 0.5, "outputPer1M": 2.0 }
          }
        }
      }
    }
  }
}"#;

/// One scripted provider response.
enum Turn {
    /// `chat()` succeeds and the stream yields these events.
    Events(Vec<ChatEvent>),
    /// `chat()` itself fails.
    Error(LlmError),
}

#[derive(Debug, Clone)]
struct RecordedCall {
    provider: String,
    model: String,
    messages: Vec<Message>,
    tool_names: Vec<String>,
}

#[derive(Default)]
struct Script {
    turns: Mutex<VecDeque<Turn>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Script {
    fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

struct ScriptedFactory {
    script: Arc<Script>,
}

impl ProviderFactory for ScriptedFactory {
    fn create(&self, model: &ModelDescriptor, _credential: &CredentialConfig) -> LlmResult<Arc<dyn Provider>> {
        Ok(Arc::new(ScriptedProvider {
            provider: model.provider_type.clone(),
            model: model.model_id.clone(),
            script: self.script.clone(),
        }))
    }
}

struct ScriptedProvider {
    provider: String,
    model: String,
    script: Arc<Script>,
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn chat(&self, request: ProviderRequest, _context: &RequestContext) -> LlmResult<ChatEventStream> {
        self.script
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                provider: self.provider.clone(),
                model: self.model.clone(),
                messages: request.messages.clone(),
                tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
            });

        let turn = self
            .script
            .turns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| {
                Turn::Events(vec![
                    ChatEvent::Delta("script exhausted".to_string()),
                    ChatEvent::Finish(FinishReason::Stop),
                ])
            });

        match turn {
            Turn::Events(events) => Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok)))),
            Turn::Error(error) => Err(error),
        }
    }
}

/// A tool that replies with fixed text, optionally delayed per query.
struct FixedTool {
    descriptor: ToolDescriptor,
    reply: String,
    delays_ms: Vec<(String, u64)>,
    invocations: Arc<AtomicUsize>,
}

impl FixedTool {
    fn new(name: &str, reply: &str) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: name.to_string(),
                description: format!("test tool {name}"),
                input_schema: json!({ "type": "object" }),
                output_kind: OutputKind::Text,
                max_execution_ms: 5_000,
                max_output_bytes: 10_000,
                cacheable: false,
                cache_ttl_seconds: 60,
                idempotency_key_fields: vec!["url".to_string(), "q".to_string()],
            },
            reply: reply.to_string(),
            delays_ms: Vec::new(),
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn cacheable(mut self) -> Self {
        self.descriptor.cacheable = true;
        self
    }

    fn delay_for(mut self, query: &str, delay_ms: u64) -> Self {
        self.delays_ms.push((query.to_string(), delay_ms));
        self
    }
}

#[async_trait]
impl Tool for FixedTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, arguments: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let query = arguments.get("q").and_then(Value::as_str).unwrap_or_default();

        if let Some((_, delay)) = self.delays_ms.iter().find(|(q, _)| q == query) {
            tokio::time::sleep(Duration::from_millis(*delay)).await;
        }

        Ok(ToolOutput::text(format!("{} {query}", self.reply).trim().to_string()))
    }
}

struct Harness {
    orchestrator: Orchestrator,
    script: Arc<Script>,
    breaker: Arc<CircuitBreaker>,
    _cache_dir: tempfile::TempDir,
}

fn credential(provider: &str) -> CredentialConfig {
    CredentialConfig {
        provider_type: provider.to_string(),
        api_key: SecretString::from("test"),
        base_url: None,
        allowed_models: AllowedModels::All,
        capabilities: vec![Capability::Chat],
    }
}

fn harness(turns: Vec<Turn>, chat_config: ChatConfig, guardrail_mode: GuardrailMode, tools: Vec<FixedTool>) -> Harness {
    let document: CatalogDocument = serde_json::from_str(CATALOG).unwrap();
    let catalog = Arc::new(Catalog::from_document(
        document,
        vec![credential("alpha"), credential("beta")],
    ));

    let cache_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(cache::ContentCache::new(cache_dir.path().join("cache"), 1 << 20).unwrap());

    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(Arc::new(tool));
    }

    let executor = ToolExecutor::new(registry, cache, 4, Default::default());

    let script = Arc::new(Script {
        turns: Mutex::new(turns.into()),
        calls: Mutex::new(Vec::new()),
    });

    let breaker = Arc::new(CircuitBreaker::default());

    let orchestrator = Orchestrator {
        catalog,
        breaker: breaker.clone(),
        tracker: Arc::new(RateTracker::new()),
        executor,
        providers: Arc::new(ScriptedFactory { script: script.clone() }),
        chat_config,
        guardrail_mode,
        http: reqwest::Client::new(),
        mode: RunMode::Chat,
    };

    Harness {
        orchestrator,
        script,
        breaker,
        _cache_dir: cache_dir,
    }
}

fn chat_request(body: Value) -> ChatRequest {
    serde_json::from_value(body).unwrap()
}

async fn run(harness: &Harness, request: ChatRequest) -> Vec<SseFrame> {
    let ctx = RequestContext::new(Some("user-1".to_string()));
    let (sender, stream) = sse::channel();

    let (_, frames) = tokio::join!(
        harness.orchestrator.run(request, ctx, sender),
        stream.collect::<Vec<SseFrame>>()
    );

    frames
}

fn names(frames: &[SseFrame]) -> Vec<&str> {
    frames.iter().map(|frame| frame.name).collect()
}

fn payload(frame: &SseFrame) -> Value {
    serde_json::from_str(&frame.data).unwrap()
}

fn payloads_named(frames: &[SseFrame], name: &str) -> Vec<Value> {
    frames
        .iter()
        .filter(|frame| frame.name == name)
        .map(payload)
        .collect()
}

fn simple_request() -> ChatRequest {
    chat_request(json!({
        "messages": [{ "role": "user", "content": "Say 'hello'." }],
        "optimization": "cheap",
        "tools": []
    }))
}

fn tool_call_event(index: usize, id: &str, name: &str, arguments: Value) -> ChatEvent {
    ChatEvent::ToolCallDelta {
        index,
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        arguments: arguments.to_string(),
    }
}

#[tokio::test]
async fn single_shot_chat_without_tools() {
    let harness = harness(
        vec![Turn::Events(vec![
            ChatEvent::ResponseMeta {
                status: 200,
                headers: vec![("x-request-id".to_string(), "up-1".to_string())],
            },
            ChatEvent::Delta("Hel".to_string()),
            ChatEvent::Delta("lo!".to_string()),
            ChatEvent::Usage {
                prompt_tokens: 9,
                completion_tokens: 3,
            },
            ChatEvent::Finish(FinishReason::Stop),
        ])],
        ChatConfig::default(),
        GuardrailMode::Off,
        Vec::new(),
    );

    let frames = run(&harness, simple_request()).await;

    assert_eq!(
        names(&frames),
        vec!["llm_request", "delta", "delta", "llm_response", "message_complete"]
    );

    let request_event = payload(&frames[0]);
    assert_eq!(request_event["phase"], "chat_iteration");
    assert_eq!(request_event["iteration"], 1);
    assert_eq!(request_event["provider"], "alpha");

    let response_event = payload(&frames[3]);
    assert_eq!(response_event["finishReason"], "stop");
    assert_eq!(response_event["status"], 200);
    assert_eq!(response_event["headers"]["x-request-id"], "up-1");

    let complete = payload(&frames[4]);
    assert_eq!(complete["content"], "Hello!");
    assert_eq!(complete["llmApiCalls"].as_array().unwrap().len(), 1);
    assert!(complete["extractedContent"]["sources"].as_array().unwrap().is_empty());

    // Delta concatenation equals the final content.
    let deltas: String = payloads_named(&frames, "delta")
        .iter()
        .map(|d| d["text"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(deltas, "Hello!");
}

#[tokio::test]
async fn two_step_tool_use() {
    let harness = harness(
        vec![
            Turn::Events(vec![
                tool_call_event(0, "t1", "get_time", json!({ "timezone": "Asia/Tokyo" })),
                ChatEvent::Finish(FinishReason::ToolCalls),
            ]),
            Turn::Events(vec![
                ChatEvent::Delta("It is 09:00 in Tokyo.".to_string()),
                ChatEvent::Finish(FinishReason::Stop),
            ]),
        ],
        ChatConfig::default(),
        GuardrailMode::Off,
        vec![FixedTool::new("get_time", "2025-11-04T09:00:00+09:00")],
    );

    let request = chat_request(json!({
        "messages": [{ "role": "user", "content": "What's the current time in Tokyo?" }]
    }));

    let frames = run(&harness, request).await;

    assert_eq!(
        names(&frames),
        vec![
            "llm_request",
            "llm_response",
            "tool_call",
            "tool_result",
            "llm_request",
            "delta",
            "llm_response",
            "message_complete"
        ]
    );

    assert_eq!(payload(&frames[0])["iteration"], 1);
    assert_eq!(payload(&frames[1])["finishReason"], "tool_calls");
    assert_eq!(payload(&frames[2])["id"], "t1");
    assert_eq!(payload(&frames[3])["contentForModel"], "2025-11-04T09:00:00+09:00");
    assert_eq!(payload(&frames[4])["iteration"], 2);

    let complete = payload(&frames[7]);
    assert!(complete["content"].as_str().unwrap().contains("09:00"));

    // Conversation integrity: the second provider call saw the assistant
    // tool-call turn followed by the matching tool reply.
    let calls = harness.script.recorded();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].provider, "alpha");
    assert_eq!(calls[1].model, "alpha-chat");

    let conversation = &calls[1].messages;
    let assistant_index = conversation
        .iter()
        .position(|m| m.role == Role::Assistant && m.tool_calls.is_some())
        .unwrap();

    let reply = &conversation[assistant_index + 1];
    assert_eq!(reply.role, Role::Tool);
    assert_eq!(reply.tool_call_id.as_deref(), Some("t1"));
    assert_eq!(reply.content, "2025-11-04T09:00:00+09:00");
}

#[tokio::test]
async fn parallel_tools_preserve_call_order() {
    let harness = harness(
        vec![
            Turn::Events(vec![
                tool_call_event(0, "s1", "search", json!({ "q": "A" })),
                tool_call_event(1, "s2", "search", json!({ "q": "B" })),
                ChatEvent::Finish(FinishReason::ToolCalls),
            ]),
            Turn::Events(vec![
                ChatEvent::Delta("Both searched.".to_string()),
                ChatEvent::Finish(FinishReason::Stop),
            ]),
        ],
        ChatConfig::default(),
        GuardrailMode::Off,
        // s1's query is slow, s2 finishes first.
        vec![FixedTool::new("search", "results for").delay_for("A", 80).delay_for("B", 5)],
    );

    let request = chat_request(json!({
        "messages": [{ "role": "user", "content": "Search A and B." }]
    }));

    let frames = run(&harness, request).await;

    let tool_calls = payloads_named(&frames, "tool_call");
    assert_eq!(tool_calls[0]["id"], "s1");
    assert_eq!(tool_calls[1]["id"], "s2");

    let tool_results = payloads_named(&frames, "tool_result");
    assert_eq!(tool_results[0]["id"], "s1");
    assert_eq!(tool_results[0]["contentForModel"], "results for A");
    assert_eq!(tool_results[1]["id"], "s2");
    assert_eq!(tool_results[1]["contentForModel"], "results for B");

    // The conversation appends replies in [s1, s2] order too.
    let calls = harness.script.recorded();
    let conversation = &calls[1].messages;
    let tool_replies: Vec<&Message> = conversation.iter().filter(|m| m.role == Role::Tool).collect();

    assert_eq!(tool_replies[0].tool_call_id.as_deref(), Some("s1"));
    assert_eq!(tool_replies[1].tool_call_id.as_deref(), Some("s2"));
}

#[tokio::test]
async fn fallback_to_next_candidate_on_upstream_failure() {
    let harness = harness(
        vec![
            Turn::Error(LlmError::Upstream5xx {
                status: 503,
                message: "overloaded".to_string(),
            }),
            Turn::Events(vec![
                ChatEvent::Delta("Recovered answer.".to_string()),
                ChatEvent::Finish(FinishReason::Stop),
            ]),
        ],
        ChatConfig::default(),
        GuardrailMode::Off,
        Vec::new(),
    );

    let frames = run(&harness, simple_request()).await;

    let requests = payloads_named(&frames, "llm_request");
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0]["provider"], "alpha");
    assert_eq!(requests[1]["provider"], "beta");
    // Same iteration retained across the fallback.
    assert_eq!(requests[0]["iteration"], 1);
    assert_eq!(requests[1]["iteration"], 1);

    let responses = payloads_named(&frames, "llm_response");
    assert_eq!(responses[0]["error"], "UPSTREAM_5XX");
    assert_eq!(responses[1]["finishReason"], "stop");

    let complete = payloads_named(&frames, "message_complete");
    let api_calls = complete[0]["llmApiCalls"].as_array().unwrap();
    assert_eq!(api_calls.len(), 2);
    assert_ne!(api_calls[0]["model"], api_calls[1]["model"]);

    // The breaker recorded the failure for alpha.
    let snapshot = harness.breaker.snapshot("alpha/alpha-chat");
    assert_eq!(snapshot.windowed_failures, 1);
    assert_eq!(snapshot.state, BreakerState::Closed);
}

#[tokio::test]
async fn client_caused_4xx_does_not_fall_back() {
    let harness = harness(
        vec![Turn::Error(LlmError::Upstream4xx {
            status: 401,
            message: "bad key".to_string(),
        })],
        ChatConfig::default(),
        GuardrailMode::Off,
        Vec::new(),
    );

    let frames = run(&harness, simple_request()).await;

    assert_eq!(payloads_named(&frames, "llm_request").len(), 1);

    let errors = payloads_named(&frames, "error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["kind"], "UPSTREAM_4XX");
    assert!(errors[0]["correlationId"].as_str().is_some());

    assert_eq!(harness.breaker.snapshot("alpha/alpha-chat").windowed_failures, 0);
}

#[tokio::test]
async fn safety_cutoff_strips_tools_and_synthesizes() {
    // The model asks for tools forever. Safety fires at iteration 8.
    let mut turns: Vec<Turn> = (0..8)
        .map(|i| {
            Turn::Events(vec![
                tool_call_event(0, &format!("t{i}"), "probe", json!({ "q": "again" })),
                ChatEvent::Finish(FinishReason::ToolCalls),
            ])
        })
        .collect();

    turns.push(Turn::Events(vec![
        ChatEvent::Delta("Best-effort summary of everything gathered.".to_string()),
        ChatEvent::Finish(FinishReason::Stop),
    ]));

    let harness = harness(
        turns,
        ChatConfig::default(),
        GuardrailMode::Off,
        vec![FixedTool::new("probe", "probe result")],
    );

    let request = chat_request(json!({
        "messages": [{ "role": "user", "content": "Keep digging." }]
    }));

    let frames = run(&harness, request).await;

    // Iterations 1-7 executed tools; the iteration-8 calls were stripped.
    assert_eq!(payloads_named(&frames, "tool_call").len(), 7);

    let requests = payloads_named(&frames, "llm_request");
    assert_eq!(requests.len(), 9);
    assert!(requests.iter().all(|r| r["iteration"].as_u64().unwrap() <= 8));
    assert_eq!(requests.last().unwrap()["phase"], "final_synthesis");
    // The synthesis call offers no tools.
    assert!(requests.last().unwrap()["request"]["tools"].as_array().unwrap().is_empty());

    let complete = payloads_named(&frames, "message_complete");
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0]["content"], "Best-effort summary of everything gathered.");

    // No tool_call event after the final_synthesis request was issued.
    let synthesis_position = frames.iter().position(|f| {
        f.name == "llm_request" && payload(f)["phase"] == "final_synthesis"
    });
    let last_tool_call = frames.iter().rposition(|f| f.name == "tool_call");
    assert!(last_tool_call.unwrap() < synthesis_position.unwrap());
}

#[tokio::test]
async fn identical_cacheable_calls_hit_the_cache() {
    let scrape = FixedTool::new("scrape_page", "page text").cacheable();
    let invocations = scrape.invocations.clone();

    let harness = harness(
        vec![
            Turn::Events(vec![
                tool_call_event(0, "c1", "scrape_page", json!({ "url": "https://x.example" })),
                ChatEvent::Finish(FinishReason::ToolCalls),
            ]),
            Turn::Events(vec![
                tool_call_event(0, "c2", "scrape_page", json!({ "url": "https://x.example" })),
                ChatEvent::Finish(FinishReason::ToolCalls),
            ]),
            Turn::Events(vec![
                ChatEvent::Delta("Done.".to_string()),
                ChatEvent::Finish(FinishReason::Stop),
            ]),
        ],
        ChatConfig::default(),
        GuardrailMode::Off,
        vec![scrape],
    );

    let request = chat_request(json!({
        "messages": [{ "role": "user", "content": "Scrape it twice." }]
    }));

    let frames = run(&harness, request).await;
    let results = payloads_named(&frames, "tool_result");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["cached"], false);
    assert_eq!(results[1]["cached"], true);
    assert_eq!(results[0]["contentForModel"], results[1]["contentForModel"]);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn input_guardrail_blocks_before_any_chat_call() {
    let harness = harness(
        vec![Turn::Events(vec![
            ChatEvent::Delta(r#"{"allowed": false, "reason": "disallowed content"}"#.to_string()),
            ChatEvent::Finish(FinishReason::Stop),
        ])],
        ChatConfig::default(),
        GuardrailMode::Open,
        Vec::new(),
    );

    let frames = run(&harness, simple_request()).await;

    let requests = payloads_named(&frames, "llm_request");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["phase"], "guardrail_input");

    let errors = payloads_named(&frames, "error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["kind"], "GUARDRAIL_BLOCKED");

    assert!(payloads_named(&frames, "message_complete").is_empty());
    // The moderation text never leaked as deltas.
    assert!(payloads_named(&frames, "delta").is_empty());
}

#[tokio::test]
async fn guardrail_failure_is_open_by_default_mode() {
    let harness = harness(
        vec![
            // Both candidates fail the moderation call...
            Turn::Error(LlmError::Upstream5xx {
                status: 500,
                message: "down".to_string(),
            }),
            Turn::Error(LlmError::Upstream5xx {
                status: 500,
                message: "down".to_string(),
            }),
            // ...and the chat call proceeds anyway.
            Turn::Events(vec![
                ChatEvent::Delta("Hello regardless.".to_string()),
                ChatEvent::Finish(FinishReason::Stop),
            ]),
        ],
        ChatConfig::default(),
        GuardrailMode::Open,
        Vec::new(),
    );

    let frames = run(&harness, simple_request()).await;

    let complete = payloads_named(&frames, "message_complete");
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0]["content"], "Hello regardless.");
}

#[tokio::test]
async fn guardrail_failure_blocks_in_closed_mode() {
    let harness = harness(
        vec![
            Turn::Error(LlmError::Upstream5xx {
                status: 500,
                message: "down".to_string(),
            }),
            Turn::Error(LlmError::Upstream5xx {
                status: 500,
                message: "down".to_string(),
            }),
        ],
        ChatConfig::default(),
        GuardrailMode::Closed,
        Vec::new(),
    );

    let frames = run(&harness, simple_request()).await;

    let errors = payloads_named(&frames, "error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["kind"], "GUARDRAIL_BLOCKED");
}

#[tokio::test]
async fn self_evaluation_grants_one_extra_iteration() {
    let config = ChatConfig {
        self_evaluation: true,
        ..Default::default()
    };

    let harness = harness(
        vec![
            Turn::Events(vec![
                ChatEvent::Delta("Short answer.".to_string()),
                ChatEvent::Finish(FinishReason::Stop),
            ]),
            Turn::Events(vec![
                ChatEvent::Delta(r#"{"comprehensive": false, "reason": "too thin"}"#.to_string()),
                ChatEvent::Finish(FinishReason::Stop),
            ]),
            Turn::Events(vec![
                ChatEvent::Delta("A much better, fuller answer.".to_string()),
                ChatEvent::Finish(FinishReason::Stop),
            ]),
        ],
        config,
        GuardrailMode::Off,
        Vec::new(),
    );

    let frames = run(&harness, simple_request()).await;

    let requests = payloads_named(&frames, "llm_request");
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1]["phase"], "self_evaluation");
    assert_eq!(requests[2]["phase"], "chat_iteration");
    assert_eq!(requests[2]["iteration"], 2);

    let complete = payloads_named(&frames, "message_complete");
    assert_eq!(complete[0]["content"], "A much better, fuller answer.");

    // The judge's text never reached the client stream.
    let delta_text: String = payloads_named(&frames, "delta")
        .iter()
        .map(|d| d["text"].as_str().unwrap().to_string())
        .collect();
    assert!(!delta_text.contains("comprehensive"));
}

#[tokio::test]
async fn empty_stop_content_terminates_with_empty_answer() {
    let harness = harness(
        vec![Turn::Events(vec![ChatEvent::Finish(FinishReason::Stop)])],
        ChatConfig::default(),
        GuardrailMode::Off,
        Vec::new(),
    );

    let frames = run(&harness, simple_request()).await;

    let complete = payloads_named(&frames, "message_complete");
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0]["content"], "");
}

#[tokio::test]
async fn no_model_available_is_terminal() {
    let document: CatalogDocument = serde_json::from_str(CATALOG).unwrap();
    // No credentials at all: every model is unusable.
    let catalog = Arc::new(Catalog::from_document(document, Vec::new()));

    let cache_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(cache::ContentCache::new(cache_dir.path().join("cache"), 1 << 20).unwrap());

    let script = Arc::new(Script::default());

    let orchestrator = Orchestrator {
        catalog,
        breaker: Arc::new(CircuitBreaker::default()),
        tracker: Arc::new(RateTracker::new()),
        executor: ToolExecutor::new(ToolRegistry::new(), cache, 4, Default::default()),
        providers: Arc::new(ScriptedFactory { script }),
        chat_config: ChatConfig::default(),
        guardrail_mode: GuardrailMode::Off,
        http: reqwest::Client::new(),
        mode: RunMode::Chat,
    };

    let ctx = RequestContext::new(None);
    let (sender, stream) = sse::channel();

    let (_, frames) = tokio::join!(
        orchestrator.run(simple_request(), ctx, sender),
        stream.collect::<Vec<SseFrame>>()
    );

    let errors = payloads_named(&frames, "error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["kind"], "NO_MODEL_AVAILABLE");
}

#[tokio::test]
async fn request_deadline_fails_fast_when_nothing_was_produced() {
    let config = ChatConfig {
        request_deadline_seconds: 0,
        ..Default::default()
    };

    let harness = harness(Vec::new(), config, GuardrailMode::Off, Vec::new());

    let frames = run(&harness, simple_request()).await;

    let errors = payloads_named(&frames, "error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["kind"], "DEADLINE_EXCEEDED");
}

#[tokio::test]
async fn planning_mode_restricts_tools_to_read_only_set() {
    let document: CatalogDocument = serde_json::from_str(CATALOG).unwrap();
    let catalog = Arc::new(Catalog::from_document(
        document,
        vec![credential("alpha"), credential("beta")],
    ));

    let cache_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(cache::ContentCache::new(cache_dir.path().join("cache"), 1 << 20).unwrap());

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(FixedTool::new("web_search", "hits")));
    registry.register(Arc::new(FixedTool::new("generate_image", "image")));

    let script = Arc::new(Script {
        turns: Mutex::new(
            vec![Turn::Events(vec![
                ChatEvent::Delta("1. Research. 2. Decide.".to_string()),
                ChatEvent::Finish(FinishReason::Stop),
            ])]
            .into(),
        ),
        calls: Mutex::new(Vec::new()),
    });

    let orchestrator = Orchestrator {
        catalog,
        breaker: Arc::new(CircuitBreaker::default()),
        tracker: Arc::new(RateTracker::new()),
        executor: ToolExecutor::new(registry, cache, 4, Default::default()),
        providers: Arc::new(ScriptedFactory { script: script.clone() }),
        chat_config: ChatConfig::default(),
        guardrail_mode: GuardrailMode::Off,
        http: reqwest::Client::new(),
        mode: RunMode::Planning,
    };

    let ctx = RequestContext::new(None);
    let (sender, stream) = sse::channel();

    let request = chat_request(json!({
        "messages": [{ "role": "user", "content": "Plan a launch." }]
    }));

    let (_, _frames) = tokio::join!(orchestrator.run(request, ctx, sender), stream.collect::<Vec<SseFrame>>());

    let calls = script.calls.lock().unwrap_or_else(|e| e.into_inner()).clone();
    assert_eq!(calls[0].tool_names, vec!["web_search"]);
}

#[tokio::test]
async fn deadline_is_set_from_config() {
    // Sanity check on the deadline arithmetic used by the loop.
    let config = ChatConfig::default();
    let deadline = Instant::now() + Duration::from_secs(config.request_deadline_seconds);
    assert!(deadline > Instant::now());
}
