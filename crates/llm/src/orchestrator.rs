//! The agentic chat loop.
//!
//! One request, one orchestrator task: select a model, stream its output,
//! execute any tool calls it makes, feed the results back, and repeat
//! until the model answers or a bound fires. Provider failures advance
//! through the selector's fallback sequence without consuming an
//! iteration; tool failures never escape the tool layer. All shared state
//! (catalog, breaker, tracker, cache) arrives by constructor injection so
//! the whole loop runs against in-memory fakes in tests.

mod collect;
pub(crate) mod events;
pub(crate) mod prompts;
mod self_eval;
#[cfg(test)]
mod tests;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use catalog::Catalog;
use config::{Capability, ChatConfig, CredentialConfig, GuardrailMode};
use rate_limit::{CircuitBreaker, RateTracker};
use secrecy::SecretString;
use serde::Serialize;
use tools::{Artifacts, ToolContext, ToolExecutor};

use self::{
    collect::{StreamedCompletion, collect_stream},
    events::{
        ErrorEvent, LlmRequestEvent, LlmResponseEvent, MessageCompleteEvent, Phase, ProviderCallRecord,
        SanitizedRequest, ToolCallEvent, ToolResultEvent, UsageEvent, tool_error_kind,
    },
    prompts::RunMode,
};
use crate::{
    error::{ErrorKind, LlmError, LlmResult},
    extract::ExtractedContent,
    guardrails,
    messages::{ChatRequest, Message, Optimization, Role},
    provider::{ProviderFactory, ProviderRequest, ToolChoice, ToolDefinition},
    request::RequestContext,
    selector::{ModelSelector, SelectionRequirements},
    sse::EventSender,
    token_counter,
};

/// Completion budget for auxiliary calls (moderation, self-evaluation).
const AUXILIARY_MAX_TOKENS: u32 = 256;

/// Per-request driver of the agentic loop.
pub(crate) struct Orchestrator {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) tracker: Arc<RateTracker>,
    pub(crate) executor: ToolExecutor,
    pub(crate) providers: Arc<dyn ProviderFactory>,
    pub(crate) chat_config: ChatConfig,
    pub(crate) guardrail_mode: GuardrailMode,
    pub(crate) http: reqwest::Client,
    pub(crate) mode: RunMode,
}

/// Request-scoped loop state. Owned by this task alone; events refer to
/// messages by position, never by shared pointers.
struct IterationState {
    iteration: u32,
    messages: Vec<Message>,
    total_tool_calls: usize,
    total_tokens_in: u64,
    total_tokens_out: u64,
    provider_calls: Vec<ProviderCallRecord>,
    artifacts: Vec<Artifacts>,
    deadline: Instant,
}

impl IterationState {
    fn new(mode: RunMode, request: &ChatRequest, deadline: Instant) -> Self {
        let mut messages = vec![Message::system(prompts::system_prompt(mode, request))];
        messages.extend(request.messages.iter().cloned());

        Self {
            iteration: 0,
            messages,
            total_tool_calls: 0,
            total_tokens_in: 0,
            total_tokens_out: 0,
            provider_calls: Vec::new(),
            artifacts: Vec::new(),
            deadline,
        }
    }

    fn deadline_passed(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// One provider call, fully specified.
struct CallSpec {
    phase: Phase,
    messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    tool_choice: Option<ToolChoice>,
    temperature: Option<f32>,
    max_tokens: u32,
    json_response: bool,
    stream: bool,
    forward_deltas: bool,
    requirements: SelectionRequirements,
}

impl Orchestrator {
    /// Drive one request to completion, emitting SSE events along the way.
    ///
    /// The event stream always terminates with exactly one of
    /// `message_complete` or `error` — except on client cancellation,
    /// which ends the stream silently.
    pub(crate) async fn run(&self, request: ChatRequest, ctx: RequestContext, events: EventSender) {
        let outcome = self.run_inner(request, &ctx, &events).await;

        if let Err(error) = outcome {
            if error.kind() == ErrorKind::ClientCanceled {
                log::debug!("[{}] Client canceled, ending silently", ctx.correlation_id);
                return;
            }

            log::warn!("[{}] Request failed: {error}", ctx.correlation_id);

            let _ = events
                .send(
                    "error",
                    &ErrorEvent {
                        kind: error.kind(),
                        code: error.status_code().as_u16(),
                        message: error.client_message(),
                        correlation_id: ctx.correlation_id.clone(),
                    },
                )
                .await;
        }
    }

    async fn run_inner(&self, request: ChatRequest, ctx: &RequestContext, events: &EventSender) -> LlmResult<()> {
        let cfg = &self.chat_config;
        let deadline = Instant::now() + Duration::from_secs(cfg.request_deadline_seconds);
        let extra_credentials = request_credentials(&request);
        let stream_upstream = request.stream.unwrap_or(true);

        let mut state = IterationState::new(self.mode, &request, deadline);

        if self.guardrail_mode.enabled() {
            let latest = last_user_content(&request.messages);

            if !latest.is_empty() {
                self.moderate(
                    Phase::GuardrailInput,
                    guardrails::input_messages(&latest),
                    &extra_credentials,
                    ctx,
                    events,
                    &mut state,
                )
                .await?;
            }
        }

        let tool_definitions = self.tool_definitions(&request);
        let mut self_eval_budget = if cfg.self_evaluation { cfg.self_evaluation_retries } else { 0 };
        let mut final_content: Option<String> = None;

        while state.iteration < cfg.max_tool_iterations {
            state.iteration += 1;

            if ctx.cancel.is_cancelled() {
                return Err(LlmError::ClientCanceled);
            }

            if state.deadline_passed() {
                break;
            }

            let use_tools = !tool_definitions.is_empty();
            let prompt_estimate = token_counter::estimate_prompt_tokens(&state.messages);
            let max_tokens = request.max_tokens.unwrap_or(cfg.max_tokens);

            let completion = self
                .call_with_fallback(
                    CallSpec {
                        phase: Phase::ChatIteration,
                        messages: state.messages.clone(),
                        tools: tool_definitions.clone(),
                        tool_choice: use_tools.then_some(ToolChoice::Auto),
                        temperature: request.temperature,
                        max_tokens,
                        json_response: request.voice_mode,
                        stream: stream_upstream,
                        forward_deltas: true,
                        requirements: SelectionRequirements {
                            optimization: request.optimization,
                            requires_tools: use_tools,
                            requires_vision: false,
                            requires_json_mode: request.voice_mode,
                            requires_streaming: stream_upstream,
                            required_category: None,
                            context_window_needed: (prompt_estimate + u64::from(max_tokens)) as u32,
                            projected_tokens: prompt_estimate + u64::from(max_tokens),
                        },
                    },
                    &extra_credentials,
                    ctx,
                    events,
                    &mut state,
                )
                .await?;

            if !completion.tool_calls.is_empty() {
                if state.iteration >= cfg.safety_iteration {
                    // Past the safety cutoff the pending calls are
                    // discarded. Substantive text alongside them is kept
                    // as the answer; otherwise one last non-tool call
                    // synthesizes from what the loop gathered.
                    log::info!(
                        "[{}] Safety cutoff at iteration {}: discarding {} pending tool calls",
                        ctx.correlation_id,
                        state.iteration,
                        completion.tool_calls.len()
                    );

                    if completion.content.len() >= cfg.substantive_length {
                        final_content = Some(completion.content);
                    } else {
                        final_content = Some(
                            self.final_synthesis(&request, stream_upstream, &extra_credentials, ctx, events, &mut state)
                                .await?,
                        );
                    }

                    break;
                }

                state
                    .messages
                    .push(Message::assistant(completion.content.clone(), Some(completion.tool_calls.clone())));

                for call in &completion.tool_calls {
                    self.emit(
                        events,
                        ctx,
                        "tool_call",
                        &ToolCallEvent {
                            id: &call.id,
                            name: &call.name,
                            arguments: &call.arguments,
                        },
                    )
                    .await?;
                }

                let tool_ctx = ToolContext {
                    http: self.http.clone(),
                    cancel: ctx.cancel.child_token(),
                };

                let batch: Vec<(String, serde_json::Value)> = completion
                    .tool_calls
                    .iter()
                    .map(|call| (call.name.clone(), call.arguments.clone()))
                    .collect();

                let results = self.executor.execute_batch(batch, &tool_ctx).await;
                state.total_tool_calls += results.len();

                for (call, result) in completion.tool_calls.iter().zip(results) {
                    state.messages.push(Message::tool_reply(
                        call.id.as_str(),
                        call.name.as_str(),
                        result.content_for_model.as_str(),
                    ));

                    self.emit(
                        events,
                        ctx,
                        "tool_result",
                        &ToolResultEvent {
                            id: &call.id,
                            name: &call.name,
                            content_for_model: &result.content_for_model,
                            cached: result.cached,
                            error_kind: result.error_kind.map(tool_error_kind),
                        },
                    )
                    .await?;

                    if let Some(artifacts) = result.artifacts {
                        state.artifacts.push(artifacts);
                    }
                }

                continue;
            }

            // Candidate final answer.
            if completion.content.is_empty() {
                // finish=stop with nothing said is not an answer. Spend a
                // retry if one is available.
                if self_eval_budget > 0 && state.iteration < cfg.max_tool_iterations {
                    self_eval_budget -= 1;
                    state
                        .messages
                        .push(Message::system("The previous response was empty. Provide a complete answer."));
                    continue;
                }

                final_content = Some(String::new());
                break;
            }

            if self_eval_budget > 0 && state.iteration < cfg.max_tool_iterations {
                // At most once per request, regardless of verdict.
                self_eval_budget = 0;

                let question = last_user_content(&request.messages);
                let comprehensive = self
                    .self_evaluate(&question, &completion.content, &extra_credentials, ctx, events, &mut state)
                    .await;

                if !comprehensive {
                    log::debug!("[{}] Answer judged incomprehensive, granting one retry", ctx.correlation_id);

                    state.messages.push(Message::assistant(completion.content.clone(), None));
                    state.messages.push(Message::system(
                        "The answer above was judged incomplete. Improve it: cover every part of the question.",
                    ));
                    continue;
                }
            }

            final_content = Some(completion.content);
            break;
        }

        let content = match final_content {
            Some(content) => content,
            None => {
                // The loop ran dry: iteration cap or deadline with tools
                // still pending. Close with a best-effort synthesis where
                // possible.
                if state.deadline_passed() {
                    return Err(LlmError::DeadlineExceeded);
                }

                match self
                    .final_synthesis(&request, stream_upstream, &extra_credentials, ctx, events, &mut state)
                    .await
                {
                    Ok(content) if !content.is_empty() => content,
                    Ok(_) => return Err(LlmError::MaxIterations),
                    Err(error) => {
                        log::warn!("[{}] Best-effort synthesis failed: {error}", ctx.correlation_id);
                        return Err(LlmError::MaxIterations);
                    }
                }
            }
        };

        if self.guardrail_mode.enabled() && !content.is_empty() {
            self.moderate(
                Phase::GuardrailOutput,
                guardrails::output_messages(&content),
                &extra_credentials,
                ctx,
                events,
                &mut state,
            )
            .await?;
        }

        log::info!(
            "[{}] Request complete: {} iterations, {} tool calls, {}+{} tokens, user={}",
            ctx.correlation_id,
            state.iteration,
            state.total_tool_calls,
            state.total_tokens_in,
            state.total_tokens_out,
            ctx.authenticated_user_id.as_deref().unwrap_or("anonymous"),
        );

        let extracted_content = ExtractedContent::distill(std::mem::take(&mut state.artifacts));

        self.emit(
            events,
            ctx,
            "message_complete",
            &MessageCompleteEvent {
                content,
                llm_api_calls: std::mem::take(&mut state.provider_calls),
                extracted_content,
            },
        )
        .await?;

        Ok(())
    }

    /// Issue one provider call, advancing through the fallback sequence on
    /// breaker-tripping failures. The iteration number is retained across
    /// candidates.
    async fn call_with_fallback(
        &self,
        spec: CallSpec,
        extra_credentials: &[CredentialConfig],
        ctx: &RequestContext,
        events: &EventSender,
        state: &mut IterationState,
    ) -> LlmResult<StreamedCompletion> {
        let selector = ModelSelector::new(self.catalog.clone(), self.breaker.clone(), self.tracker.clone());
        let candidates = selector.select_sequence(&spec.requirements, extra_credentials, &ctx.correlation_id);

        if candidates.is_empty() {
            return Err(LlmError::NoModelAvailable);
        }

        let mut last_error = None;

        for model in &candidates {
            let key = model.key();

            let Some(credential) = self.catalog.credential_for_with(model, Capability::Chat, extra_credentials)
            else {
                continue;
            };

            let provider = match self.providers.create(model, credential) {
                Ok(provider) => provider,
                Err(error) => {
                    log::warn!("[{}] Cannot build adapter for {key}: {error}", ctx.correlation_id);
                    last_error = Some(error);
                    continue;
                }
            };

            self.emit(
                events,
                ctx,
                "llm_request",
                &LlmRequestEvent {
                    phase: spec.phase,
                    provider: model.provider_type.clone(),
                    model: model.model_id.clone(),
                    iteration: state.iteration,
                    request: SanitizedRequest {
                        model: model.model_id.clone(),
                        message_count: spec.messages.len(),
                        tools: spec.tools.iter().map(|tool| tool.name.clone()).collect(),
                        temperature: spec.temperature,
                        max_tokens: spec.max_tokens,
                        stream: spec.stream,
                    },
                },
            )
            .await?;

            self.tracker.record_request(&key);
            let started = Instant::now();

            let provider_request = ProviderRequest {
                model: model.model_id.clone(),
                messages: spec.messages.clone(),
                tools: spec.tools.clone(),
                tool_choice: spec.tool_choice,
                temperature: spec.temperature,
                max_tokens: spec.max_tokens,
                json_response: spec.json_response,
                stream: spec.stream,
            };

            let outcome = match provider.chat(provider_request, ctx).await {
                Ok(stream) => collect_stream(stream, spec.forward_deltas.then_some(events), &ctx.cancel).await,
                Err(error) => Err(error),
            };

            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(completion) => {
                    self.breaker.record_success(&key);

                    let usage = completion.usage.map(|(prompt_tokens, completion_tokens)| UsageEvent {
                        prompt_tokens,
                        completion_tokens,
                    });

                    if let Some((prompt_tokens, completion_tokens)) = completion.usage {
                        self.tracker
                            .record_tokens(&key, u64::from(prompt_tokens) + u64::from(completion_tokens));
                        state.total_tokens_in += u64::from(prompt_tokens);
                        state.total_tokens_out += u64::from(completion_tokens);
                    }

                    state.provider_calls.push(ProviderCallRecord {
                        phase: spec.phase,
                        provider: model.provider_type.clone(),
                        model: model.model_id.clone(),
                        iteration: state.iteration,
                        prompt_tokens: usage.map_or(0, |u| u.prompt_tokens),
                        completion_tokens: usage.map_or(0, |u| u.completion_tokens),
                        duration_ms,
                        status: completion.status,
                        error: None,
                    });

                    self.emit(
                        events,
                        ctx,
                        "llm_response",
                        &LlmResponseEvent {
                            phase: spec.phase,
                            provider: model.provider_type.clone(),
                            model: model.model_id.clone(),
                            iteration: state.iteration,
                            finish_reason: Some(completion.finish),
                            status: completion.status,
                            headers: completion.headers.clone(),
                            duration_ms,
                            usage,
                            error: None,
                        },
                    )
                    .await?;

                    return Ok(completion);
                }
                Err(error @ LlmError::ClientCanceled) => return Err(error),
                Err(error) => {
                    state.provider_calls.push(ProviderCallRecord {
                        phase: spec.phase,
                        provider: model.provider_type.clone(),
                        model: model.model_id.clone(),
                        iteration: state.iteration,
                        prompt_tokens: 0,
                        completion_tokens: 0,
                        duration_ms,
                        status: None,
                        error: Some(error.kind()),
                    });

                    self.emit(
                        events,
                        ctx,
                        "llm_response",
                        &LlmResponseEvent {
                            phase: spec.phase,
                            provider: model.provider_type.clone(),
                            model: model.model_id.clone(),
                            iteration: state.iteration,
                            finish_reason: None,
                            status: None,
                            headers: Default::default(),
                            duration_ms,
                            usage: None,
                            error: Some(error.kind()),
                        },
                    )
                    .await?;

                    if error.is_breaker_tripping() {
                        self.breaker.record_failure(&key);
                        log::warn!(
                            "[{}] {key} failed ({error}), advancing to the next candidate",
                            ctx.correlation_id
                        );
                        last_error = Some(error);
                        continue;
                    }

                    return Err(error);
                }
            }
        }

        Err(last_error.unwrap_or(LlmError::NoModelAvailable))
    }

    /// The forced non-tool closing call. Does not count against the tool
    /// iteration cap.
    async fn final_synthesis(
        &self,
        request: &ChatRequest,
        stream_upstream: bool,
        extra_credentials: &[CredentialConfig],
        ctx: &RequestContext,
        events: &EventSender,
        state: &mut IterationState,
    ) -> LlmResult<String> {
        let mut messages = state.messages.clone();
        messages.push(Message::system(prompts::SYNTHESIS_PROMPT));

        let prompt_estimate = token_counter::estimate_prompt_tokens(&messages);
        let max_tokens = request.max_tokens.unwrap_or(self.chat_config.max_tokens);

        let completion = self
            .call_with_fallback(
                CallSpec {
                    phase: Phase::FinalSynthesis,
                    messages,
                    tools: Vec::new(),
                    tool_choice: None,
                    temperature: request.temperature,
                    max_tokens,
                    json_response: request.voice_mode,
                    stream: stream_upstream,
                    forward_deltas: true,
                    requirements: SelectionRequirements {
                        optimization: request.optimization,
                        requires_tools: false,
                        requires_vision: false,
                        requires_json_mode: request.voice_mode,
                        requires_streaming: stream_upstream,
                        required_category: None,
                        context_window_needed: (prompt_estimate + u64::from(max_tokens)) as u32,
                        projected_tokens: prompt_estimate + u64::from(max_tokens),
                    },
                },
                extra_credentials,
                ctx,
                events,
                state,
            )
            .await?;

        Ok(completion.content)
    }

    /// Run one moderation call. Allowed content returns `Ok(())`;
    /// disallowed content or an unavailable moderator under `closed` mode
    /// returns `GuardrailBlocked`.
    async fn moderate(
        &self,
        phase: Phase,
        messages: Vec<Message>,
        extra_credentials: &[CredentialConfig],
        ctx: &RequestContext,
        events: &EventSender,
        state: &mut IterationState,
    ) -> LlmResult<()> {
        let outcome = self
            .call_with_fallback(
                CallSpec {
                    phase,
                    messages,
                    tools: Vec::new(),
                    tool_choice: None,
                    temperature: Some(0.0),
                    max_tokens: AUXILIARY_MAX_TOKENS,
                    json_response: false,
                    stream: false,
                    forward_deltas: false,
                    requirements: SelectionRequirements {
                        optimization: Optimization::Cheap,
                        projected_tokens: u64::from(AUXILIARY_MAX_TOKENS),
                        ..Default::default()
                    },
                },
                extra_credentials,
                ctx,
                events,
                state,
            )
            .await;

        let completion = match outcome {
            Ok(completion) => completion,
            Err(error @ LlmError::ClientCanceled) => return Err(error),
            Err(error) => {
                return match self.guardrail_mode {
                    GuardrailMode::Closed => {
                        log::warn!(
                            "[{}] Moderation unavailable under closed mode: {error}",
                            ctx.correlation_id
                        );
                        Err(LlmError::GuardrailBlocked {
                            message: "Content moderation is unavailable; the request cannot proceed.".to_string(),
                        })
                    }
                    _ => {
                        log::warn!(
                            "[{}] Moderation unavailable, proceeding fail-open: {error}",
                            ctx.correlation_id
                        );
                        Ok(())
                    }
                };
            }
        };

        let verdict = guardrails::parse_verdict(&completion.content);

        if verdict.allowed {
            return Ok(());
        }

        let reason = verdict.reason.unwrap_or_else(|| "policy violation".to_string());
        log::info!("[{}] Guardrail blocked content: {reason}", ctx.correlation_id);

        Err(LlmError::GuardrailBlocked {
            message: format!("This request was declined by content policy: {reason}"),
        })
    }

    /// Judge a candidate answer. Any failure counts as comprehensive.
    async fn self_evaluate(
        &self,
        question: &str,
        answer: &str,
        extra_credentials: &[CredentialConfig],
        ctx: &RequestContext,
        events: &EventSender,
        state: &mut IterationState,
    ) -> bool {
        let outcome = self
            .call_with_fallback(
                CallSpec {
                    phase: Phase::SelfEvaluation,
                    messages: self_eval::messages(question, answer),
                    tools: Vec::new(),
                    tool_choice: None,
                    temperature: Some(0.0),
                    max_tokens: AUXILIARY_MAX_TOKENS,
                    json_response: false,
                    stream: false,
                    forward_deltas: false,
                    requirements: SelectionRequirements {
                        optimization: Optimization::Cheap,
                        projected_tokens: u64::from(AUXILIARY_MAX_TOKENS),
                        ..Default::default()
                    },
                },
                extra_credentials,
                ctx,
                events,
                state,
            )
            .await;

        match outcome {
            Ok(completion) => self_eval::parse_comprehensive(&completion.content),
            Err(error) => {
                log::debug!(
                    "[{}] Self-evaluation unavailable, keeping the answer: {error}",
                    ctx.correlation_id
                );
                true
            }
        }
    }

    /// The tool definitions offered to the model for this request.
    fn tool_definitions(&self, request: &ChatRequest) -> Vec<ToolDefinition> {
        let descriptors = self.executor.registry().descriptors();

        descriptors
            .into_iter()
            .filter(|descriptor| match self.mode {
                RunMode::Chat => true,
                RunMode::Planning => tools::builtin::PLANNING_TOOLS.contains(&descriptor.name.as_str()),
            })
            .filter(|descriptor| match &request.tools {
                Some(enabled) => enabled.iter().any(|name| *name == descriptor.name),
                None => true,
            })
            .map(|descriptor| ToolDefinition {
                name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                parameters: descriptor.input_schema.clone(),
            })
            .collect()
    }

    /// Send one event, converting a vanished client into cancellation.
    async fn emit<T: Serialize>(
        &self,
        events: &EventSender,
        ctx: &RequestContext,
        name: &'static str,
        payload: &T,
    ) -> LlmResult<()> {
        events.send(name, payload).await.map_err(|_| {
            ctx.cancel.cancel();
            LlmError::ClientCanceled
        })
    }
}

/// Convert request-scoped provider entries into pool credentials. They
/// take precedence by standing first in the lookup order.
fn request_credentials(request: &ChatRequest) -> Vec<CredentialConfig> {
    request
        .providers
        .iter()
        .map(|provider| CredentialConfig {
            provider_type: provider.provider_type.clone(),
            api_key: SecretString::from(provider.api_key.clone()),
            base_url: provider.base_url.clone(),
            allowed_models: match &provider.allowed_models {
                Some(models) => config::AllowedModels::List(models.clone()),
                None => config::AllowedModels::All,
            },
            capabilities: vec![Capability::Chat, Capability::Image],
        })
        .collect()
}

fn last_user_content(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|message| message.role == Role::User)
        .map(|message| message.content.clone())
        .unwrap_or_default()
}
