//! The gateway core: agentic chat over a multi-provider model catalog.
//!
//! This crate owns the `/chat` and `/planning` SSE endpoints, the image
//! generation dispatch, and the health/stats surfaces. Everything behind
//! them — selection, adapters, the tool loop — lives in the sibling
//! modules.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    Extension, Json, Router,
    extract::State,
    http::HeaderMap,
    response::{
        IntoResponse, Sse,
        sse::{Event, KeepAlive},
    },
    routing::{get, post},
};
use axum_serde::Sonic;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

mod error;
mod extract;
mod guardrails;
mod http_client;
mod messages;
mod orchestrator;
pub mod provider;
mod request;
mod selector;
mod server;
mod sse;
mod token_counter;

pub use error::{ErrorKind, LlmError, LlmResult as Result};
pub use extract::ExtractedContent;
pub use messages::{ChatRequest, Message, Optimization, Role, ToolCall};
pub use request::RequestContext;
pub use server::GatewayServer;

use crate::{orchestrator::prompts::RunMode, server::GatewayBuilder};

/// Opaque authenticated user id attached by the auth layer. Used for log
/// attribution only; the gateway enforces no policy on it.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub String);

/// Creates an axum router for the gateway endpoints.
pub fn router(config: &config::Config) -> anyhow::Result<Router> {
    let server = GatewayBuilder::new(config).build()?;

    Ok(Router::new()
        .route("/chat", post(chat))
        .route("/planning", post(planning))
        .route("/generate-image", post(generate_image))
        .route("/health-check/image-providers", get(image_provider_health))
        .route("/cache-stats", get(cache_stats))
        .route("/models", get(list_models))
        .with_state(server))
}

/// Handle `/chat`: stream an agentic chat response as SSE.
async fn chat(
    State(server): State<GatewayServer>,
    headers: HeaderMap,
    user: Option<Extension<AuthenticatedUser>>,
    Sonic(request): Sonic<ChatRequest>,
) -> Result<impl IntoResponse> {
    run_sse(server, RunMode::Chat, headers, user, request)
}

/// Handle `/planning`: the chat loop with a planning prompt and the
/// read-only tool subset.
async fn planning(
    State(server): State<GatewayServer>,
    headers: HeaderMap,
    user: Option<Extension<AuthenticatedUser>>,
    Sonic(request): Sonic<ChatRequest>,
) -> Result<impl IntoResponse> {
    run_sse(server, RunMode::Planning, headers, user, request)
}

fn run_sse(
    server: GatewayServer,
    mode: RunMode,
    headers: HeaderMap,
    user: Option<Extension<AuthenticatedUser>>,
    request: ChatRequest,
) -> Result<impl IntoResponse> {
    if request.messages.is_empty() {
        return Err(LlmError::InvalidRequest("messages must not be empty".to_string()));
    }

    let ctx = request::extract_context(&headers, user.map(|Extension(user)| user.0));

    log::debug!(
        "[{}] {:?} request: {} messages, optimization {:?}, user={}",
        ctx.correlation_id,
        mode,
        request.messages.len(),
        request.optimization,
        ctx.authenticated_user_id.as_deref().unwrap_or("anonymous"),
    );

    let (sender, stream) = sse::channel();
    let orchestrator = server.orchestrator(mode);

    tokio::spawn(async move {
        orchestrator.run(request, ctx, sender).await;
    });

    let body = stream.map(|frame| Ok::<Event, Infallible>(Event::default().event(frame.name).data(frame.data)));

    Ok(Sse::new(body).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

/// `/generate-image` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct GenerateImageRequest {
    prompt: String,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    size: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateImageResponse {
    provider: String,
    model: String,
    images: Vec<provider::image::GeneratedImage>,
}

/// Handle `/generate-image`: dispatch to an image-capable provider.
async fn generate_image(
    State(server): State<GatewayServer>,
    Sonic(request): Sonic<GenerateImageRequest>,
) -> Result<impl IntoResponse> {
    if request.prompt.trim().is_empty() {
        return Err(LlmError::InvalidRequest("prompt must not be empty".to_string()));
    }

    let outcome = server
        .images()
        .generate(
            &request.prompt,
            request.provider.as_deref(),
            request.model.as_deref(),
            request.size.as_deref(),
        )
        .await?;

    Ok(Json(GenerateImageResponse {
        provider: outcome.provider,
        model: outcome.model,
        images: outcome.images,
    }))
}

/// Handle `/health-check/image-providers`.
async fn image_provider_health(State(server): State<GatewayServer>) -> impl IntoResponse {
    Json(server.image_provider_health())
}

#[derive(Debug, Serialize)]
struct CacheStatsResponse {
    hits: u64,
    misses: u64,
    bytes: u64,
    count: usize,
}

/// Handle `/cache-stats`.
async fn cache_stats(State(server): State<GatewayServer>) -> impl IntoResponse {
    let stats = server.cache_stats();

    Json(CacheStatsResponse {
        hits: stats.hits,
        misses: stats.misses,
        bytes: stats.bytes,
        count: stats.count,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelListing {
    provider: String,
    model: String,
    category: catalog::ModelCategory,
    context_window: u32,
    supports_tools: bool,
    supports_streaming: bool,
    supports_json_mode: bool,
    supports_vision: bool,
    pricing: catalog::Pricing,
    rate_limits: catalog::RateLimits,
}

/// Handle `/models`: the filtered catalog for client-side pickers.
async fn list_models(State(server): State<GatewayServer>) -> impl IntoResponse {
    let models: Vec<ModelListing> = server
        .catalog()
        .models(&catalog::ModelFilter::default(), &[])
        .into_iter()
        .map(|model| ModelListing {
            provider: model.provider_type.clone(),
            model: model.model_id.clone(),
            category: model.category,
            context_window: model.context_window,
            supports_tools: model.supports_tools,
            supports_streaming: model.supports_streaming,
            supports_json_mode: model.supports_json_mode,
            supports_vision: model.supports_vision,
            pricing: model.pricing,
            rate_limits: model.rate_limits,
        })
        .collect();

    Json(models)
}
