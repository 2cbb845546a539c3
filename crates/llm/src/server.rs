mod builder;
mod image;

use std::sync::Arc;

pub(crate) use builder::GatewayBuilder;
use cache::CacheStats;
use catalog::Catalog;
pub(crate) use image::{ImageDispatcher, ImageGenerationTool};
use rate_limit::{BreakerState, CircuitBreaker, RateTracker};
use serde::Serialize;
use tools::ToolExecutor;

use crate::{orchestrator::Orchestrator, orchestrator::prompts::RunMode, provider::ProviderFactory};

/// Process-wide gateway state behind every handler.
#[derive(Clone)]
pub struct GatewayServer {
    shared: Arc<GatewayInner>,
}

pub(crate) struct GatewayInner {
    /// Resolved configuration snapshot.
    pub(crate) config: config::Config,
    /// Read-only model catalog and credential pool.
    pub(crate) catalog: Arc<Catalog>,
    /// Per-endpoint circuit breakers.
    pub(crate) breaker: Arc<CircuitBreaker>,
    /// Per-endpoint request/token accounting.
    pub(crate) tracker: Arc<RateTracker>,
    /// Content cache shared with the tool executor.
    pub(crate) cache: Arc<cache::ContentCache>,
    /// Tool registry and dispatch.
    pub(crate) executor: ToolExecutor,
    /// Adapter factory.
    pub(crate) providers: Arc<dyn ProviderFactory>,
    /// Image generation dispatch, shared by the endpoint and the tool.
    pub(crate) images: Arc<ImageDispatcher>,
    /// Shared outbound HTTP client.
    pub(crate) http: reqwest::Client,
}

impl GatewayServer {
    pub(crate) fn from_inner(inner: GatewayInner) -> Self {
        Self {
            shared: Arc::new(inner),
        }
    }

    /// A per-request orchestrator for the given mode.
    pub(crate) fn orchestrator(&self, mode: RunMode) -> Orchestrator {
        Orchestrator {
            catalog: self.shared.catalog.clone(),
            breaker: self.shared.breaker.clone(),
            tracker: self.shared.tracker.clone(),
            executor: self.shared.executor.clone(),
            providers: self.shared.providers.clone(),
            chat_config: self.shared.config.chat.clone(),
            guardrail_mode: self.shared.config.guardrails.mode,
            http: self.shared.http.clone(),
            mode,
        }
    }

    pub(crate) fn cache_stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    pub(crate) fn catalog(&self) -> &Catalog {
        &self.shared.catalog
    }

    pub(crate) fn images(&self) -> &ImageDispatcher {
        &self.shared.images
    }

    /// Per-provider availability for the image health endpoint.
    pub(crate) fn image_provider_health(&self) -> Vec<ImageProviderHealth> {
        self.shared
            .catalog
            .providers_with_capability(config::Capability::Image)
            .into_iter()
            .map(|provider| {
                let model = crate::provider::image::default_image_model(provider).unwrap_or("unknown");
                let snapshot = self.shared.breaker.snapshot(&format!("{provider}/{model}"));

                ImageProviderHealth {
                    provider: provider.to_string(),
                    model: model.to_string(),
                    circuit: circuit_label(snapshot.state),
                    available: snapshot.state != BreakerState::Open,
                    cooldown_remaining_ms: snapshot.cooldown_remaining.map(|d| d.as_millis() as u64),
                    windowed_failures: snapshot.windowed_failures,
                }
            })
            .collect()
    }
}

fn circuit_label(state: BreakerState) -> &'static str {
    match state {
        BreakerState::Closed => "closed",
        BreakerState::Open => "open",
        BreakerState::HalfOpen => "half_open",
    }
}

/// One row of the `/health-check/image-providers` report.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProviderHealth {
    /// Provider type.
    pub provider: String,
    /// The image model availability is tracked against.
    pub model: String,
    /// Circuit breaker state label.
    pub circuit: &'static str,
    /// Whether calls may be issued right now.
    pub available: bool,
    /// Cooldown left before a probe is allowed, when open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_ms: Option<u64>,
    /// Breaker-tripping failures within the rolling window.
    pub windowed_failures: usize,
}
