use std::sync::Arc;

use anyhow::Context;
use cache::ContentCache;
use catalog::Catalog;
use rate_limit::{CircuitBreaker, RateTracker};
use tools::{ToolExecutor, ToolRegistry};

use crate::{
    http_client::http_client,
    provider::HttpProviderFactory,
    server::{GatewayInner, GatewayServer, ImageDispatcher, ImageGenerationTool},
};

/// Wires the shared stores and the tool set into a [`GatewayServer`].
pub(crate) struct GatewayBuilder {
    config: config::Config,
}

impl GatewayBuilder {
    pub(crate) fn new(config: &config::Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub(crate) fn build(self) -> anyhow::Result<GatewayServer> {
        let config = self.config;

        let catalog = Arc::new(
            Catalog::load(&config.catalog.path, config.credentials.clone())
                .with_context(|| format!("failed to load provider catalog from {}", config.catalog.path))?,
        );

        let cache = Arc::new(
            ContentCache::new(&config.cache.path, config.cache.bytes_budget)
                .with_context(|| format!("failed to initialize cache at {}", config.cache.path))?,
        );

        let http = http_client();
        let breaker = Arc::new(CircuitBreaker::default());
        let tracker = Arc::new(RateTracker::new());

        let images = Arc::new(ImageDispatcher::new(catalog.clone(), breaker.clone(), http.clone()));

        let mut registry = ToolRegistry::new();
        tools::builtin::register_defaults(&mut registry, &config.tools);
        registry.register(Arc::new(ImageGenerationTool::new(images.clone(), &config.tools)));

        let executor = ToolExecutor::new(
            registry,
            cache.clone(),
            config.chat.tool_fanout,
            config.tools.ttl_overrides.clone(),
        );

        log::info!(
            "Gateway initialized: {} tools registered, cache budget {} bytes",
            executor.registry().names().len(),
            config.cache.bytes_budget
        );

        Ok(GatewayServer::from_inner(GatewayInner {
            config,
            catalog,
            breaker,
            tracker,
            cache,
            executor,
            providers: Arc::new(HttpProviderFactory::new(http.clone())),
            images,
            http,
        }))
    }
}
