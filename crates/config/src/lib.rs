//! Prism configuration structures to map the prism.toml configuration.
//!
//! Every section rejects unknown keys: runtime knobs are a closed set, and a
//! typo in the file should fail loudly at startup instead of being ignored.

#![deny(missing_docs)]

mod cache;
mod chat;
mod credentials;
mod guardrails;
mod loader;
mod server;
mod tools;

use std::path::Path;

pub use cache::CacheConfig;
pub use chat::ChatConfig;
pub use credentials::{AllowedModels, Capability, CredentialConfig};
pub use guardrails::{GuardrailMode, GuardrailsConfig};
pub use server::ServerConfig;
pub use tools::{ScrapeToolConfig, SearchToolConfig, ToolsConfig};

use serde::Deserialize;

/// Main configuration structure for the Prism gateway.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    pub server: ServerConfig,
    /// Provider catalog location.
    pub catalog: CatalogConfig,
    /// Agentic chat loop settings.
    pub chat: ChatConfig,
    /// Input/output moderation settings.
    pub guardrails: GuardrailsConfig,
    /// Tool output cache settings.
    pub cache: CacheConfig,
    /// Tool execution settings.
    pub tools: ToolsConfig,
    /// Upstream provider credentials. The environment pool (`LP_*`) is
    /// appended to this list by the loader.
    pub credentials: Vec<CredentialConfig>,
}

/// Location of the provider catalog document.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// Path to the catalog JSON document. Overridden by
    /// `PROVIDER_CATALOG_PATH`.
    pub path: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: "models.json".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file path and apply the documented
    /// environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Load configuration from defaults plus environment only, with no file.
    pub fn from_env() -> anyhow::Result<Config> {
        let mut config = Config::default();
        loader::apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Validates that the configuration can actually serve requests.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate(self)
    }
}
