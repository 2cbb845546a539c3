use std::collections::BTreeMap;

use serde::Deserialize;

/// Tool execution settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    /// Default per-call output cap in bytes. Larger outputs are truncated
    /// with an elision marker.
    pub max_output_bytes: usize,
    /// Default per-call wall-clock budget in seconds.
    pub timeout_seconds: u64,
    /// Web search tool settings.
    pub search: SearchToolConfig,
    /// Page scrape tool settings.
    pub scrape: ScrapeToolConfig,
    /// Per-tool cache TTL overrides in seconds, keyed by tool name.
    /// `CACHE_TTL_<TOOL>` environment variables land here.
    pub ttl_overrides: BTreeMap<String, u64>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: 100 * 1024,
            timeout_seconds: 30,
            search: SearchToolConfig::default(),
            scrape: ScrapeToolConfig::default(),
            ttl_overrides: BTreeMap::new(),
        }
    }
}

/// Web search tool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchToolConfig {
    /// Whether the tool is registered.
    pub enabled: bool,
    /// Base URL of a SearXNG-compatible JSON search endpoint. The tool is
    /// registered but always errors when unset.
    pub base_url: Option<String>,
}

impl Default for SearchToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
        }
    }
}

/// Page scrape tool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScrapeToolConfig {
    /// Whether the tool is registered.
    pub enabled: bool,
    /// Optional reader-proxy prefix used as a second tier when the direct
    /// fetch yields no readable text.
    pub reader_proxy: Option<String>,
}

impl Default for ScrapeToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reader_proxy: None,
        }
    }
}
