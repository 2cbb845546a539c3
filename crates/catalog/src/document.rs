//! The declarative provider catalog document.
//!
//! The document is a static JSON file describing every provider and model
//! the gateway may route to, including pricing, capabilities, rate limit
//! policy and deprecation flags. It is read once at startup; reloading is
//! an administrative restart, never part of the request path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Model keys carrying this prefix are a legacy deprecation encoding. The
/// prefix is normalized into the `deprecated` boolean at load time.
pub const DEPRECATED_KEY_PREFIX: &str = "_deprecated_";

/// Root of the catalog document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    /// Chat-capable providers.
    #[serde(default)]
    pub chat: ChatSection,
}

/// The `chat` section of the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatSection {
    /// Providers keyed by provider type (`openai`, `gemini`, `groq`, ...).
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderEntry>,
}

/// One provider in the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Models keyed by model id.
    #[serde(default)]
    pub models: BTreeMap<String, ModelEntry>,
}

/// One model in the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    /// Size/capability class of the model.
    pub category: ModelCategory,
    /// Context window in tokens.
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    /// Whether the model handles tool calls.
    #[serde(default)]
    pub supports_tools: bool,
    /// Whether the provider streams this model.
    #[serde(default = "default_true")]
    pub supports_streaming: bool,
    /// Whether the model honors a JSON response format.
    #[serde(default)]
    pub supports_json_mode: bool,
    /// Whether the model accepts image input.
    #[serde(default)]
    pub supports_vision: bool,
    /// Price per million tokens.
    #[serde(default)]
    pub pricing: Pricing,
    /// Provider-documented rate limits.
    #[serde(default)]
    pub rate_limits: RateLimits,
    /// Deprecation flag. The `_deprecated_` key prefix sets this too.
    #[serde(default)]
    pub deprecated: bool,
    /// Availability flag for temporarily pulled models.
    #[serde(default = "default_true")]
    pub available: bool,
}

fn default_true() -> bool {
    true
}

fn default_context_window() -> u32 {
    8192
}

/// Size/capability class used by the selector for floors and preferences.
///
/// Ordered: a `large` model satisfies a `medium` floor, and so on up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    /// Cheap and fast.
    Small,
    /// General purpose.
    Medium,
    /// Frontier scale.
    Large,
    /// Extended reasoning.
    Reasoning,
}

/// USD per million tokens. All zeros means the model is free.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    /// Input price per 1M tokens.
    #[serde(default)]
    pub input_per_1m: f64,
    /// Output price per 1M tokens.
    #[serde(default)]
    pub output_per_1m: f64,
}

impl Pricing {
    /// Whether the model costs nothing on both sides.
    pub fn is_free(&self) -> bool {
        self.input_per_1m == 0.0 && self.output_per_1m == 0.0
    }

    /// Blended per-token cost used for cheap-first ranking.
    pub fn blended(&self) -> f64 {
        // Completions are typically much shorter than prompts; weight 3:1.
        (self.input_per_1m * 3.0 + self.output_per_1m) / 4.0
    }
}

/// Provider-documented request/token ceilings. Zero means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    /// Requests per minute.
    #[serde(default)]
    pub rpm: u64,
    /// Tokens per minute.
    #[serde(default)]
    pub tpm: u64,
    /// Requests per day.
    #[serde(default)]
    pub rpd: u64,
    /// Tokens per day.
    #[serde(default)]
    pub tpd: u64,
}
