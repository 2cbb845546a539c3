//! Provider catalog and credential registry.
//!
//! Loads the declarative catalog document, normalizes deprecation flags,
//! merges the credential pool discovered at startup, and answers the
//! routing questions the model selector asks. Read-only after
//! construction; no locking anywhere.

#![deny(missing_docs)]

mod document;

use std::path::Path;

use config::{Capability, CredentialConfig};
pub use document::{
    CatalogDocument, ChatSection, DEPRECATED_KEY_PREFIX, ModelCategory, ModelEntry, Pricing, ProviderEntry, RateLimits,
};

/// Catalog loading errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The document file could not be read.
    #[error("failed to read catalog at {path}: {source}")]
    Io {
        /// Path that failed to load.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid JSON or does not match the schema.
    #[error("failed to parse catalog document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A fully resolved model the selector can rank.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    /// Provider type this model belongs to.
    pub provider_type: String,
    /// Model id as the provider knows it.
    pub model_id: String,
    /// Size/capability class.
    pub category: ModelCategory,
    /// Context window in tokens.
    pub context_window: u32,
    /// Whether the model handles tool calls.
    pub supports_tools: bool,
    /// Whether the provider streams this model.
    pub supports_streaming: bool,
    /// Whether the model honors a JSON response format.
    pub supports_json_mode: bool,
    /// Whether the model accepts image input.
    pub supports_vision: bool,
    /// Price per million tokens.
    pub pricing: Pricing,
    /// Provider-documented rate limits.
    pub rate_limits: RateLimits,
}

impl ModelDescriptor {
    /// Stable `(provider, model)` key used by the breaker and rate tracker.
    pub fn key(&self) -> String {
        format!("{}/{}", self.provider_type, self.model_id)
    }
}

/// Hard requirements a model must satisfy to be a candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelFilter<'a> {
    /// The request uses tools.
    pub requires_tools: bool,
    /// The request wants a streamed response.
    pub requires_streaming: bool,
    /// The request wants a JSON response format.
    pub requires_json_mode: bool,
    /// The request carries image input.
    pub requires_vision: bool,
    /// Minimum category.
    pub required_category: Option<ModelCategory>,
    /// Minimum context window in tokens.
    pub context_window_needed: u32,
    /// Restrict to one provider type.
    pub provider_type: Option<&'a str>,
}

/// The process-wide catalog: normalized models plus the credential pool.
pub struct Catalog {
    models: Vec<ModelDescriptor>,
    credentials: Vec<CredentialConfig>,
}

impl Catalog {
    /// Load the document from disk and merge the credential pool.
    pub fn load<P: AsRef<Path>>(path: P, credentials: Vec<CredentialConfig>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let document: CatalogDocument = serde_json::from_str(&content)?;
        Ok(Self::from_document(document, credentials))
    }

    /// Build the catalog from an already parsed document.
    ///
    /// Deprecation is normalized here: a `_deprecated_` key prefix, the
    /// `deprecated` boolean, or `available == false` all remove the model
    /// before it can ever be listed or selected.
    pub fn from_document(document: CatalogDocument, credentials: Vec<CredentialConfig>) -> Self {
        let mut models = Vec::new();

        for (provider_type, provider) in document.chat.providers {
            for (model_key, entry) in provider.models {
                let (model_id, key_deprecated) = match model_key.strip_prefix(DEPRECATED_KEY_PREFIX) {
                    Some(stripped) => (stripped.to_string(), true),
                    None => (model_key, false),
                };

                if entry.deprecated || key_deprecated || !entry.available {
                    log::debug!("Excluding deprecated or unavailable model {provider_type}/{model_id}");
                    continue;
                }

                models.push(ModelDescriptor {
                    provider_type: provider_type.clone(),
                    model_id,
                    category: entry.category,
                    context_window: entry.context_window,
                    supports_tools: entry.supports_tools,
                    supports_streaming: entry.supports_streaming,
                    supports_json_mode: entry.supports_json_mode,
                    supports_vision: entry.supports_vision,
                    pricing: entry.pricing,
                    rate_limits: entry.rate_limits,
                });
            }
        }

        log::info!(
            "Catalog loaded: {} models across {} providers, {} credentials",
            models.len(),
            models
                .iter()
                .map(|m| m.provider_type.as_str())
                .collect::<std::collections::BTreeSet<_>>()
                .len(),
            credentials.len()
        );

        Self { models, credentials }
    }

    /// All models satisfying the filter that some credential can serve.
    ///
    /// Additional request-scoped credentials may be supplied; they extend
    /// the pool for this call only.
    pub fn models(&self, filter: &ModelFilter<'_>, extra_credentials: &[CredentialConfig]) -> Vec<&ModelDescriptor> {
        self.models
            .iter()
            .filter(|model| self.matches(model, filter))
            .filter(|model| {
                self.credential_for_with(model, Capability::Chat, extra_credentials)
                    .is_some()
            })
            .collect()
    }

    /// Look up a single model.
    pub fn model(&self, provider_type: &str, model_id: &str) -> Option<&ModelDescriptor> {
        self.models
            .iter()
            .find(|m| m.provider_type == provider_type && m.model_id == model_id)
    }

    /// All credentials for a provider type, in pool order.
    pub fn credentials(&self, provider_type: &str) -> Vec<&CredentialConfig> {
        self.credentials
            .iter()
            .filter(|c| c.provider_type == provider_type)
            .collect()
    }

    /// The first credential able to serve the model with the capability,
    /// preferring request-scoped entries.
    pub fn credential_for_with<'a>(
        &'a self,
        model: &ModelDescriptor,
        capability: Capability,
        extra: &'a [CredentialConfig],
    ) -> Option<&'a CredentialConfig> {
        extra
            .iter()
            .chain(self.credentials.iter())
            .filter(|c| c.provider_type == model.provider_type)
            .filter(|c| c.has_capability(capability))
            .find(|c| c.allows_model(&model.model_id))
    }

    /// Provider types that hold a credential with the given capability.
    pub fn providers_with_capability(&self, capability: Capability) -> Vec<&str> {
        let mut providers: Vec<&str> = self
            .credentials
            .iter()
            .filter(|c| c.has_capability(capability))
            .map(|c| c.provider_type.as_str())
            .collect();

        providers.sort_unstable();
        providers.dedup();
        providers
    }

    fn matches(&self, model: &ModelDescriptor, filter: &ModelFilter<'_>) -> bool {
        if filter.requires_tools && !model.supports_tools {
            return false;
        }

        if filter.requires_streaming && !model.supports_streaming {
            return false;
        }

        if filter.requires_json_mode && !model.supports_json_mode {
            return false;
        }

        if filter.requires_vision && !model.supports_vision {
            return false;
        }

        if let Some(floor) = filter.required_category
            && model.category < floor
        {
            return false;
        }

        if model.context_window < filter.context_window_needed {
            return false;
        }

        if let Some(provider) = filter.provider_type
            && model.provider_type != provider
        {
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use secrecy::SecretString;

    use super::*;

    const DOCUMENT: &str = indoc! {r#"
        {
          "chat": {
            "providers": {
              "openai": {
                "models": {
                  "gpt-4o": {
                    "category": "large",
                    "contextWindow": 128000,
                    "supportsTools": true,
                    "supportsJsonMode": true,
                    "pricing": { "inputPer1M": 2.5, "outputPer1M": 10.0 },
                    "rateLimits": { "rpm": 500, "tpm": 450000 }
                  },
                  "gpt-4o-mini": {
                    "category": "small",
                    "contextWindow": 128000,
                    "supportsTools": true,
                    "supportsJsonMode": true,
                    "pricing": { "inputPer1M": 0.15, "outputPer1M": 0.6 }
                  },
                  "_deprecated_gpt-3.5-turbo": {
                    "category": "small",
                    "supportsTools": true
                  },
                  "gpt-4-32k": {
                    "category": "large",
                    "deprecated": true
                  },
                  "o1-preview": {
                    "category": "reasoning",
                    "contextWindow": 128000,
                    "available": false
                  }
                }
              },
              "groq": {
                "models": {
                  "llama-3.3-70b": {
                    "category": "medium",
                    "contextWindow": 32768,
                    "supportsTools": true,
                    "pricing": { "inputPer1M": 0.0, "outputPer1M": 0.0 }
                  }
                }
              }
            }
          }
        }
    "#};

    fn credential(provider: &str) -> CredentialConfig {
        CredentialConfig {
            provider_type: provider.to_string(),
            api_key: SecretString::from("test-key"),
            base_url: None,
            allowed_models: config::AllowedModels::All,
            capabilities: vec![Capability::Chat],
        }
    }

    fn catalog() -> Catalog {
        let document: CatalogDocument = serde_json::from_str(DOCUMENT).unwrap();
        Catalog::from_document(document, vec![credential("openai"), credential("groq")])
    }

    #[test]
    fn deprecated_and_unavailable_models_never_appear() {
        let catalog = catalog();
        let models = catalog.models(&ModelFilter::default(), &[]);

        let mut ids: Vec<&str> = models.iter().map(|m| m.model_id.as_str()).collect();
        ids.sort_unstable();

        assert_eq!(ids, vec!["gpt-4o", "gpt-4o-mini", "llama-3.3-70b"]);
    }

    #[test]
    fn capability_filtering() {
        let catalog = catalog();

        let filter = ModelFilter {
            requires_json_mode: true,
            ..Default::default()
        };
        let models = catalog.models(&filter, &[]);
        assert!(models.iter().all(|m| m.supports_json_mode));
        assert_eq!(models.len(), 2);

        let filter = ModelFilter {
            required_category: Some(ModelCategory::Medium),
            ..Default::default()
        };
        let models = catalog.models(&filter, &[]);
        let mut ids: Vec<&str> = models.iter().map(|m| m.model_id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["gpt-4o", "llama-3.3-70b"]);

        let filter = ModelFilter {
            context_window_needed: 100_000,
            ..Default::default()
        };
        let models = catalog.models(&filter, &[]);
        assert!(models.iter().all(|m| m.context_window >= 100_000));
    }

    #[test]
    fn models_without_usable_credentials_are_filtered() {
        let document: CatalogDocument = serde_json::from_str(DOCUMENT).unwrap();
        let catalog = Catalog::from_document(document, vec![credential("openai")]);

        let models = catalog.models(&ModelFilter::default(), &[]);
        assert!(models.iter().all(|m| m.provider_type == "openai"));

        // A request-scoped credential opens the provider back up.
        let models = catalog.models(&ModelFilter::default(), &[credential("groq")]);
        assert!(models.iter().any(|m| m.provider_type == "groq"));
    }

    #[test]
    fn credential_restrictions_respected() {
        let mut restricted = credential("openai");
        restricted.allowed_models = config::AllowedModels::List(vec!["gpt-4o-mini".to_string()]);

        let document: CatalogDocument = serde_json::from_str(DOCUMENT).unwrap();
        let catalog = Catalog::from_document(document, vec![restricted]);

        let models = catalog.models(&ModelFilter::default(), &[]);
        let ids: Vec<&str> = models.iter().map(|m| m.model_id.as_str()).collect();

        assert_eq!(ids, vec!["gpt-4o-mini"]);
    }

    #[test]
    fn document_round_trips() {
        let document: CatalogDocument = serde_json::from_str(DOCUMENT).unwrap();
        let serialized = serde_json::to_string(&document).unwrap();
        let reparsed: CatalogDocument = serde_json::from_str(&serialized).unwrap();

        let first = Catalog::from_document(document, vec![credential("openai"), credential("groq")]);
        let second = Catalog::from_document(reparsed, vec![credential("openai"), credential("groq")]);

        let ids = |catalog: &Catalog| {
            catalog
                .models(&ModelFilter::default(), &[])
                .iter()
                .map(|m| m.key())
                .collect::<Vec<_>>()
        };

        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn free_pricing_detection() {
        let catalog = catalog();
        let groq = catalog.model("groq", "llama-3.3-70b").unwrap();
        let openai = catalog.model("openai", "gpt-4o").unwrap();

        assert!(groq.pricing.is_free());
        assert!(!openai.pricing.is_free());
    }
}
