use secrecy::SecretString;
use serde::Deserialize;

/// One upstream provider credential.
///
/// Credentials come from the `[[credentials]]` TOML array and from the
/// indexed `LP_TYPE_<i>` / `LP_KEY_<i>` / `LP_ALLOWED_MODELS_<i>` /
/// `LP_CAPABILITIES_<i>` environment pool. They are immutable for the
/// lifetime of the process.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialConfig {
    /// Provider type this key belongs to, matching a provider key in the
    /// catalog document (`openai`, `gemini`, `groq`, ...).
    #[serde(rename = "type")]
    pub provider_type: String,
    /// The API key. Never logged, never serialized back out.
    pub api_key: SecretString,
    /// Optional base URL override for self-hosted or proxied endpoints.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Which of the provider's models this key may be used for.
    #[serde(default)]
    pub allowed_models: AllowedModels,
    /// What the key is good for.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<Capability>,
}

impl CredentialConfig {
    /// Whether this credential may serve the given model.
    pub fn allows_model(&self, model_id: &str) -> bool {
        match &self.allowed_models {
            AllowedModels::All => true,
            AllowedModels::List(models) => models.iter().any(|m| m == model_id),
        }
    }

    /// Whether this credential carries the given capability.
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

fn default_capabilities() -> Vec<Capability> {
    vec![Capability::Chat]
}

/// Model allowance for a credential: everything the provider offers, or an
/// explicit subset.
#[derive(Debug, Clone, Default)]
pub enum AllowedModels {
    /// The credential may serve any of the provider's models.
    #[default]
    All,
    /// The credential is restricted to these model ids.
    List(Vec<String>),
}

impl<'de> Deserialize<'de> for AllowedModels {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Sentinel(String),
            List(Vec<String>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Sentinel(s) if s.eq_ignore_ascii_case("all") => Ok(AllowedModels::All),
            Raw::Sentinel(s) => Ok(AllowedModels::List(vec![s])),
            Raw::List(models) => Ok(AllowedModels::List(models)),
        }
    }
}

impl AllowedModels {
    /// Parse the comma-separated `LP_ALLOWED_MODELS_<i>` form.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();

        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return AllowedModels::All;
        }

        AllowedModels::List(trimmed.split(',').map(|m| m.trim().to_string()).collect())
    }
}

/// What a credential can be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Chat completions.
    Chat,
    /// Embedding vectors.
    Embeddings,
    /// Image generation.
    Image,
    /// Text to speech.
    Tts,
}

impl Capability {
    /// Parse one element of the comma-separated `LP_CAPABILITIES_<i>` form.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chat" => Some(Self::Chat),
            "embeddings" => Some(Self::Embeddings),
            "image" => Some(Self::Image),
            "tts" => Some(Self::Tts),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Doc {
        credentials: Vec<CredentialConfig>,
    }

    #[test]
    fn allowed_models_accepts_sentinel_and_list() {
        let doc: Doc = toml::from_str(
            r#"
            [[credentials]]
            type = "openai"
            api_key = "sk-test"
            allowed_models = "all"

            [[credentials]]
            type = "groq"
            api_key = "gsk-test"
            allowed_models = ["llama-3.3-70b"]
            "#,
        )
        .unwrap();

        assert!(doc.credentials[0].allows_model("gpt-4o"));
        assert!(doc.credentials[1].allows_model("llama-3.3-70b"));
        assert!(!doc.credentials[1].allows_model("gpt-4o"));
    }

    #[test]
    fn capabilities_default_to_chat() {
        let doc: Doc = toml::from_str(
            r#"
            [[credentials]]
            type = "openai"
            api_key = "sk-test"
            "#,
        )
        .unwrap();

        assert!(doc.credentials[0].has_capability(Capability::Chat));
        assert!(!doc.credentials[0].has_capability(Capability::Image));
    }

    #[test]
    fn env_style_parsing() {
        assert!(matches!(AllowedModels::parse("ALL"), AllowedModels::All));
        assert!(matches!(AllowedModels::parse(""), AllowedModels::All));

        match AllowedModels::parse("gpt-4o, gpt-4o-mini") {
            AllowedModels::List(models) => assert_eq!(models, vec!["gpt-4o", "gpt-4o-mini"]),
            AllowedModels::All => unreachable!("expected list"),
        }

        assert_eq!(Capability::parse("Image"), Some(Capability::Image));
        assert_eq!(Capability::parse("video"), None);
    }
}
