use std::{path::Path, str::FromStr};

use anyhow::{Context, bail};
use indoc::indoc;
use secrecy::SecretString;

use crate::{AllowedModels, Capability, Config, CredentialConfig, GuardrailMode};

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;

    let mut config: Config = toml::from_str(&content)?;

    apply_env_overrides(&mut config)?;
    validate(&config)?;

    Ok(config)
}

pub(crate) fn validate(config: &Config) -> anyhow::Result<()> {
    if config.chat.safety_iteration > config.chat.max_tool_iterations {
        bail!(
            "chat.safety_iteration ({}) must not exceed chat.max_tool_iterations ({})",
            config.chat.safety_iteration,
            config.chat.max_tool_iterations
        );
    }

    if config.chat.tool_fanout == 0 {
        bail!("chat.tool_fanout must be at least 1");
    }

    if config.credentials.is_empty() {
        bail!(indoc! {r#"
            No provider credentials configured. Prism requires at least one credential to reach an upstream provider.

            Either add a credential to the configuration file:

              [[credentials]]
              type = "openai"
              api_key = "sk-..."

            Or export an indexed environment pool:

              LP_TYPE_0=openai
              LP_KEY_0=sk-...
        "#});
    }

    Ok(())
}

/// Apply the documented environment overrides on top of the file values.
pub(crate) fn apply_env_overrides(config: &mut Config) -> anyhow::Result<()> {
    if let Some(value) = parse_env("MAX_TOOL_ITERATIONS")? {
        config.chat.max_tool_iterations = value;
    }

    if let Some(value) = parse_env("SAFETY_ITERATION")? {
        config.chat.safety_iteration = value;
    }

    if let Some(value) = parse_env("REQUEST_DEADLINE_SECONDS")? {
        config.chat.request_deadline_seconds = value;
    }

    if let Some(value) = parse_env("TOOL_FANOUT")? {
        config.chat.tool_fanout = value;
    }

    if let Some(value) = parse_env::<u64>("CACHE_BYTES_BUDGET")? {
        config.cache.bytes_budget = value;
    }

    if let Some(value) = std::env::var("PROVIDER_CATALOG_PATH").ok().filter(|v| !v.is_empty()) {
        config.catalog.path = value;
    }

    if let Ok(value) = std::env::var("GUARDRAIL_MODE") {
        config.guardrails.mode = GuardrailMode::parse(&value)
            .with_context(|| format!("invalid GUARDRAIL_MODE '{value}', expected off, open or closed"))?;
    }

    // CACHE_TTL_<TOOL> per-tool overrides, e.g. CACHE_TTL_SCRAPE_PAGE=86400.
    for (key, value) in std::env::vars() {
        let Some(tool) = key.strip_prefix("CACHE_TTL_") else {
            continue;
        };

        let seconds: u64 = value
            .parse()
            .with_context(|| format!("invalid {key}: expected seconds, got '{value}'"))?;

        config.tools.ttl_overrides.insert(tool.to_ascii_lowercase(), seconds);
    }

    config.credentials.extend(load_credential_pool()?);

    Ok(())
}

/// Discover the indexed `LP_*` credential pool. Indices start at zero and
/// stop at the first missing `LP_TYPE_<i>`.
fn load_credential_pool() -> anyhow::Result<Vec<CredentialConfig>> {
    let mut pool = Vec::new();

    for index in 0.. {
        let Ok(provider_type) = std::env::var(format!("LP_TYPE_{index}")) else {
            break;
        };

        let api_key = std::env::var(format!("LP_KEY_{index}"))
            .with_context(|| format!("LP_TYPE_{index} is set but LP_KEY_{index} is missing"))?;

        let allowed_models = std::env::var(format!("LP_ALLOWED_MODELS_{index}"))
            .map(|v| AllowedModels::parse(&v))
            .unwrap_or_default();

        let capabilities = match std::env::var(format!("LP_CAPABILITIES_{index}")) {
            Ok(value) => {
                let mut capabilities = Vec::new();

                for part in value.split(',').filter(|p| !p.trim().is_empty()) {
                    let capability = Capability::parse(part)
                        .with_context(|| format!("invalid capability '{part}' in LP_CAPABILITIES_{index}"))?;
                    capabilities.push(capability);
                }

                capabilities
            }
            Err(_) => vec![Capability::Chat],
        };

        log::debug!("Loaded credential {index} for provider '{provider_type}' from environment");

        pool.push(CredentialConfig {
            provider_type,
            api_key: SecretString::from(api_key),
            base_url: std::env::var(format!("LP_BASE_URL_{index}")).ok(),
            allowed_models,
            capabilities,
        });
    }

    Ok(pool)
}

fn parse_env<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => {
            let parsed = value
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid {name} '{value}': {e}"))?;
            Ok(Some(parsed))
        }
        Err(_) => Ok(None),
    }
}
