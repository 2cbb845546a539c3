use std::sync::Arc;

use catalog::Catalog;
use config::Capability;
use rate_limit::CircuitBreaker;
use serde_json::{Value, json};
use tools::{Artifacts, OutputKind, Tool, ToolContext, ToolDescriptor, ToolError, ToolOutput};

use crate::{
    error::{LlmError, LlmResult},
    provider::{
        default_base_url,
        image::{GeneratedImage, default_image_model, generate},
    },
};

/// The result of one image generation dispatch.
#[derive(Debug)]
pub(crate) struct ImageOutcome {
    pub(crate) provider: String,
    pub(crate) model: String,
    pub(crate) images: Vec<GeneratedImage>,
}

/// Routes image requests to an image-capable provider credential.
///
/// Shared between the `/generate-image` endpoint and the `generate_image`
/// tool, so both go through the same breaker accounting.
pub(crate) struct ImageDispatcher {
    catalog: Arc<Catalog>,
    breaker: Arc<CircuitBreaker>,
    http: reqwest::Client,
}

impl ImageDispatcher {
    pub(crate) fn new(catalog: Arc<Catalog>, breaker: Arc<CircuitBreaker>, http: reqwest::Client) -> Self {
        Self {
            catalog,
            breaker,
            http,
        }
    }

    pub(crate) async fn generate(
        &self,
        prompt: &str,
        provider_preference: Option<&str>,
        model_preference: Option<&str>,
        size: Option<&str>,
    ) -> LlmResult<ImageOutcome> {
        let providers = self.catalog.providers_with_capability(Capability::Image);

        let candidates: Vec<&str> = match provider_preference {
            Some(preferred) => providers.into_iter().filter(|p| *p == preferred).collect(),
            None => providers,
        };

        if candidates.is_empty() {
            return Err(LlmError::NoModelAvailable);
        }

        let mut last_error = None;

        for provider in candidates {
            let Some(model) = model_preference.or_else(|| default_image_model(provider)) else {
                log::debug!("Provider '{provider}' has no known image model, skipping");
                continue;
            };

            let key = format!("{provider}/{model}");

            if !self.breaker.is_callable(&key) {
                log::debug!("Skipping image provider {key}: circuit breaker open");
                continue;
            }

            let credential = self
                .catalog
                .credentials(provider)
                .into_iter()
                .find(|c| c.has_capability(Capability::Image));

            let Some(credential) = credential else { continue };

            let Some(base_url) = credential
                .base_url
                .clone()
                .or_else(|| default_base_url(provider).map(String::from))
            else {
                continue;
            };

            match generate(&self.http, &base_url, &credential.api_key, model, prompt, size).await {
                Ok(images) => {
                    self.breaker.record_success(&key);

                    return Ok(ImageOutcome {
                        provider: provider.to_string(),
                        model: model.to_string(),
                        images,
                    });
                }
                Err(error) => {
                    if error.is_breaker_tripping() {
                        self.breaker.record_failure(&key);
                    }

                    log::warn!("Image generation via {key} failed: {error}");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or(LlmError::NoModelAvailable))
    }
}

/// Tool wrapper over the image dispatcher, so the model can generate
/// images mid-conversation.
pub(crate) struct ImageGenerationTool {
    descriptor: ToolDescriptor,
    dispatcher: Arc<ImageDispatcher>,
}

impl ImageGenerationTool {
    pub(crate) fn new(dispatcher: Arc<ImageDispatcher>, config: &config::ToolsConfig) -> Self {
        Self {
            dispatcher,
            descriptor: ToolDescriptor {
                name: "generate_image".to_string(),
                description: "Generate an image from a text prompt. Returns the image URL.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "prompt": {
                            "type": "string",
                            "description": "What to draw"
                        },
                        "size": {
                            "type": "string",
                            "enum": ["1024x1024", "1792x1024", "1024x1792"],
                            "description": "Image dimensions (default 1024x1024)"
                        }
                    },
                    "required": ["prompt"],
                    "additionalProperties": false
                }),
                output_kind: OutputKind::Multimedia,
                max_execution_ms: 120_000,
                max_output_bytes: config.max_output_bytes,
                cacheable: false,
                cache_ttl_seconds: 0,
                idempotency_key_fields: Vec::new(),
            },
        }
    }
}

#[async_trait::async_trait]
impl Tool for ImageGenerationTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, arguments: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let prompt = arguments
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::new("Missing 'prompt'"))?;

        let size = arguments.get("size").and_then(Value::as_str);

        let outcome = self
            .dispatcher
            .generate(prompt, None, None, size)
            .await
            .map_err(|e| ToolError::new(format!("Image generation failed: {e}")))?;

        let urls: Vec<String> = outcome.images.iter().filter_map(|image| image.url.clone()).collect();

        let content = if urls.is_empty() {
            format!(
                "Generated an image with {}/{} (returned inline, not addressable by URL).",
                outcome.provider, outcome.model
            )
        } else {
            format!("Generated image with {}/{}: {}", outcome.provider, outcome.model, urls.join(", "))
        };

        Ok(ToolOutput {
            content,
            artifacts: Some(Artifacts {
                images: urls,
                ..Default::default()
            }),
        })
    }
}
