use reqwest::header::AUTHORIZATION;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::error::{LlmError, LlmResult};

/// Default image model per provider type.
pub(crate) fn default_image_model(provider_type: &str) -> Option<&'static str> {
    match provider_type {
        "openai" => Some("dall-e-3"),
        "gemini" => Some("imagen-3.0-generate-002"),
        "together" => Some("black-forest-labs/FLUX.1-schnell"),
        _ => None,
    }
}

/// One generated image: a URL or inline base64 payload, whichever the
/// provider returned.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    /// Hosted image URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Base64-encoded image bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<&'a str>,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

/// Call an OpenAI-compatible images endpoint.
pub(crate) async fn generate(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &secrecy::SecretString,
    model: &str,
    prompt: &str,
    size: Option<&str>,
) -> LlmResult<Vec<GeneratedImage>> {
    let url = format!("{}/images/generations", base_url.trim_end_matches('/'));

    let response = client
        .post(&url)
        .header(AUTHORIZATION, format!("Bearer {}", api_key.expose_secret()))
        .json(&ImageRequest {
            model,
            prompt,
            n: 1,
            size,
        })
        .send()
        .await
        .map_err(|e| LlmError::UpstreamNetwork(format!("Image request failed: {e}")))?;

    let status = response.status();

    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        return Err(LlmError::from_upstream_status(status.as_u16(), error_text));
    }

    let parsed: ImageResponse = response
        .json()
        .await
        .map_err(|e| LlmError::Protocol(format!("Undecodable image response: {e}")))?;

    if parsed.data.is_empty() {
        return Err(LlmError::Protocol("Image response contained no images".to_string()));
    }

    Ok(parsed
        .data
        .into_iter()
        .map(|datum| GeneratedImage {
            url: datum.url,
            b64_json: datum.b64_json,
        })
        .collect())
}
