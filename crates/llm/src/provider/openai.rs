mod input;
mod output;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};

use self::{
    input::OpenAiRequest,
    output::{OpenAiResponse, OpenAiStreamChunk},
};
use crate::{
    error::{LlmError, LlmResult},
    provider::{ChatEvent, ChatEventStream, Provider, ProviderRequest},
    request::RequestContext,
};

/// Upstream headers surfaced verbatim on `llm_response` events.
const SURFACED_HEADER_PREFIXES: &[&str] = &["x-ratelimit-", "x-request-id", "retry-after"];

/// Adapter for every provider speaking the OpenAI chat completions
/// dialect, which is most of them. Vendor differences beyond a base URL
/// live in thin wrappers.
pub(crate) struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: SecretString,
    client: Client,
}

impl OpenAiCompatProvider {
    pub(crate) fn new(name: String, base_url: String, api_key: SecretString, client: Client) -> Self {
        Self {
            name,
            base_url,
            api_key,
            client,
        }
    }

    async fn send(&self, wire_request: &OpenAiRequest, context: &RequestContext) -> LlmResult<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let body = sonic_rs::to_vec(wire_request)
            .map_err(|e| LlmError::InvalidRequest(format!("Failed to serialize request: {e}")))?;

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key.expose_secret()))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| LlmError::UpstreamNetwork(format!("Failed to reach {}: {e}", self.name)))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            log::warn!(
                "[{}] Provider '{}' returned {status}: {error_text}",
                context.correlation_id,
                self.name
            );

            return Err(LlmError::from_upstream_status(status.as_u16(), error_text));
        }

        Ok(response)
    }
}

/// The transparency subset of upstream response headers.
fn surfaced_headers(response: &reqwest::Response) -> Vec<(String, String)> {
    response
        .headers()
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            SURFACED_HEADER_PREFIXES
                .iter()
                .any(|prefix| name.starts_with(prefix) || name == *prefix)
        })
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: ProviderRequest, context: &RequestContext) -> LlmResult<ChatEventStream> {
        let streaming = request.stream;
        let wire_request = OpenAiRequest::from(request);
        let response = self.send(&wire_request, context).await?;

        let meta = ChatEvent::ResponseMeta {
            status: response.status().as_u16(),
            headers: surfaced_headers(&response),
        };

        if !streaming {
            let text = response
                .text()
                .await
                .map_err(|e| LlmError::UpstreamNetwork(format!("Failed to read response body: {e}")))?;

            let parsed: OpenAiResponse = sonic_rs::from_str(&text)
                .map_err(|e| LlmError::Protocol(format!("Undecodable chat completion response: {e}")))?;

            let events = std::iter::once(meta).chain(parsed.into_events()).map(Ok);
            return Ok(Box::pin(futures::stream::iter(events)));
        }

        let provider_name = self.name.clone();
        let correlation_id = context.correlation_id.clone();

        let chunk_events = response
            .bytes_stream()
            .eventsource()
            .filter_map(move |event| {
                let provider_name = provider_name.clone();
                let correlation_id = correlation_id.clone();

                async move {
                    let event = match event {
                        Ok(event) => event,
                        Err(e) => {
                            log::warn!("[{correlation_id}] SSE parse error in '{provider_name}' stream: {e}");
                            return None;
                        }
                    };

                    if event.data == "[DONE]" {
                        return None;
                    }

                    match sonic_rs::from_str::<OpenAiStreamChunk>(&event.data) {
                        Ok(chunk) => Some(chunk.into_events()),
                        Err(e) => {
                            log::warn!("[{correlation_id}] Undecodable chunk from '{provider_name}': {e}");
                            None
                        }
                    }
                }
            })
            .map(|events| futures::stream::iter(events.into_iter().map(Ok)))
            .flatten();

        let stream = futures::stream::iter([Ok(meta)]).chain(chunk_events);
        Ok(Box::pin(stream))
    }
}
