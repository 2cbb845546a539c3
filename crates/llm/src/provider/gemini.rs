use async_trait::async_trait;

use crate::{
    error::LlmResult,
    provider::{ChatEventStream, Provider, ProviderRequest, ToolChoice, openai::OpenAiCompatProvider},
    request::RequestContext,
};

/// Gemini speaks the OpenAI dialect through its compatibility endpoint,
/// with two deviations this wrapper papers over:
///
/// - `tool_choice = "required"` is not accepted; it degrades to `"auto"`.
/// - a JSON `response_format` combined with tools makes the backend
///   reject the call, so the format is suppressed while tools are offered.
pub(crate) struct GeminiProvider {
    inner: OpenAiCompatProvider,
}

impl GeminiProvider {
    pub(crate) fn new(inner: OpenAiCompatProvider) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn chat(&self, mut request: ProviderRequest, context: &RequestContext) -> LlmResult<ChatEventStream> {
        if request.tool_choice == Some(ToolChoice::Required) {
            log::debug!("Gemini does not accept tool_choice=required, downgrading to auto");
            request.tool_choice = Some(ToolChoice::Auto);
        }

        if request.json_response && !request.tools.is_empty() {
            log::debug!("Gemini rejects response_format together with tools, dropping the format");
            request.json_response = false;
        }

        self.inner.chat(request, context).await
    }
}
