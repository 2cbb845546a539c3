use config::ToolsConfig;
use serde_json::{Value, json};

use crate::{Artifacts, OutputKind, Source, Tool, ToolContext, ToolDescriptor, ToolError, ToolOutput, html};

/// Below this many characters of extracted text the direct fetch is
/// considered unreadable (consent walls, JS-only shells) and the reader
/// proxy tier kicks in.
const READABLE_THRESHOLD: usize = 200;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; prism-gateway/0.1; +https://github.com/prism-gw/prism)";

/// Fetch a web page and reduce it to readable text.
///
/// Two tiers: a plain HTTP fetch first, then an optional reader proxy when
/// the direct result is not readable text.
pub struct ScrapePageTool {
    descriptor: ToolDescriptor,
    reader_proxy: Option<String>,
}

impl ScrapePageTool {
    /// Build the tool from configuration.
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            reader_proxy: config.scrape.reader_proxy.clone(),
            descriptor: ToolDescriptor {
                name: "scrape_page".to_string(),
                description: "Fetch a web page and return its readable text content.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "url": {
                            "type": "string",
                            "description": "Absolute http(s) URL to fetch"
                        }
                    },
                    "required": ["url"],
                    "additionalProperties": false
                }),
                output_kind: OutputKind::Text,
                max_execution_ms: config.timeout_seconds * 1_000,
                max_output_bytes: config.max_output_bytes,
                cacheable: true,
                cache_ttl_seconds: 3_600,
                idempotency_key_fields: vec!["url".to_string()],
            },
        }
    }

    async fn fetch(&self, ctx: &ToolContext, url: &str) -> Result<(String, String), ToolError> {
        let response = ctx
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| ToolError::new(format!("Fetch failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::new(format!("Page returned {status}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();

        let body = response
            .text()
            .await
            .map_err(|e| ToolError::new(format!("Failed to read page body: {e}")))?;

        Ok((content_type, body))
    }
}

#[async_trait::async_trait]
impl Tool for ScrapePageTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let raw_url = arguments
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::new("Missing 'url'"))?;

        let url = url::Url::parse(raw_url).map_err(|e| ToolError::new(format!("Invalid URL '{raw_url}': {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ToolError::new(format!("Unsupported URL scheme '{}'", url.scheme())));
        }

        let (content_type, body) = self.fetch(ctx, url.as_str()).await?;

        let (mut text, title, images) = if content_type.contains("html") {
            (
                html::to_text(&body),
                html::title(&body),
                html::image_urls(&body, &url, 10),
            )
        } else {
            (body, None, Vec::new())
        };

        // Tier two: a JS-only shell yields almost no text; let the reader
        // proxy render it if one is configured.
        if text.len() < READABLE_THRESHOLD
            && let Some(proxy) = &self.reader_proxy
        {
            let proxied = format!("{}/{}", proxy.trim_end_matches('/'), url);
            log::debug!("Direct fetch of {url} was unreadable, trying reader proxy");

            if let Ok((_, proxied_body)) = self.fetch(ctx, &proxied).await
                && proxied_body.len() > text.len()
            {
                text = proxied_body;
            }
        }

        if text.trim().is_empty() {
            return Err(ToolError::new(format!("No readable text at {url}")));
        }

        let snippet: String = text.chars().take(200).collect();
        let artifacts = Artifacts {
            sources: vec![Source {
                title: title.clone().unwrap_or_else(|| url.to_string()),
                url: url.to_string(),
                snippet,
            }],
            images,
            ..Default::default()
        };

        let content = match title {
            Some(title) => format!("# {title}\n\n{text}"),
            None => text,
        };

        Ok(ToolOutput {
            content,
            artifacts: Some(artifacts),
        })
    }
}
