use config::ToolsConfig;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{Artifacts, OutputKind, Source, Tool, ToolContext, ToolDescriptor, ToolError, ToolOutput};

const DEFAULT_RESULTS: usize = 5;
const MAX_RESULTS: usize = 10;

/// Web search against a SearXNG-compatible JSON endpoint.
pub struct WebSearchTool {
    descriptor: ToolDescriptor,
    base_url: Option<String>,
}

impl WebSearchTool {
    /// Build the tool from configuration.
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            base_url: config.search.base_url.clone(),
            descriptor: ToolDescriptor {
                name: "web_search".to_string(),
                description: "Search the web. Returns titles, URLs and snippets for the top results."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Search query"
                        },
                        "max_results": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": MAX_RESULTS,
                            "description": "How many results to return (default 5)"
                        }
                    },
                    "required": ["query"],
                    "additionalProperties": false
                }),
                output_kind: OutputKind::Structured,
                max_execution_ms: config.timeout_seconds * 1_000,
                max_output_bytes: config.max_output_bytes,
                cacheable: true,
                cache_ttl_seconds: 600,
                idempotency_key_fields: vec!["query".to_string(), "max_results".to_string()],
            },
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

#[async_trait::async_trait]
impl Tool for WebSearchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let Some(base_url) = &self.base_url else {
            return Err(ToolError::new(
                "Web search is not configured on this deployment",
            ));
        };

        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::new("Missing 'query'"))?;

        let limit = arguments
            .get("max_results")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_RESULTS)
            .min(MAX_RESULTS);

        let response = ctx
            .http
            .get(format!("{}/search", base_url.trim_end_matches('/')))
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| ToolError::new(format!("Search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::new(format!("Search backend returned {status}")));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::new(format!("Search backend returned unparseable JSON: {e}")))?;

        if parsed.results.is_empty() {
            return Ok(ToolOutput::text(format!("No results for '{query}'")));
        }

        let mut lines = Vec::new();
        let mut artifacts = Artifacts::default();

        for (index, hit) in parsed.results.iter().take(limit).enumerate() {
            let title = if hit.title.is_empty() { &hit.url } else { &hit.title };
            let snippet = hit.content.trim();

            lines.push(format!("{}. {title}\n   {}\n   {snippet}", index + 1, hit.url));

            artifacts.sources.push(Source {
                title: title.clone(),
                url: hit.url.clone(),
                snippet: snippet.to_string(),
            });
        }

        Ok(ToolOutput {
            content: lines.join("\n"),
            artifacts: Some(artifacts),
        })
    }
}
