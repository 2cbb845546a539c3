use serde_json::Value;

/// How a tool's output should be interpreted downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Free text.
    Text,
    /// JSON the client may want to render specially.
    Structured,
    /// Output that references images, video or audio.
    Multimedia,
}

/// Static description of one tool: identity, contract and budgets.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// Unique tool name the model calls it by.
    pub name: String,
    /// Model-facing description of what the tool does.
    pub description: String,
    /// JSON Schema the arguments must conform to.
    pub input_schema: Value,
    /// How the output should be interpreted.
    pub output_kind: OutputKind,
    /// Wall-clock budget per call in milliseconds.
    pub max_execution_ms: u64,
    /// Output byte budget; larger replies are truncated with a marker.
    pub max_output_bytes: usize,
    /// Whether results may be served from the content cache.
    pub cacheable: bool,
    /// Cache TTL in seconds when `cacheable`.
    pub cache_ttl_seconds: u64,
    /// Argument fields that form the cache key. Fields outside this set
    /// do not affect caching.
    pub idempotency_key_fields: Vec<String>,
}

impl ToolDescriptor {
    /// The subset of `arguments` that identifies this call for caching.
    pub fn idempotent_args(&self, arguments: &Value) -> Value {
        let Value::Object(map) = arguments else {
            return arguments.clone();
        };

        let filtered: serde_json::Map<String, Value> = map
            .iter()
            .filter(|(key, _)| self.idempotency_key_fields.iter().any(|f| f == *key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Value::Object(filtered)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn idempotent_args_filters_to_key_fields() {
        let descriptor = ToolDescriptor {
            name: "scrape_page".into(),
            description: String::new(),
            input_schema: json!({}),
            output_kind: OutputKind::Text,
            max_execution_ms: 1000,
            max_output_bytes: 1024,
            cacheable: true,
            cache_ttl_seconds: 60,
            idempotency_key_fields: vec!["url".into()],
        };

        let args = json!({ "url": "https://example.com", "trace_id": "abc" });
        assert_eq!(descriptor.idempotent_args(&args), json!({ "url": "https://example.com" }));
    }
}
