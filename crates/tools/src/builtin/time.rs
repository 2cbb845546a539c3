use config::ToolsConfig;
use serde_json::{Value, json};

use crate::{OutputKind, Tool, ToolContext, ToolDescriptor, ToolError, ToolOutput};

/// Current wall-clock time in an IANA timezone.
pub struct GetTimeTool {
    descriptor: ToolDescriptor,
}

impl GetTimeTool {
    /// Build the tool.
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: "get_time".to_string(),
                description: "Get the current date and time in a timezone. Use IANA names like \
                              'Asia/Tokyo' or 'Europe/Berlin'; defaults to UTC."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "timezone": {
                            "type": "string",
                            "description": "IANA timezone name, e.g. 'Asia/Tokyo'"
                        }
                    },
                    "additionalProperties": false
                }),
                output_kind: OutputKind::Text,
                max_execution_ms: 1_000,
                max_output_bytes: config.max_output_bytes,
                cacheable: false,
                cache_ttl_seconds: 0,
                idempotency_key_fields: Vec::new(),
            },
        }
    }
}

#[async_trait::async_trait]
impl Tool for GetTimeTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, arguments: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let timezone = arguments
            .get("timezone")
            .and_then(Value::as_str)
            .unwrap_or("UTC");

        let zoned = jiff::Timestamp::now()
            .in_tz(timezone)
            .map_err(|e| ToolError::new(format!("Unknown timezone '{timezone}': {e}")))?;

        // RFC 3339 with offset, without the trailing zone annotation.
        let formatted = zoned.strftime("%Y-%m-%dT%H:%M:%S%:z").to_string();

        Ok(ToolOutput::text(formatted))
    }
}
