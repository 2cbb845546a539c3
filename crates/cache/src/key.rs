use serde_json::Value;
use sha2::{Digest, Sha256};

/// Content address of one cache entry.
///
/// Derived from the tool name and the canonical form of its idempotent
/// arguments, so two calls that mean the same thing hit the same entry no
/// matter how the model ordered the argument object's keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a tool invocation.
    pub fn derive(tool_name: &str, idempotent_args: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(tool_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical_json(idempotent_args).as_bytes());

        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);

        for byte in digest {
            use std::fmt::Write;
            write!(hex, "{byte:02x}").expect("writing to a String cannot fail");
        }

        Self(hex)
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Canonical JSON: object keys sorted recursively, no whitespace. Keeps
/// cache keys stable regardless of key insertion order.
fn canonical_json(value: &Value) -> String {
    fn canonical_value(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: std::collections::BTreeMap<String, Value> =
                    map.iter().map(|(k, v)| (k.clone(), canonical_value(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(canonical_value).collect()),
            other => other.clone(),
        }
    }

    serde_json::to_string(&canonical_value(value)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn key_is_stable_across_argument_order() {
        let a = CacheKey::derive("scrape_page", &json!({ "url": "https://a.example", "depth": 2 }));
        let b = CacheKey::derive("scrape_page", &json!({ "depth": 2, "url": "https://a.example" }));

        assert_eq!(a, b);
    }

    #[test]
    fn key_distinguishes_tool_and_arguments() {
        let base = CacheKey::derive("scrape_page", &json!({ "url": "https://a.example" }));
        let other_tool = CacheKey::derive("web_search", &json!({ "url": "https://a.example" }));
        let other_args = CacheKey::derive("scrape_page", &json!({ "url": "https://b.example" }));

        assert_ne!(base, other_tool);
        assert_ne!(base, other_args);
    }

    #[test]
    fn nested_objects_are_canonicalized() {
        let a = CacheKey::derive("t", &json!({ "q": { "a": 1, "b": [ { "y": 2, "x": 1 } ] } }));
        let b = CacheKey::derive("t", &json!({ "q": { "b": [ { "x": 1, "y": 2 } ], "a": 1 } }));

        assert_eq!(a, b);
    }
}
