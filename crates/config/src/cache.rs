use serde::Deserialize;

/// Tool output cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Directory the cache stores payload files under.
    pub path: String,
    /// Total byte budget. Eviction starts at 80% of this and stops at 70%.
    /// Overridden by `CACHE_BYTES_BUDGET`.
    pub bytes_budget: u64,
    /// TTL applied when a tool does not declare its own.
    pub default_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: "/tmp/prism-cache".to_string(),
            bytes_budget: 512 * 1024 * 1024,
            default_ttl_seconds: 3600,
        }
    }
}
