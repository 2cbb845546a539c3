use std::{collections::BTreeMap, sync::Arc, time::Duration};

use cache::{CacheKey, ContentCache};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc};

use crate::{Artifacts, ToolContext, ToolErrorKind, ToolRegistry};

/// The outcome of one tool call, synthetic or real.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Text appended to the conversation as the tool reply.
    pub content_for_model: String,
    /// Client-facing artifacts. Never fed back to the model.
    pub artifacts: Option<Artifacts>,
    /// Whether the result came from the content cache.
    pub cached: bool,
    /// Classification when the result is synthetic or degraded.
    pub error_kind: Option<ToolErrorKind>,
}

impl ToolResult {
    fn synthetic(kind: ToolErrorKind, content: impl Into<String>) -> Self {
        Self {
            content_for_model: content.into(),
            artifacts: None,
            cached: false,
            error_kind: Some(kind),
        }
    }
}

/// Serialized form of a cached tool outcome.
#[derive(Serialize, Deserialize)]
struct CachedPayload {
    content: String,
    artifacts: Option<Artifacts>,
}

struct ExecutorInner {
    registry: ToolRegistry,
    cache: Arc<ContentCache>,
    fanout: usize,
    ttl_overrides: BTreeMap<String, u64>,
}

/// Schema-validated, budgeted, cache-aware tool dispatch.
#[derive(Clone)]
pub struct ToolExecutor {
    inner: Arc<ExecutorInner>,
}

impl ToolExecutor {
    /// Build an executor over a registry and cache.
    pub fn new(
        registry: ToolRegistry,
        cache: Arc<ContentCache>,
        fanout: usize,
        ttl_overrides: BTreeMap<String, u64>,
    ) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                registry,
                cache,
                fanout: fanout.max(1),
                ttl_overrides,
            }),
        }
    }

    /// The registry backing this executor.
    pub fn registry(&self) -> &ToolRegistry {
        &self.inner.registry
    }

    /// Execute a single tool call through the full pipeline. Never fails:
    /// every problem becomes a synthetic reply the model can react to.
    pub async fn execute(&self, name: &str, arguments: Value, ctx: &ToolContext) -> ToolResult {
        let Some(registered) = self.inner.registry.get(name) else {
            return ToolResult::synthetic(
                ToolErrorKind::UnknownTool,
                format!(
                    "Unknown tool '{name}'. Available tools: {}",
                    self.inner.registry.names().join(", ")
                ),
            );
        };

        if let Err(error) = registered.validator.validate(&arguments) {
            return ToolResult::synthetic(
                ToolErrorKind::InvalidArguments,
                format!("Invalid arguments for '{name}': {error}"),
            );
        }

        let descriptor = registered.tool.descriptor();

        let cache_key = descriptor
            .cacheable
            .then(|| CacheKey::derive(name, &descriptor.idempotent_args(&arguments)));

        if let Some(key) = &cache_key
            && let Some(payload) = self.inner.cache.get(key).await
        {
            match serde_json::from_slice::<CachedPayload>(&payload) {
                Ok(cached) => {
                    log::debug!("Tool '{name}' served from cache");
                    return ToolResult {
                        content_for_model: cached.content,
                        artifacts: cached.artifacts,
                        cached: true,
                        error_kind: None,
                    };
                }
                Err(e) => log::warn!("Discarding undecodable cache entry for '{name}': {e}"),
            }
        }

        let budget = Duration::from_millis(descriptor.max_execution_ms);
        let invocation = registered.tool.invoke(arguments, ctx);

        let outcome = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                log::debug!("Tool '{name}' canceled");
                return ToolResult::synthetic(ToolErrorKind::Failed, format!("Tool '{name}' was canceled"));
            }
            outcome = tokio::time::timeout(budget, invocation) => outcome,
        };

        let output = match outcome {
            Err(_) => {
                log::warn!("Tool '{name}' exceeded its {}ms budget", descriptor.max_execution_ms);
                return ToolResult::synthetic(
                    ToolErrorKind::Timeout,
                    format!("Tool '{name}' timed out after {}ms", descriptor.max_execution_ms),
                );
            }
            Ok(Err(error)) => {
                log::debug!("Tool '{name}' failed: {error}");
                return ToolResult::synthetic(ToolErrorKind::Failed, format!("Tool '{name}' failed: {error}"));
            }
            Ok(Ok(output)) => output,
        };

        let (content, truncated) = truncate_output(output.content, descriptor.max_output_bytes);
        let artifacts = output.artifacts.filter(|a| !a.is_empty());

        if let Some(key) = &cache_key {
            let ttl = self
                .inner
                .ttl_overrides
                .get(name)
                .copied()
                .unwrap_or(descriptor.cache_ttl_seconds);

            let payload = CachedPayload {
                content: content.clone(),
                artifacts: artifacts.clone(),
            };

            if let Ok(bytes) = serde_json::to_vec(&payload) {
                self.inner.cache.put(key, &bytes, Duration::from_secs(ttl)).await;
            }
        }

        ToolResult {
            content_for_model: content,
            artifacts,
            cached: false,
            error_kind: truncated.then_some(ToolErrorKind::OutputTruncated),
        }
    }

    /// Execute a batch of tool calls concurrently under the fan-out cap.
    ///
    /// Each task publishes its completion to a collector channel; the
    /// collector waits for all of them and returns results in the order of
    /// the input list, regardless of completion order.
    pub async fn execute_batch(&self, calls: Vec<(String, Value)>, ctx: &ToolContext) -> Vec<ToolResult> {
        let total = calls.len();

        if total == 0 {
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(self.inner.fanout));
        let (tx, mut rx) = mpsc::channel::<(usize, ToolResult)>(total);

        for (index, (name, arguments)) in calls.into_iter().enumerate() {
            let executor = self.clone();
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = executor.execute(&name, arguments, &ctx).await;
                let _ = tx.send((index, result)).await;
            });
        }

        drop(tx);

        let mut slots: Vec<Option<ToolResult>> = (0..total).map(|_| None).collect();

        while let Some((index, result)) = rx.recv().await {
            slots[index] = Some(result);
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    ToolResult::synthetic(ToolErrorKind::Failed, "Tool task ended without a result")
                })
            })
            .collect()
    }
}

/// Cap `content` at `max_bytes`, cutting on a char boundary and appending
/// an elision marker when anything was removed.
fn truncate_output(content: String, max_bytes: usize) -> (String, bool) {
    if content.len() <= max_bytes {
        return (content, false);
    }

    let mut cut = max_bytes;
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut truncated = content[..cut].to_string();
    truncated.push_str("\n… [output truncated]");
    (truncated, true)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use serde_json::json;

    use super::*;
    use crate::{OutputKind, Tool, ToolDescriptor, ToolError, ToolOutput};

    struct TestTool {
        descriptor: ToolDescriptor,
        delay_ms: u64,
        invocations: Arc<AtomicUsize>,
        fail: bool,
    }

    impl TestTool {
        fn descriptor(name: &str) -> ToolDescriptor {
            ToolDescriptor {
                name: name.to_string(),
                description: "test tool".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": { "q": { "type": "string" } },
                    "required": ["q"],
                    "additionalProperties": false
                }),
                output_kind: OutputKind::Text,
                max_execution_ms: 1_000,
                max_output_bytes: 10_000,
                cacheable: false,
                cache_ttl_seconds: 60,
                idempotency_key_fields: vec!["q".to_string()],
            }
        }

        fn new(name: &str) -> Self {
            Self {
                descriptor: Self::descriptor(name),
                delay_ms: 0,
                invocations: Arc::new(AtomicUsize::new(0)),
                fail: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl Tool for TestTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn invoke(&self, arguments: serde_json::Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);

            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }

            if self.fail {
                return Err(ToolError::new("backend unavailable"));
            }

            let q = arguments["q"].as_str().unwrap_or_default();
            Ok(ToolOutput::text(format!("result for {q}")))
        }
    }

    fn executor_with(tools: Vec<TestTool>, fanout: usize) -> (tempfile::TempDir, ToolExecutor) {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(ContentCache::new(dir.path().join("cache"), 1 << 20).unwrap());

        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(Arc::new(tool));
        }

        (dir, ToolExecutor::new(registry, cache, fanout, BTreeMap::new()))
    }

    fn ctx() -> ToolContext {
        ToolContext::new(reqwest::Client::new())
    }

    #[tokio::test]
    async fn unknown_tool_becomes_synthetic_reply() {
        let (_dir, executor) = executor_with(vec![TestTool::new("echo")], 4);

        let result = executor.execute("nope", json!({ "q": "x" }), &ctx()).await;

        assert_eq!(result.error_kind, Some(ToolErrorKind::UnknownTool));
        assert!(result.content_for_model.contains("Unknown tool 'nope'"));
        assert!(result.content_for_model.contains("echo"));
    }

    #[tokio::test]
    async fn invalid_arguments_become_synthetic_reply() {
        let (_dir, executor) = executor_with(vec![TestTool::new("echo")], 4);

        let result = executor.execute("echo", json!({ "wrong": 1 }), &ctx()).await;

        assert_eq!(result.error_kind, Some(ToolErrorKind::InvalidArguments));
        assert!(result.content_for_model.contains("Invalid arguments for 'echo'"));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_overrun_becomes_timeout_reply() {
        let mut slow = TestTool::new("slow");
        slow.descriptor.max_execution_ms = 50;
        slow.delay_ms = 100;

        let (_dir, executor) = executor_with(vec![slow], 4);
        let result = executor.execute("slow", json!({ "q": "x" }), &ctx()).await;

        assert_eq!(result.error_kind, Some(ToolErrorKind::Timeout));
        assert!(result.content_for_model.contains("timed out after 50ms"));
    }

    #[tokio::test]
    async fn tool_failure_becomes_synthetic_reply() {
        let mut failing = TestTool::new("flaky");
        failing.fail = true;

        let (_dir, executor) = executor_with(vec![failing], 4);
        let result = executor.execute("flaky", json!({ "q": "x" }), &ctx()).await;

        assert_eq!(result.error_kind, Some(ToolErrorKind::Failed));
        assert!(result.content_for_model.contains("backend unavailable"));
    }

    #[tokio::test]
    async fn batch_preserves_call_order_regardless_of_completion() {
        let mut fast = TestTool::new("fast");
        fast.delay_ms = 5;
        let mut slow = TestTool::new("slowish");
        slow.delay_ms = 50;

        let (_dir, executor) = executor_with(vec![fast, slow], 4);

        let results = executor
            .execute_batch(
                vec![
                    ("slowish".to_string(), json!({ "q": "first" })),
                    ("fast".to_string(), json!({ "q": "second" })),
                ],
                &ctx(),
            )
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content_for_model, "result for first");
        assert_eq!(results[1].content_for_model, "result for second");
    }

    #[tokio::test]
    async fn cacheable_tool_served_from_cache_on_second_call() {
        let mut cacheable = TestTool::new("lookup");
        cacheable.descriptor.cacheable = true;
        let invocations = cacheable.invocations.clone();

        let (_dir, executor) = executor_with(vec![cacheable], 4);
        let context = ctx();

        let first = executor.execute("lookup", json!({ "q": "rust" }), &context).await;
        let second = executor.execute("lookup", json!({ "q": "rust" }), &context).await;

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.content_for_model, second.content_for_model);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn truncation_boundary_is_exact() {
        let payload = "x".repeat(64);
        let output_len = "result for ".len() + payload.len();

        let mut exact = TestTool::new("exact");
        exact.descriptor.max_output_bytes = output_len;

        let mut over = TestTool::new("over");
        over.descriptor.max_output_bytes = output_len - 1;

        let (_dir, executor) = executor_with(vec![exact, over], 4);
        let context = ctx();

        let fits = executor.execute("exact", json!({ "q": payload.clone() }), &context).await;
        assert_eq!(fits.error_kind, None);
        assert!(!fits.content_for_model.contains("[output truncated]"));

        let truncated = executor.execute("over", json!({ "q": payload }), &context).await;
        assert_eq!(truncated.error_kind, Some(ToolErrorKind::OutputTruncated));
        assert!(truncated.content_for_model.ends_with("[output truncated]"));
    }

    #[tokio::test]
    async fn cancellation_stops_execution() {
        let mut slow = TestTool::new("slow");
        slow.delay_ms = 10_000;

        let (_dir, executor) = executor_with(vec![slow], 4);

        let context = ctx();
        context.cancel.cancel();

        let result = executor.execute("slow", json!({ "q": "x" }), &context).await;
        assert_eq!(result.error_kind, Some(ToolErrorKind::Failed));
        assert!(result.content_for_model.contains("canceled"));
    }
}
