use axum::http::HeaderMap;
use tokio_util::sync::CancellationToken;

/// Runtime context for one inbound request.
///
/// Authentication happens outside the gateway; what arrives here is an
/// opaque user id used purely for log attribution, plus a correlation id
/// stamped on every log line and terminal error for this request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Opaque id of the authenticated user, if the auth layer supplied
    /// one. Never interpreted, only logged.
    pub authenticated_user_id: Option<String>,
    /// Correlation id for logs and terminal errors.
    pub correlation_id: String,
    /// Cancelled when the client disconnects or the server shuts down.
    pub cancel: CancellationToken,
}

impl RequestContext {
    /// Build a fresh context with a random correlation id.
    pub fn new(authenticated_user_id: Option<String>) -> Self {
        Self {
            authenticated_user_id,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Extract request context from headers and the auth layer's extension.
pub(crate) fn extract_context(headers: &HeaderMap, authenticated_user_id: Option<String>) -> RequestContext {
    let context = RequestContext::new(authenticated_user_id);

    if let Some(forwarded_id) = headers.get("x-request-id").and_then(|value| value.to_str().ok()) {
        log::debug!(
            "Request {} correlates with inbound x-request-id {forwarded_id}",
            context.correlation_id
        );
    }

    context
}
