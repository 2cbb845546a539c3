use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Error classification carried on every terminal `error` event and in
/// provider call records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// No candidate model survived filtering.
    NoModelAvailable,
    /// Network failure talking to a provider.
    UpstreamNetwork,
    /// Provider returned a 5xx.
    #[serde(rename = "UPSTREAM_5XX")]
    Upstream5xx,
    /// Provider returned a client-caused 4xx (bad request, auth).
    #[serde(rename = "UPSTREAM_4XX")]
    Upstream4xx,
    /// Provider returned 429.
    UpstreamRateLimit,
    /// Provider response violated the wire protocol.
    ProtocolError,
    /// Tool exceeded its wall-clock budget.
    ToolTimeout,
    /// Tool output exceeded its byte budget.
    ToolOutputTooLarge,
    /// Tool arguments failed schema validation.
    InvalidArguments,
    /// The model named a tool that is not registered.
    UnknownTool,
    /// The iteration cap was reached.
    MaxIterations,
    /// The request deadline passed.
    DeadlineExceeded,
    /// The client went away.
    ClientCanceled,
    /// A guardrail refused the request or response.
    GuardrailBlocked,
    /// Anything else; details stay in the logs.
    Internal,
}

/// Gateway errors with provider status mapping.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// No model in the catalog satisfies the request requirements right
    /// now (capabilities, breakers, rate windows).
    #[error("No model available for this request")]
    NoModelAvailable,

    /// Network or connection error reaching a provider.
    #[error("Connection error: {0}")]
    UpstreamNetwork(String),

    /// Provider returned a server-side error.
    #[error("Provider error ({status}): {message}")]
    Upstream5xx {
        /// HTTP status from the provider.
        status: u16,
        /// Provider-supplied error body.
        message: String,
    },

    /// Provider rejected the request as client-caused. Does not trip the
    /// breaker and is never retried on another candidate.
    #[error("Provider rejected the request ({status}): {message}")]
    Upstream4xx {
        /// HTTP status from the provider.
        status: u16,
        /// Provider-supplied error body.
        message: String,
    },

    /// Provider rate limited the call.
    #[error("Provider rate limit: {message}")]
    UpstreamRateLimit {
        /// Provider-supplied error body.
        message: String,
    },

    /// The provider response did not match its own wire protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A guardrail refused the input or output.
    #[error("{message}")]
    GuardrailBlocked {
        /// User-safe refusal text.
        message: String,
    },

    /// The tool iteration cap was reached without a final answer.
    #[error("Tool iteration limit reached without a final answer")]
    MaxIterations,

    /// The request wall-clock deadline passed.
    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    /// The client disconnected.
    #[error("Client canceled the request")]
    ClientCanceled,

    /// Invalid inbound request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error. `Some` came from a provider and can be shown;
    /// `None` must not leak details.
    #[error("Internal server error")]
    Internal(Option<String>),
}

impl LlmError {
    /// Taxonomy classification for events and logs.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoModelAvailable => ErrorKind::NoModelAvailable,
            Self::UpstreamNetwork(_) => ErrorKind::UpstreamNetwork,
            Self::Upstream5xx { .. } => ErrorKind::Upstream5xx,
            Self::Upstream4xx { .. } => ErrorKind::Upstream4xx,
            Self::UpstreamRateLimit { .. } => ErrorKind::UpstreamRateLimit,
            Self::Protocol(_) => ErrorKind::ProtocolError,
            Self::GuardrailBlocked { .. } => ErrorKind::GuardrailBlocked,
            Self::MaxIterations => ErrorKind::MaxIterations,
            Self::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Self::ClientCanceled => ErrorKind::ClientCanceled,
            Self::InvalidRequest(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether this failure counts against the provider's circuit breaker
    /// and justifies advancing to the next candidate model.
    pub fn is_breaker_tripping(&self) -> bool {
        matches!(
            self,
            Self::UpstreamNetwork(_) | Self::Upstream5xx { .. } | Self::UpstreamRateLimit { .. } | Self::Protocol(_)
        )
    }

    /// HTTP status for handler-level failures (before the SSE stream has
    /// started).
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::GuardrailBlocked { .. } => StatusCode::FORBIDDEN,
            Self::NoModelAvailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamRateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamNetwork(_) | Self::Upstream5xx { .. } | Self::Protocol(_) => StatusCode::BAD_GATEWAY,
            Self::Upstream4xx { status, .. } => StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            Self::MaxIterations => StatusCode::INTERNAL_SERVER_ERROR,
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Self::ClientCanceled => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message that is safe to expose to API consumers.
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(Some(provider_message)) => provider_message.clone(),
            Self::Internal(None) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Classify an upstream HTTP status with its error body.
    pub fn from_upstream_status(status: u16, message: String) -> Self {
        match status {
            429 => Self::UpstreamRateLimit { message },
            400..=499 => Self::Upstream4xx { status, message },
            500..=599 => Self::Upstream5xx { status, message },
            _ => Self::Protocol(format!("unexpected status {status}: {message}")),
        }
    }
}

/// Error response body for non-SSE endpoints.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    kind: ErrorKind,
    code: u16,
    message: String,
}

impl IntoResponse for LlmError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = ErrorResponse {
            error: ErrorDetails {
                kind: self.kind(),
                code: status.as_u16(),
                message: self.client_message(),
            },
        };

        (status, Json(error_response)).into_response()
    }
}
