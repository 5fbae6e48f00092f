use thiserror::Error;

use crate::events::RawFrame;
use crate::events::schema::SchemaIssue;

/// Top-level error type for the `hcbridge-api` crate.
///
/// Covers every failure mode of the cloud surface: transport, the
/// request/response API, and the event stream (parse and schema).
/// `hcbridge-core` maps these into domain-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The bearer token was rejected (expired, revoked, wrong scope).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Rate limited by the cloud API. Includes retry-after in seconds.
    #[error("Rate limited -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // ── Request/response API ────────────────────────────────────────
    /// Structured error from the `{ "error": { key, description } }` envelope.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        message: String,
        key: Option<String>,
        status: u16,
    },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Event stream ────────────────────────────────────────────────
    /// The event stream could not be opened or broke mid-read.
    #[error("Event stream failed ({context}): {reason}")]
    Stream {
        reason: String,
        context: RequestContext,
    },

    /// A frame's `data` was not valid JSON. Ends the current session only.
    #[error("Malformed event payload ({context}): {message}")]
    StreamParse {
        message: String,
        frame: RawFrame,
        context: RequestContext,
    },

    /// A frame failed the strict event schema. Ends the current session only.
    #[error("Event failed validation: {}", summarize(.issues))]
    Validation {
        issues: Vec<SchemaIssue>,
        event: serde_json::Value,
    },
}

impl Error {
    /// Returns `true` if this error indicates auth has expired.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::RateLimited { .. } | Self::Stream { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` for failures raised by one event-stream session
    /// (as opposed to the request/response API).
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::Stream { .. } | Self::StreamParse { .. } | Self::Validation { .. }
        )
    }

    /// Extract the API error key, if available.
    pub fn api_error_key(&self) -> Option<&str> {
        match self {
            Self::Api { key, .. } => key.as_deref(),
            _ => None,
        }
    }
}

fn summarize(issues: &[SchemaIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ── RequestContext ───────────────────────────────────────────────────

/// Request/response context attached to stream errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub url: String,
    /// HTTP status of the stream response, once received.
    pub status: Option<u16>,
}

impl RequestContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
        }
    }
}

impl std::fmt::Display for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "GET {} -> {status}", self.url),
            None => write!(f, "GET {}", self.url),
        }
    }
}
