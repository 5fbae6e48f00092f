// ── Core error types ──
//
// User-facing errors from hcbridge-core. These are NOT API-specific --
// modules never see HTTP status codes or JSON parse failures directly.
// The `From<hcbridge_api::Error>` impl translates transport-layer errors
// into domain-appropriate variants.
//
// `Clone` because one serializer dispatch result is handed to every
// caller that contributed to it.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach the appliance cloud at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Bridge is not connected")]
    Disconnected,

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited by the cloud -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Appliance not found: {identifier}")]
    ApplianceNotFound { identifier: String },

    #[error("Entity not found: {entity_type} with id {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation not supported: {operation} ({reason})")]
    Unsupported { operation: String, reason: String },

    #[error("Operation rejected by appliance: {message}")]
    Rejected {
        message: String,
        /// Cloud error key, e.g. `SDK.Error.WrongOperationState`.
        key: Option<String>,
    },

    #[error("Update channel for {target} closed")]
    SerializerClosed { target: String },

    // ── Composition errors ───────────────────────────────────────────
    #[error("Module {module} requires capability {capability}, which no earlier module provides")]
    MissingCapability { module: String, capability: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Cloud error key for rejected operations.
    pub fn rejection_key(&self) -> Option<&str> {
        match self {
            Self::Rejected { key, .. } => key.as_deref(),
            _ => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hcbridge_api::Error> for CoreError {
    fn from(err: hcbridge_api::Error) -> Self {
        use hcbridge_api::Error as ApiError;

        match err {
            ApiError::Authentication { message } => CoreError::AuthenticationFailed { message },
            ApiError::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            ApiError::RateLimited { retry_after_secs } => CoreError::RateLimited { retry_after_secs },
            ApiError::Api {
                message,
                key,
                status,
            } => match status {
                404 => CoreError::NotFound {
                    entity_type: "resource".into(),
                    identifier: key.unwrap_or(message),
                },
                400..=499 => CoreError::Rejected { message, key },
                _ => CoreError::Api {
                    message,
                    status: Some(status),
                },
            },
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            ApiError::Stream { reason, context } => CoreError::ConnectionFailed {
                url: context.url,
                reason,
            },
            err @ (ApiError::StreamParse { .. } | ApiError::Validation { .. }) => {
                CoreError::Internal(err.to_string())
            }
        }
    }
}
