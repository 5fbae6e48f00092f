//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use hcbridge_config::ConfigError;
use hcbridge_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the Home Connect cloud at {url}")]
    #[diagnostic(
        code(hcbridge::connection_failed),
        help(
            "Check network access to the API endpoint.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Rate limited by the Home Connect cloud")]
    #[diagnostic(
        code(hcbridge::rate_limited),
        help("The cloud asked to retry after {retry_after_secs}s.")
    )]
    RateLimited { retry_after_secs: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(hcbridge::auth_failed),
        help(
            "The access token was rejected or has expired.\n\
             Store a fresh one with: hcbridge config set-token --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("No access token configured for profile '{profile}'")]
    #[diagnostic(
        code(hcbridge::no_credentials),
        help(
            "Store a token with: hcbridge config set-token\n\
             Or set the HCBRIDGE_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(hcbridge::not_found),
        help("Run: hcbridge appliances list to see available appliances")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    // ── API ──────────────────────────────────────────────────────────
    #[error("Rejected by the appliance: {message}")]
    #[diagnostic(code(hcbridge::rejected), help("Cloud error key: {key}"))]
    Rejected { message: String, key: String },

    #[error("API error: {message}")]
    #[diagnostic(code(hcbridge::api_error))]
    ApiError { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hcbridge::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(hcbridge::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: hcbridge config init --name {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(hcbridge::config_exists),
        help("Pass --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(hcbridge::config))]
    Config(ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out")]
    #[diagnostic(
        code(hcbridge::timeout),
        help("Increase the timeout with --timeout or check network latency.")
    )]
    Timeout,

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not encode output: {0}")]
    #[diagnostic(code(hcbridge::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::RateLimited { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Timeout => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::ConfigExists { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::AuthenticationFailed { message } => Self::AuthFailed {
                profile: "current".into(),
                message,
            },
            CoreError::Disconnected => Self::ConnectionFailed {
                url: "(disconnected)".into(),
                reason: "the bridge is not connected".into(),
            },
            CoreError::Timeout => Self::Timeout,
            CoreError::RateLimited { retry_after_secs } => Self::RateLimited { retry_after_secs },
            CoreError::ApplianceNotFound { identifier } => Self::NotFound {
                resource_type: "appliance".into(),
                identifier,
            },
            CoreError::NotFound {
                entity_type,
                identifier,
            } => Self::NotFound {
                resource_type: entity_type,
                identifier,
            },
            CoreError::Rejected { message, key } => Self::Rejected {
                message,
                key: key.unwrap_or_else(|| "(none)".into()),
            },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            err @ (CoreError::Unsupported { .. }
            | CoreError::SerializerClosed { .. }
            | CoreError::MissingCapability { .. }
            | CoreError::Api { .. }
            | CoreError::Internal(_)) => Self::ApiError {
                message: err.to_string(),
            },
        }
    }
}

impl From<hcbridge_api::Error> for CliError {
    fn from(err: hcbridge_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::UnknownProfile { profile } => Self::ProfileNotFound {
                available: available_profiles(),
                name: profile,
            },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config(other),
        }
    }
}

fn available_profiles() -> String {
    let cfg = hcbridge_config::load_config_or_default();
    let mut names: Vec<_> = cfg.profiles.into_keys().collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort();
    names.join(", ")
}
