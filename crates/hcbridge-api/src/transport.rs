// Shared transport configuration for building reqwest::Client instances.
//
// The request/response client and the event-stream client share TLS,
// authorization and user-agent settings through this module. They differ
// only in timeouts: a long-lived event stream must never hit a total
// request timeout, so it gets a connect timeout instead.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

const USER_AGENT: &str = concat!("hcbridge/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode (api-level mirror of core's TlsVerification).
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Total timeout for request/response calls.
    pub timeout: Duration,
    /// Connect timeout, the only timeout applied to the event stream.
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl TransportConfig {
    /// Build the `reqwest::Client` used for request/response calls.
    pub fn build_client(&self, token: &SecretString) -> Result<reqwest::Client, Error> {
        let mut headers = auth_headers(token)?;
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.bsh.sdk.v1+json"),
        );

        self.builder(headers)?
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Build the `reqwest::Client` used for the server-sent event stream.
    pub fn build_stream_client(&self, token: &SecretString) -> Result<reqwest::Client, Error> {
        let mut headers = auth_headers(token)?;
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        self.builder(headers)?
            .build()
            .map_err(|e| Error::Tls(format!("failed to build stream client: {e}")))
    }

    fn builder(&self, headers: HeaderMap) -> Result<reqwest::ClientBuilder, Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
        }

        Ok(builder)
    }
}

fn auth_headers(token: &SecretString) -> Result<HeaderMap, Error> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|_| Error::Authentication {
            message: "access token contains characters not allowed in a header".into(),
        })?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn auth_header_is_bearer_and_sensitive() {
        let headers = auth_headers(&SecretString::from("abc123")).unwrap();
        let value = headers.get(AUTHORIZATION).unwrap();
        assert_eq!(value.to_str().unwrap(), "Bearer abc123");
        assert!(value.is_sensitive());
    }

    #[test]
    fn token_with_newline_is_rejected() {
        let err = auth_headers(&SecretString::from("abc\n123")).unwrap_err();
        assert!(err.is_auth_expired());
    }

    #[test]
    fn custom_ca_missing_file_is_tls_error() {
        let config = TransportConfig {
            tls: TlsMode::CustomCa("/nonexistent/ca.pem".into()),
            ..TransportConfig::default()
        };
        let err = config
            .build_client(&SecretString::from("token"))
            .unwrap_err();
        assert!(matches!(err, Error::Tls(_)));
    }
}
