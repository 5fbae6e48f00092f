// ── Runtime bridge configuration ──
//
// Describes how to reach the cloud and what to expose per appliance.
// Carries the access token but never touches disk: the binary builds a
// `BridgeConfig` (via `hcbridge-config`) and hands it in.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use hcbridge_api::{HomeConnectClient, ReconnectConfig, TlsMode, TransportConfig};

use crate::capability::FeaturePolicy;
use crate::error::CoreError;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => Self::System,
            TlsVerification::CustomCa(path) => Self::CustomCa(path.clone()),
        }
    }
}

/// What to expose for one appliance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplianceOptions {
    /// Display name override.
    pub name: Option<String>,
    /// Skip the appliance entirely when `false`.
    pub enabled: bool,
    pub policy: FeaturePolicy,
    /// Overrides `BridgeConfig::verbose` for this appliance.
    pub verbose: Option<bool>,
}

impl Default for ApplianceOptions {
    fn default() -> Self {
        Self {
            name: None,
            enabled: true,
            policy: FeaturePolicy::allow_all(),
            verbose: None,
        }
    }
}

/// Configuration for one bridge instance.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// API base URL (`https://api.home-connect.com/`).
    pub base_url: Url,
    pub token: SecretString,
    pub tls: TlsVerification,
    /// Request timeout for request/response calls.
    pub timeout: Duration,
    /// Connect timeout; the only timeout applied to the event stream.
    pub connect_timeout: Duration,
    pub reconnect: ReconnectConfig,
    /// Keyed by `haId`. Appliances not listed get the defaults.
    pub appliances: HashMap<String, ApplianceOptions>,
    /// Log every remote write at info level.
    pub verbose: bool,
}

impl BridgeConfig {
    pub fn new(base_url: Url, token: SecretString) -> Self {
        Self {
            base_url,
            token,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
            reconnect: ReconnectConfig::default(),
            appliances: HashMap::new(),
            verbose: false,
        }
    }

    /// Options for `ha_id`, falling back to the defaults.
    pub fn appliance(&self, ha_id: &str) -> ApplianceOptions {
        self.appliances.get(ha_id).cloned().unwrap_or_default()
    }

    /// HTTP transport settings for the API client.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: (&self.tls).into(),
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
        }
    }

    /// Build an API client for this configuration.
    pub fn client(&self) -> Result<HomeConnectClient, CoreError> {
        Ok(HomeConnectClient::new(
            self.base_url.clone(),
            &self.token,
            &self.transport(),
        )?)
    }
}
